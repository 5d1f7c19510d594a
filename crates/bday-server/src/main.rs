mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use bday_api::commands::{Orchestrator, Settings};
use bday_api::routes::{self, AppStateInner};
use bday_api::telegram::TelegramPlatform;
use bday_db::{Database, SchemaStatus};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bday_server=debug,bday_api=debug,bday_db=debug,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&PathBuf::from(&config.db_path), config.db_retry)?;
    if let SchemaStatus::Partial { missing } = db.schema_status() {
        warn!(
            "Continuing with an incomplete schema, missing: {}. Fix the database by hand.",
            missing.join(", ")
        );
    }

    let platform = TelegramPlatform::new(
        &config.telegram_api_url,
        &config.telegram_token,
        config.admin_timeout,
    )?;
    if config.owner_id.is_none() {
        warn!("BDAY_OWNER_ID is not set, only chat admins can manage other users");
    }

    let orchestrator = Orchestrator::new(
        Arc::new(db),
        Arc::new(platform),
        Settings {
            owner_id: config.owner_id,
            default_congratulation: config.default_congratulation.clone(),
            platform_timeout: config.admin_timeout,
        },
    );
    if config.api_token.is_none() {
        warn!("BDAY_API_TOKEN is not set, /commands is open to anyone who can reach it");
    }

    let state = Arc::new(AppStateInner {
        orchestrator,
        api_token: config.api_token.clone(),
    });

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Birthday bot listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
