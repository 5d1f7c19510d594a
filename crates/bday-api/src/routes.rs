use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::error;

use bday_types::api::{CommandRequest, ErrorBody, Reply};

use crate::commands::{CommandError, Orchestrator};
use crate::middleware::require_token;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub orchestrator: Orchestrator,
    /// Bearer token the transport must present. `None` disables the check.
    pub api_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/commands", post(handle_command))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

pub async fn handle_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<Reply>, ApiError> {
    let reply = state.orchestrator.handle(req).await?;
    Ok(Json(reply))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db = state.orchestrator.db().clone();
    let check = tokio::task::spawn_blocking(move || {
        db.with_conn(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
    })
    .await;

    let failure = match check {
        Ok(Ok(_)) => return (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("spawn_blocking join error: {e}"),
    };
    error!("Health check failed: {}", failure);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "status": "database unavailable" })),
    )
}

pub struct ApiError(pub CommandError);

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            CommandError::Forbidden { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            CommandError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            CommandError::UnknownMember { .. } => (StatusCode::NOT_FOUND, "UNKNOWN_MEMBER"),
            CommandError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "DATABASE_UNAVAILABLE"),
            CommandError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            CommandError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        if status.is_server_error() {
            error!("Command failed: {}", self.0);
        }

        let body = ErrorBody {
            code: code.to_string(),
            message: self.0.reply_text(),
        };
        (status, Json(body)).into_response()
    }
}
