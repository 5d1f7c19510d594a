use std::time::Duration;

use anyhow::{Context, Result};

use bday_api::commands::DEFAULT_CONGRATULATION;
use bday_api::telegram::DEFAULT_API_URL;
use bday_db::RetryPolicy;
use bday_types::models::UserId;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub api_token: Option<String>,
    pub owner_id: Option<UserId>,
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub default_congratulation: String,
    pub db_retry: RetryPolicy,
    pub admin_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let parse = |key: &str| -> Result<Option<u64>> {
            var(key)
                .map(|v| v.trim().parse::<u64>().with_context(|| format!("{key} must be a number, got {v:?}")))
                .transpose()
        };

        let owner_id = var("BDAY_OWNER_ID")
            .map(|v| v.trim().parse::<UserId>().with_context(|| format!("BDAY_OWNER_ID must be a user id, got {v:?}")))
            .transpose()?;

        let port: u16 = match var("BDAY_PORT") {
            Some(v) => v.trim().parse().with_context(|| format!("BDAY_PORT must be a port, got {v:?}"))?,
            None => 3000,
        };

        let defaults = RetryPolicy::default();
        let db_retry = RetryPolicy {
            attempts: parse("BDAY_DB_RETRIES")?.map_or(defaults.attempts, |n| n as u32),
            delay: parse("BDAY_DB_RETRY_DELAY_MS")?.map_or(defaults.delay, Duration::from_millis),
        };

        Ok(Self {
            db_path: var("BDAY_DB_PATH").unwrap_or_else(|| "birthdays.db".into()),
            host: var("BDAY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            api_token: var("BDAY_API_TOKEN"),
            owner_id,
            telegram_token: var("BDAY_TELEGRAM_TOKEN").context("BDAY_TELEGRAM_TOKEN is not set")?,
            telegram_api_url: var("BDAY_TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
            default_congratulation: var("BDAY_DEFAULT_CONGRATULATION")
                .unwrap_or_else(|| DEFAULT_CONGRATULATION.into()),
            db_retry,
            admin_timeout: Duration::from_millis(parse("BDAY_ADMIN_TIMEOUT_MS")?.unwrap_or(5000)),
        })
    }
}
