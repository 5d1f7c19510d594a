use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use bday_types::models::{ChatId, UserId};

use crate::platform::{ChatPlatform, PlatformError};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// `ChatPlatform` backed by the Telegram Bot API.
pub struct TelegramPlatform {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: UserId,
    first_name: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    user: TgUser,
}

impl TelegramPlatform {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, query: &[(&str, i64)]) -> Result<T, PlatformError> {
        debug!("Telegram API call {} {:?}", method, query);

        // Errors come back as non-2xx with the same JSON envelope, so the
        // status is not checked here.
        let response: ApiResponse<T> = self
            .client
            .get(format!("{}/{}", self.base_url, method))
            .query(query)
            .send()
            .await?
            .json()
            .await?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(PlatformError::Api(
                description.unwrap_or_else(|| format!("{method} returned no result")),
            )),
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn list_admins(&self, chat_id: ChatId) -> Result<Vec<UserId>, PlatformError> {
        let admins: Vec<ChatMember> = self
            .call("getChatAdministrators", &[("chat_id", chat_id)])
            .await?;
        Ok(admins.into_iter().map(|m| m.user.id).collect())
    }

    async fn member_name(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<String>, PlatformError> {
        let member: ChatMember = match self
            .call("getChatMember", &[("chat_id", chat_id), ("user_id", user_id)])
            .await
        {
            Ok(member) => member,
            Err(PlatformError::Api(description)) if description.contains("not found") => return Ok(None),
            Err(e) => return Err(e),
        };

        if matches!(member.status.as_str(), "left" | "kicked") {
            return Ok(None);
        }
        Ok(Some(member.user.username.unwrap_or(member.user.first_name)))
    }
}
