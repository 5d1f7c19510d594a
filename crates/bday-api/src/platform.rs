use async_trait::async_trait;
use thiserror::Error;

use bday_types::models::{ChatId, UserId};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform rejected the request: {0}")]
    Api(String),
}

/// What the bot needs to know about a chat from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Ids of the chat's current administrators.
    async fn list_admins(&self, chat_id: ChatId) -> Result<Vec<UserId>, PlatformError>;

    /// Username, or first name, of a chat member. `None` if they are not in the chat.
    async fn member_name(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<String>, PlatformError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// In-memory platform for tests.
    #[derive(Default)]
    pub struct FakePlatform {
        pub admins: HashMap<ChatId, Vec<UserId>>,
        pub members: HashMap<(ChatId, UserId), String>,
        pub failing: bool,
        pub delay: Option<Duration>,
        pub admin_calls: AtomicUsize,
    }

    impl FakePlatform {
        pub fn with_admins(chat_id: ChatId, admins: &[UserId]) -> Self {
            Self {
                admins: HashMap::from([(chat_id, admins.to_vec())]),
                ..Self::default()
            }
        }

        pub fn admin_calls(&self) -> usize {
            self.admin_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatPlatform for FakePlatform {
        async fn list_admins(&self, chat_id: ChatId) -> Result<Vec<UserId>, PlatformError> {
            self.admin_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing {
                return Err(PlatformError::Api("Bad Request: chat not found".into()));
            }
            Ok(self.admins.get(&chat_id).cloned().unwrap_or_default())
        }

        async fn member_name(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<String>, PlatformError> {
            if self.failing {
                return Err(PlatformError::Api("Bad Request: chat not found".into()));
            }
            Ok(self.members.get(&(chat_id, user_id)).cloned())
        }
    }
}
