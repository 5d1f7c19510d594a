use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use bday_types::models::{ChatId, UserId};

use crate::platform::ChatPlatform;

/// Decides who may change whose records.
///
/// Everyone may act on themself. Acting on someone else requires being the
/// bot owner or a current administrator of the chat. The admin list is fetched
/// from the platform on every check; failures and timeouts count as "not an
/// admin".
pub struct Policy {
    owner_id: Option<UserId>,
    platform: Arc<dyn ChatPlatform>,
    admin_timeout: Duration,
}

impl Policy {
    pub fn new(owner_id: Option<UserId>, platform: Arc<dyn ChatPlatform>, admin_timeout: Duration) -> Self {
        Self {
            owner_id,
            platform,
            admin_timeout,
        }
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_id == Some(user_id)
    }

    pub async fn is_admin(&self, user_id: UserId, chat_id: ChatId) -> bool {
        match tokio::time::timeout(self.admin_timeout, self.platform.list_admins(chat_id)).await {
            Ok(Ok(admins)) => admins.contains(&user_id),
            Ok(Err(e)) => {
                error!("Failed to fetch admin list for chat {}: {}", chat_id, e);
                false
            }
            Err(_) => {
                warn!(
                    "Admin list for chat {} did not arrive within {:?}",
                    chat_id, self.admin_timeout
                );
                false
            }
        }
    }

    pub async fn can_act_on_behalf_of(&self, actor_id: UserId, chat_id: ChatId, target_id: UserId) -> bool {
        if actor_id == target_id {
            return true;
        }
        if self.is_owner(actor_id) {
            debug!("User {} is the bot owner", actor_id);
            return true;
        }
        if self.is_admin(actor_id, chat_id).await {
            debug!("User {} is an admin in chat {}", actor_id, chat_id);
            return true;
        }

        debug!("User {} is neither an admin nor the bot owner", actor_id);
        false
    }
}
