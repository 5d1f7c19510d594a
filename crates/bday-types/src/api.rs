use serde::{Deserialize, Serialize};

use crate::models::{ChatId, UserId};

// -- Commands --

/// A chat command already split from its command token by the transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommandRequest {
    pub actor_id: UserId,
    /// Username or first name of the actor, used when they register themself.
    pub actor_name: String,
    pub chat_id: ChatId,
    pub command: Command,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    SetBirthday {
        #[serde(default)]
        target_id: Option<UserId>,
        date: String,
    },
    DeleteBirthday {
        #[serde(default)]
        target_id: Option<UserId>,
    },
    SetCongratulation {
        #[serde(default)]
        target_id: Option<UserId>,
        text: String,
    },
    ShowCongratulation {
        #[serde(default)]
        target_id: Option<UserId>,
    },
    CongratulateToday,
    Ban {
        target_id: UserId,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetBirthday { .. } => "set_birthday",
            Command::DeleteBirthday { .. } => "delete_birthday",
            Command::SetCongratulation { .. } => "set_congratulation",
            Command::ShowCongratulation { .. } => "show_congratulation",
            Command::CongratulateToday => "congratulate_today",
            Command::Ban { .. } => "ban",
        }
    }
}

// -- Replies --

/// Messages the transport should post back to the chat, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub messages: Vec<String>,
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
