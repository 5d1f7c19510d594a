//! Database row types. These map directly to SQLite rows and stay distinct
//! from the bday-types models.

use bday_types::models::{User, UserState};

use crate::error::DbError;

pub struct UserRow {
    pub user_id: i64,
    pub user_name: String,
    pub state: String,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let state: UserState = row.state.parse().map_err(DbError::Validation)?;
        Ok(User {
            user_id: row.user_id,
            display_name: row.user_name,
            state,
        })
    }
}

/// Outcome of a full birthday registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub new_user: bool,
    pub new_in_chat: bool,
}
