use bday_types::models::UserId;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("could not connect to the database after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("user {user_id} does not exist")]
    Referential { user_id: UserId },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// True when the handle that produced this error should not be reused.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            DbError::Connection { .. } => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
            ),
            _ => false,
        }
    }

    /// Maps a foreign-key rejection on a write for `user_id` to `Referential`.
    pub(crate) fn on_user_write(err: rusqlite::Error, user_id: UserId) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                DbError::Referential { user_id }
            }
            _ => DbError::Sqlite(err),
        }
    }
}
