use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::DbResult;

pub const USERS_TABLE: &str = "birthday_bot_users";
pub const USER_CHATS_TABLE: &str = "birthday_bot_user_chats";
pub const BIRTHDAYS_TABLE: &str = "birthday_bot_birthdays";
pub const CONGRATULATIONS_TABLE: &str = "birthday_bot_congratulations";

pub const TABLES: [&str; 4] = [
    USERS_TABLE,
    USER_CHATS_TABLE,
    BIRTHDAYS_TABLE,
    CONGRATULATIONS_TABLE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// All four tables were created by this call.
    Created,
    /// All four tables were already there.
    Present,
    /// Some tables exist and some don't. Left untouched.
    Partial { missing: Vec<&'static str> },
}

/// Create the schema if, and only if, none of its tables exist yet.
pub fn ensure_schema(conn: &Connection) -> DbResult<SchemaStatus> {
    let mut missing = Vec::new();
    for table in TABLES {
        if !table_exists(conn, table)? {
            missing.push(table);
        }
    }

    if missing.is_empty() {
        return Ok(SchemaStatus::Present);
    }

    if missing.len() < TABLES.len() {
        warn!(
            "Database schema is partially initialised, missing tables: {}",
            missing.join(", ")
        );
        return Ok(SchemaStatus::Partial { missing });
    }

    // Dropping the transaction on error rolls back whatever was created.
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "
        CREATE TABLE birthday_bot_users (
            user_id     INTEGER NOT NULL PRIMARY KEY,
            user_name   TEXT NOT NULL,
            state       TEXT NOT NULL DEFAULT 'active'
        );

        CREATE TABLE birthday_bot_user_chats (
            user_id     INTEGER NOT NULL REFERENCES birthday_bot_users(user_id),
            chat_id     INTEGER NOT NULL,
            PRIMARY KEY (user_id, chat_id)
        );

        CREATE TABLE birthday_bot_birthdays (
            user_id     INTEGER NOT NULL REFERENCES birthday_bot_users(user_id),
            chat_id     INTEGER NOT NULL,
            day         INTEGER NOT NULL,
            month       INTEGER NOT NULL,
            PRIMARY KEY (user_id, chat_id)
        );

        CREATE INDEX idx_birthdays_chat_date
            ON birthday_bot_birthdays(chat_id, month, day);

        CREATE TABLE birthday_bot_congratulations (
            user_id         INTEGER NOT NULL REFERENCES birthday_bot_users(user_id),
            chat_id         INTEGER NOT NULL,
            congratulation  TEXT NOT NULL,
            PRIMARY KEY (user_id, chat_id)
        );
        ",
    )?;
    tx.commit()?;

    info!("Database schema created");
    Ok(SchemaStatus::Created)
}

pub fn table_exists(conn: &Connection, name: &str) -> DbResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
