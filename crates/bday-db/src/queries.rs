use bday_types::models::{BirthdayDate, BirthdayMatch, ChatId, User, UserId};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::Database;
use crate::error::{DbError, DbResult};
use crate::models::{Registration, UserRow};

/// Longest congratulation text accepted, in characters.
pub const MAX_CONGRATULATION_LEN: usize = 1024;

impl Database {
    // -- Users --

    pub fn user_exists(&self, user_id: UserId) -> DbResult<bool> {
        self.with_conn(|conn| query_user_exists(conn, user_id))
    }

    /// Insert a new active user. Fails if the id is already taken.
    pub fn add_user(&self, user_id: UserId, display_name: &str) -> DbResult<()> {
        debug!("Adding user {}", user_id);
        self.with_conn(|conn| insert_user(conn, user_id, display_name))
    }

    pub fn get_user(&self, user_id: UserId) -> DbResult<Option<User>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, user_name, state FROM birthday_bot_users WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(UserRow {
                            user_id: row.get(0)?,
                            user_name: row.get(1)?,
                            state: row.get(2)?,
                        })
                    },
                )
                .optional()?;

            row.map(User::try_from).transpose()
        })
    }

    /// Returns false when there was no such user.
    pub fn ban_user(&self, user_id: UserId) -> DbResult<bool> {
        debug!("Banning user {}", user_id);
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE birthday_bot_users SET state = 'banned' WHERE user_id = ?1",
                [user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Chat membership --

    pub fn is_registered_in_chat(&self, user_id: UserId, chat_id: ChatId) -> DbResult<bool> {
        self.with_conn(|conn| query_membership_exists(conn, user_id, chat_id))
    }

    pub fn add_chat_membership(&self, user_id: UserId, chat_id: ChatId) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO birthday_bot_user_chats (user_id, chat_id) VALUES (?1, ?2)",
                [user_id, chat_id],
            )
            .map_err(|e| DbError::on_user_write(e, user_id))?;
            Ok(())
        })
    }

    // -- Birthdays --

    /// Insert the (user, chat) birthday or overwrite its day and month.
    pub fn upsert_birthday(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        day: u8,
        month: u8,
    ) -> DbResult<()> {
        debug!("Saving birthday {:02}.{:02} for user {} in chat {}", day, month, user_id, chat_id);
        self.with_conn(|conn| write_birthday(conn, user_id, chat_id, day, month))
    }

    pub fn birthday_for(&self, user_id: UserId, chat_id: ChatId) -> DbResult<Option<BirthdayDate>> {
        self.with_conn(|conn| {
            let date = conn
                .query_row(
                    "SELECT day, month FROM birthday_bot_birthdays WHERE user_id = ?1 AND chat_id = ?2",
                    [user_id, chat_id],
                    |row| {
                        Ok(BirthdayDate {
                            day: row.get(0)?,
                            month: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(date)
        })
    }

    /// Returns whether a row was removed. Missing rows are not an error.
    pub fn delete_birthday(&self, user_id: UserId, chat_id: ChatId) -> DbResult<bool> {
        debug!("Deleting birthday for user {} in chat {}", user_id, chat_id);
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM birthday_bot_birthdays WHERE user_id = ?1 AND chat_id = ?2",
                [user_id, chat_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Non-banned users with a birthday on `day.month` registered in `chat_id`.
    pub fn users_with_birthday_on(
        &self,
        day: u8,
        month: u8,
        chat_id: ChatId,
    ) -> DbResult<Vec<BirthdayMatch>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.user_id, b.chat_id, u.user_name
                 FROM birthday_bot_users u
                 LEFT JOIN birthday_bot_birthdays b ON u.user_id = b.user_id
                 WHERE u.state != 'banned'
                   AND b.day = ?1 AND b.month = ?2 AND b.chat_id = ?3
                 ORDER BY u.user_name, b.user_id",
            )?;

            let rows = stmt
                .query_map(params![day, month, chat_id], |row| {
                    Ok(BirthdayMatch {
                        user_id: row.get(0)?,
                        chat_id: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Create the user and chat membership if needed, then save the birthday.
    ///
    /// All three steps commit together. An existing user's display name is
    /// refreshed to `display_name`.
    pub fn register_birthday(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        display_name: &str,
        date: BirthdayDate,
    ) -> DbResult<Registration> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let new_user = !query_user_exists(&tx, user_id)?;
            if new_user {
                debug!("Adding new user {}", user_id);
                insert_user(&tx, user_id, display_name)?;
            } else {
                tx.execute(
                    "UPDATE birthday_bot_users SET user_name = ?2
                     WHERE user_id = ?1 AND user_name != ?2",
                    params![user_id, display_name],
                )?;
            }

            let new_in_chat = tx.execute(
                "INSERT OR IGNORE INTO birthday_bot_user_chats (user_id, chat_id) VALUES (?1, ?2)",
                [user_id, chat_id],
            )? > 0;
            if new_in_chat {
                debug!("Registered user {} in chat {}", user_id, chat_id);
            }

            write_birthday(&tx, user_id, chat_id, date.day, date.month)?;
            tx.commit()?;

            Ok(Registration {
                new_user,
                new_in_chat,
            })
        })
    }

    // -- Congratulations --

    /// Insert or replace the custom congratulation for (user, chat).
    ///
    /// The text is stored exactly as given, inner whitespace included.
    pub fn upsert_congratulation(&self, user_id: UserId, chat_id: ChatId, text: &str) -> DbResult<()> {
        validate_congratulation(user_id, chat_id, text)?;
        debug!("Saving congratulation for user {} in chat {}", user_id, chat_id);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO birthday_bot_congratulations (user_id, chat_id, congratulation)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, chat_id) DO UPDATE SET congratulation = excluded.congratulation",
                params![user_id, chat_id, text],
            )
            .map_err(|e| DbError::on_user_write(e, user_id))?;
            Ok(())
        })
    }

    /// `None` means no custom text; callers fall back to their default.
    pub fn congratulation_for(&self, user_id: UserId, chat_id: ChatId) -> DbResult<Option<String>> {
        self.with_conn(|conn| {
            let text = conn
                .query_row(
                    "SELECT congratulation FROM birthday_bot_congratulations
                     WHERE user_id = ?1 AND chat_id = ?2",
                    [user_id, chat_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(text)
        })
    }
}

fn query_user_exists(conn: &Connection, user_id: UserId) -> DbResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM birthday_bot_users WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_membership_exists(conn: &Connection, user_id: UserId, chat_id: ChatId) -> DbResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM birthday_bot_user_chats WHERE user_id = ?1 AND chat_id = ?2",
            [user_id, chat_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_user(conn: &Connection, user_id: UserId, display_name: &str) -> DbResult<()> {
    conn.execute(
        "INSERT INTO birthday_bot_users (user_id, user_name, state) VALUES (?1, ?2, 'active')",
        params![user_id, display_name],
    )?;
    Ok(())
}

fn write_birthday(conn: &Connection, user_id: UserId, chat_id: ChatId, day: u8, month: u8) -> DbResult<()> {
    conn.execute(
        "INSERT INTO birthday_bot_birthdays (user_id, chat_id, day, month)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, chat_id) DO UPDATE SET day = excluded.day, month = excluded.month",
        params![user_id, chat_id, day, month],
    )
    .map_err(|e| DbError::on_user_write(e, user_id))?;
    Ok(())
}

fn validate_congratulation(user_id: UserId, chat_id: ChatId, text: &str) -> DbResult<()> {
    if user_id == 0 || chat_id == 0 {
        return Err(DbError::Validation(format!(
            "user and chat ids must be non-zero, got user {user_id} chat {chat_id}"
        )));
    }
    if text.trim().is_empty() {
        return Err(DbError::Validation("congratulation text is empty".into()));
    }
    let len = text.chars().count();
    if len > MAX_CONGRATULATION_LEN {
        return Err(DbError::Validation(format!(
            "congratulation text is {len} characters, limit is {MAX_CONGRATULATION_LEN}"
        )));
    }
    Ok(())
}
