use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

/// How hard to try before giving up on opening the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

type Opener = Box<dyn Fn(&Path) -> rusqlite::Result<Connection> + Send + Sync>;

/// Owns the single database connection.
///
/// The connection is opened lazily and reopened on the next `acquire` after an
/// operation reports it unusable. Opening is retried with a fixed delay; only
/// the last failure is returned to the caller.
pub struct ConnectionManager {
    path: PathBuf,
    retry: RetryPolicy,
    opener: Opener,
    slot: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    pub fn new(path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self::with_opener(path, retry, open)
    }

    /// Like `new`, but every connection attempt goes through `opener`.
    pub(crate) fn with_opener(
        path: impl Into<PathBuf>,
        retry: RetryPolicy,
        opener: impl Fn(&Path) -> rusqlite::Result<Connection> + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            retry,
            opener: Box::new(opener),
            slot: Mutex::new(None),
        }
    }

    /// Run `f` against a live connection, connecting first if needed.
    ///
    /// The lock is held for the duration of `f`, so operations never interleave
    /// on the shared handle.
    pub fn acquire<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let mut slot = self.slot.lock().map_err(|_| DbError::LockPoisoned)?;

        let conn = match slot.take() {
            Some(conn) => conn,
            None => {
                debug!("(Re)creating database connection");
                self.connect_with_retry()?
            }
        };

        let result = f(&conn);
        match &result {
            Err(e) if e.is_connection_lost() => {
                warn!(error = %e, "Discarding unusable database connection");
            }
            _ => *slot = Some(conn),
        }
        result
    }

    pub fn is_connected(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Drop the current connection. The next `acquire` reconnects.
    pub fn close(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.take().is_some() {
                debug!("Database connection closed");
            }
        }
    }

    fn connect_with_retry(&self) -> DbResult<Connection> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Connecting to database, attempt {}/{}", attempt, attempts);

            match (self.opener)(&self.path) {
                Ok(conn) => {
                    info!("Database connection opened at {}", self.path.display());
                    return Ok(conn);
                }
                Err(source) if attempt >= attempts => {
                    return Err(DbError::Connection { attempts, source });
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{}: could not connect to the database ({}). Retrying in {:?}",
                        attempt, attempts, e, self.retry.delay
                    );
                    std::thread::sleep(self.retry.delay);
                }
            }
        }
    }
}

fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    Ok(conn)
}
