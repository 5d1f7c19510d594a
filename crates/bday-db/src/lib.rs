pub mod connection;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

pub use connection::{ConnectionManager, RetryPolicy};
pub use error::{DbError, DbResult};
pub use migrations::SchemaStatus;

use rusqlite::Connection;
use std::path::Path;
use tracing::info;

pub struct Database {
    manager: ConnectionManager,
    schema: SchemaStatus,
}

impl Database {
    /// Connect (with retry) and make sure the schema exists.
    pub fn open(path: &Path, retry: RetryPolicy) -> DbResult<Self> {
        let manager = ConnectionManager::new(path, retry);
        let schema = manager.acquire(migrations::ensure_schema)?;

        info!("Database opened at {} (schema {:?})", path.display(), schema);
        Ok(Self { manager, schema })
    }

    pub fn schema_status(&self) -> &SchemaStatus {
        &self.schema
    }

    pub fn with_conn<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        self.manager.acquire(f)
    }

    pub fn close(&self) {
        self.manager.close();
    }
}
