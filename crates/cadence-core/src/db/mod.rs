//! SQLite persistence for plans, steps, results and checkpoints.
//!
//! [`Database`] wraps a single `rusqlite` connection. It is deliberately
//! synchronous; async callers open one per operation inside
//! `tokio::task::spawn_blocking` (see [`crate::store::SqliteStore`]).
//!
//! The relational tables always hold the latest state of each plan. Every save
//! also appends an immutable JSON snapshot to `checkpoints`, in the same
//! transaction, so the latest row set and the latest checkpoint never diverge.

use std::{path::Path, time::Duration};

use rusqlite::Connection;

use crate::error::{PersistenceResultExt, Result};

pub mod checkpoint_queries;
pub mod migrations;
pub mod plan_queries;
pub mod step_queries;
mod utils;

/// How long a writer waits for a competing connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection and operations handler.
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Opens (or creates) the database at `path` and initializes the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection =
            Connection::open(path).persist_context("Failed to open database connection")?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .persist_context("Failed to configure busy timeout")?;

        let db = Self { connection };
        db.initialize_schema()?;
        Ok(db)
    }
}
