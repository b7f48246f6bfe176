//! Database schema initialization and version checks.

use crate::error::{OrchestratorError, PersistenceResultExt, Result};

/// Schema revision written by this build.
pub const SCHEMA_VERSION: i64 = 1;

impl super::Database {
    /// Initializes the database schema using the embedded SQL file.
    pub(super) fn initialize_schema(&self) -> Result<()> {
        self.connection
            .execute("PRAGMA foreign_keys = ON", [])
            .persist_context("Failed to enable foreign keys")?;

        let schema_sql = include_str!("../../assets/schema.sql");
        self.connection
            .execute_batch(schema_sql)
            .persist_context("Failed to initialize database schema")?;

        self.apply_migrations()
    }

    /// Stamps fresh databases and refuses ones written by a newer build.
    fn apply_migrations(&self) -> Result<()> {
        let version: i64 = self
            .connection
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .persist_context("Failed to read schema version")?;

        if version > SCHEMA_VERSION {
            return Err(OrchestratorError::persistence(format!(
                "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            ))
            .build());
        }

        if version < SCHEMA_VERSION {
            log::debug!("Upgrading database schema from version {version} to {SCHEMA_VERSION}");
            self.connection
                .pragma_update(None, "user_version", SCHEMA_VERSION)
                .persist_context("Failed to record schema version")?;
        }

        Ok(())
    }

    /// Schema revision stored in the database file.
    pub fn schema_version(&self) -> Result<i64> {
        self.connection
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .persist_context("Failed to read schema version")
    }
}
