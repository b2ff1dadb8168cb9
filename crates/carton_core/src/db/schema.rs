//! Schema registry and migration executor.
//!
//! # Responsibility
//! - Hold the application's ordered schema migrations.
//! - Apply pending migrations atomically on a connection.
//!
//! # Invariants
//! - Registered `version` values are strictly increasing and non-zero.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

/// One schema migration step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

/// Ordered set of migrations describing the application schema.
///
/// carton stays schema-agnostic: the entity tables belong to the
/// application, which passes its `Schema` at connection open time.
#[derive(Debug, Clone)]
pub struct Schema {
    migrations: Vec<Migration>,
}

impl Schema {
    /// Builds a schema from migrations ordered by version.
    ///
    /// # Errors
    /// - `NonMonotonicMigration` when versions are not strictly
    ///   increasing, or when a version is zero.
    pub fn new(migrations: impl Into<Vec<Migration>>) -> DbResult<Self> {
        let migrations = migrations.into();
        let mut previous = 0u32;
        for migration in &migrations {
            if migration.version <= previous {
                return Err(DbError::NonMonotonicMigration {
                    previous,
                    next: migration.version,
                });
            }
            previous = migration.version;
        }
        Ok(Self { migrations })
    }

    /// Latest migration version in this schema.
    pub fn latest_version(&self) -> u32 {
        self.migrations
            .last()
            .map_or(0, |migration| migration.version)
    }

    pub(crate) fn migrations(&self) -> &[Migration] {
        &self.migrations
    }
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection, schema: &Schema) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = schema.latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in schema.migrations() {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
