//! Schema migrations for the ledger and log databases
//!
//! A migration set is an ordered list of `(name, sql)` pairs embedded with
//! `include_str!`. The first entry must create `sys_migrations`; every entry,
//! including that one, is recorded there by name once it has run.

use std::collections::HashSet;

use duckdb::Connection;

use crate::domain::result::{Error, Result};
use crate::migrations::MIGRATIONS;

/// Embedded `(file name, sql)` pairs, in application order
pub type MigrationSet = &'static [(&'static str, &'static str)];

/// Outcome of [`MigrationService::run_pending`]
#[derive(Debug, Default)]
pub struct MigrationResult {
    pub applied: Vec<String>,
    pub already_applied: usize,
}

/// Applies one migration set to one connection
pub struct MigrationService<'a> {
    conn: &'a Connection,
    migrations: MigrationSet,
}

impl<'a> MigrationService<'a> {
    /// Ledger schema
    pub fn new(conn: &'a Connection) -> Self {
        Self::with_migrations(conn, MIGRATIONS)
    }

    pub fn with_migrations(conn: &'a Connection, migrations: MigrationSet) -> Self {
        Self { conn, migrations }
    }

    /// Apply every migration not yet recorded, in set order
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let Some((bootstrap, bootstrap_sql)) = self.migrations.first() else {
            return Ok(MigrationResult::default());
        };
        // Idempotent: the bookkeeping table is created with IF NOT EXISTS
        self.conn.execute_batch(bootstrap_sql)?;

        let recorded = self.recorded()?;
        let mut result = MigrationResult::default();

        for (name, sql) in self.migrations {
            if recorded.contains(*name) {
                result.already_applied += 1;
                continue;
            }
            if name != bootstrap {
                tracing::debug!(migration = %name, "applying migration");
                self.conn
                    .execute_batch(sql)
                    .map_err(|e| Error::storage(format!("migration {} failed: {}", name, e)))?;
            }
            self.conn.execute(
                "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                [*name],
            )?;
            result.applied.push(name.to_string());
        }

        if !result.applied.is_empty() {
            tracing::info!(applied = result.applied.len(), "schema migrated");
        }
        Ok(result)
    }

    /// Names of migrations in the set that have not run yet
    pub fn pending(&self) -> Result<Vec<&'static str>> {
        let recorded = if self.bookkeeping_exists()? {
            self.recorded()?
        } else {
            HashSet::new()
        };
        Ok(self
            .migrations
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !recorded.contains(*name))
            .collect())
    }

    fn recorded(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(names.collect::<duckdb::Result<_>>()?)
    }

    fn bookkeeping_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_migrations::LOG_MIGRATIONS;

    #[test]
    fn test_fresh_database_applies_everything_once() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);
        assert_eq!(service.pending().unwrap().len(), MIGRATIONS.len());

        let first = service.run_pending().unwrap();
        assert_eq!(first.applied.len(), MIGRATIONS.len());
        assert_eq!(first.already_applied, 0);

        let second = service.run_pending().unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.already_applied, MIGRATIONS.len());
        assert!(service.pending().unwrap().is_empty());
    }

    #[test]
    fn test_only_unrecorded_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].1).unwrap();
        conn.execute(
            "INSERT INTO sys_migrations (migration_name) VALUES (?)",
            [MIGRATIONS[0].0],
        )
        .unwrap();

        let service = MigrationService::new(&conn);
        assert_eq!(service.pending().unwrap(), vec![MIGRATIONS[1].0]);

        let result = service.run_pending().unwrap();
        assert_eq!(result.applied, vec![MIGRATIONS[1].0.to_string()]);
        assert_eq!(result.already_applied, 1);
    }

    #[test]
    fn test_log_migrations_are_independent() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::with_migrations(&conn, LOG_MIGRATIONS);
        let result = service.run_pending().unwrap();
        assert_eq!(result.applied.len(), LOG_MIGRATIONS.len());

        let logs: i64 = conn
            .query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(logs, 0);
    }
}
