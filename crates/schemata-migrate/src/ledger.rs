//! Migration ledger.
//!
//! This module manages the `__schemata_migrations` table that records which
//! versions have been applied, and the lock flag that keeps concurrent
//! runners from applying the same migration twice.
//!
//! The lock lives on a dedicated row with version `0`, which is never a
//! migration version. The row is inserted on demand, so a ledger left empty
//! by a failed first migration still has something to lock.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::artifact::MigrationVersion;
use crate::connection::Connection;
use crate::error::Result;

/// Default ledger table name.
pub const LEDGER_TABLE: &str = "__schemata_migrations";

/// Version of the row carrying the lock flag.
pub const LOCK_ROW: u64 = 0;

/// A version recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Applied version.
    pub version: MigrationVersion,
    /// When it was applied, if the stored timestamp parsed.
    pub applied_at: Option<DateTime<Utc>>,
}

/// Result of trying to take the ledger lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// The lock is ours until [`MigrationLedger::release`].
    Acquired,
    /// Another runner holds the lock.
    Held,
}

/// SQL access to the ledger table.
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    table: String,
}

impl Default for MigrationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationLedger {
    /// Creates a ledger using [`LEDGER_TABLE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_table(LEDGER_TABLE)
    }

    /// Creates a ledger backed by a custom table name.
    #[must_use]
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Ledger table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn quoted(&self) -> String {
        format!("`{}`", self.table.replace('`', "``"))
    }

    /// `CREATE TABLE` for the ledger.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             `version` BIGINT UNSIGNED NOT NULL, \
             `date` DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             `locked` TINYINT(1) NOT NULL DEFAULT 0, \
             PRIMARY KEY (`version`))",
            self.quoted()
        )
    }

    /// Counts ledger tables in the current database (`"0"` or `"1"`).
    #[must_use]
    pub fn exists_sql(&self) -> String {
        format!(
            "SELECT CAST(COUNT(*) AS CHAR) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = '{}'",
            self.table.replace('\'', "''")
        )
    }

    /// All applied versions with their timestamps, oldest first.
    #[must_use]
    pub fn applied_sql(&self) -> String {
        format!(
            "SELECT CAST(`version` AS CHAR), CAST(`date` AS CHAR) FROM {} \
             WHERE `version` <> {LOCK_ROW} ORDER BY `version`",
            self.quoted()
        )
    }

    /// Inserts the lock row unless it is already there.
    #[must_use]
    pub fn seed_lock_sql(&self) -> String {
        format!(
            "INSERT IGNORE INTO {} (`version`, `locked`) VALUES ({LOCK_ROW}, 0)",
            self.quoted()
        )
    }

    /// Reads the lock flag, locking the row for update.
    #[must_use]
    pub fn lock_probe_sql(&self) -> String {
        format!(
            "SELECT CAST(`locked` AS CHAR) FROM {} WHERE `version` = {LOCK_ROW} FOR UPDATE",
            self.quoted()
        )
    }

    /// Sets the lock flag.
    #[must_use]
    pub fn lock_sql(&self) -> String {
        format!(
            "UPDATE {} SET `locked` = 1 WHERE `version` = {LOCK_ROW}",
            self.quoted()
        )
    }

    /// Records a version.
    #[must_use]
    pub fn insert_sql(&self, version: MigrationVersion) -> String {
        format!(
            "INSERT INTO {} (`version`) VALUES ({})",
            self.quoted(),
            version.get()
        )
    }

    /// Clears the lock flag.
    #[must_use]
    pub fn release_sql(&self) -> String {
        format!(
            "UPDATE {} SET `locked` = 0 WHERE `version` = {LOCK_ROW}",
            self.quoted()
        )
    }

    /// Returns whether the ledger table exists.
    pub async fn exists<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<bool> {
        let rows = conn.query(&self.exists_sql()).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(|count| count.trim().parse::<u64>().ok())
            .is_some_and(|count| count > 0))
    }

    /// Creates the ledger table.
    pub async fn create<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<()> {
        conn.execute(&self.create_table_sql()).await?;
        Ok(())
    }

    /// Gets all applied migrations, oldest first.
    pub async fn applied<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
    ) -> Result<Vec<AppliedMigration>> {
        let rows = conn.query(&self.applied_sql()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let version = row.get(0)?.parse().ok()?;
                let applied_at = row.get(1).and_then(parse_timestamp);
                Some(AppliedMigration {
                    version,
                    applied_at,
                })
            })
            .collect())
    }

    /// Checks if a version has been applied.
    pub async fn is_applied<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        version: MigrationVersion,
    ) -> Result<bool> {
        Ok(self
            .applied(conn)
            .await?
            .iter()
            .any(|m| m.version == version))
    }

    /// Tries to take the lock.
    ///
    /// Inside one transaction: inserts the lock row if missing, reads it
    /// `FOR UPDATE`, and either sets the flag and commits or, when the flag
    /// is already set, rolls back and reports [`LockAttempt::Held`].
    pub async fn try_lock<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<LockAttempt> {
        conn.begin().await?;
        match self.claim(conn).await {
            Ok(LockAttempt::Acquired) => {
                conn.commit().await?;
                Ok(LockAttempt::Acquired)
            }
            Ok(LockAttempt::Held) => {
                conn.rollback().await?;
                Ok(LockAttempt::Held)
            }
            Err(e) => {
                if let Err(rollback) = conn.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback after failed lock attempt failed");
                }
                Err(e)
            }
        }
    }

    async fn claim<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<LockAttempt> {
        conn.execute(&self.seed_lock_sql()).await?;
        let rows = conn.query(&self.lock_probe_sql()).await?;
        let held = rows
            .first()
            .and_then(|row| row.get(0))
            .is_some_and(|locked| locked.trim() != "0");
        if held {
            return Ok(LockAttempt::Held);
        }
        conn.execute(&self.lock_sql()).await?;
        Ok(LockAttempt::Acquired)
    }

    /// Records a version as applied.
    pub async fn record<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        version: MigrationVersion,
    ) -> Result<()> {
        conn.execute(&self.insert_sql(version)).await?;
        Ok(())
    }

    /// Releases the lock.
    pub async fn release<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<()> {
        conn.execute(&self.release_sql()).await?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc())
        })
}
