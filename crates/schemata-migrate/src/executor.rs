//! Migration executor.
//!
//! This module applies migration artifacts against a database, recording
//! each version in the ledger exactly once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::artifact::{self, MigrationArtifact, MigrationEntry, MigrationVersion};
use crate::connection::Connection;
use crate::error::{MigrateError, Result};
use crate::ledger::{LockAttempt, MigrationLedger};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was pending.
    UpToDate,
    /// These versions were applied, in order.
    Applied(Vec<MigrationVersion>),
    /// Another runner holds the ledger lock; the run stopped after applying
    /// `applied`.
    Locked {
        /// Versions applied before the lock was found held.
        applied: Vec<MigrationVersion>,
    },
}

/// One line of `status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Version.
    pub version: MigrationVersion,
    /// Name.
    pub name: String,
    /// When it was applied, if it was.
    pub applied_at: Option<DateTime<Utc>>,
    /// Whether the ledger records it.
    pub applied: bool,
}

/// Executes migrations against a database.
pub struct MigrationExecutor<C: Connection> {
    conn: C,
    migrations_dir: PathBuf,
    ledger: MigrationLedger,
}

impl<C: Connection> MigrationExecutor<C> {
    /// Creates a new migration executor.
    pub fn new(conn: C, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            migrations_dir: migrations_dir.into(),
            ledger: MigrationLedger::new(),
        }
    }

    /// Uses a custom ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: MigrationLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Returns the ledger.
    #[must_use]
    pub const fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Returns the connection.
    #[must_use]
    pub const fn connection(&self) -> &C {
        &self.conn
    }

    /// Consumes the executor, returning the connection.
    pub fn into_connection(self) -> C {
        self.conn
    }

    /// Artifacts on disk, sorted by version.
    pub fn artifacts(&self) -> Result<Vec<MigrationEntry>> {
        artifact::scan(&self.migrations_dir)
    }

    /// Applied versions and timestamps; empty if the ledger does not exist.
    async fn applied(&mut self) -> Result<BTreeMap<MigrationVersion, Option<DateTime<Utc>>>> {
        if !self.ledger.exists(&mut self.conn).await? {
            return Ok(BTreeMap::new());
        }
        Ok(self
            .ledger
            .applied(&mut self.conn)
            .await?
            .into_iter()
            .map(|m| (m.version, m.applied_at))
            .collect())
    }

    /// Artifacts not yet applied, up to and including `target`.
    pub async fn pending(
        &mut self,
        target: Option<MigrationVersion>,
    ) -> Result<Vec<MigrationEntry>> {
        let entries = self.artifacts()?;
        if entries.is_empty() {
            return Err(MigrateError::NoMigrations(self.migrations_dir.clone()));
        }
        if let Some(target) = target {
            if !entries.iter().any(|e| e.version == target) {
                return Err(MigrateError::UnknownVersion(target));
            }
        }

        let applied = self.applied().await?;
        Ok(entries
            .into_iter()
            .filter(|e| !applied.contains_key(&e.version))
            .filter(|e| target.map_or(true, |t| e.version <= t))
            .collect())
    }

    /// Every artifact with its applied state.
    pub async fn status(&mut self) -> Result<Vec<MigrationStatus>> {
        let entries = self.artifacts()?;
        let applied = self.applied().await?;
        Ok(entries
            .into_iter()
            .map(|e| {
                let applied_at = applied.get(&e.version).copied().flatten();
                MigrationStatus {
                    applied: applied.contains_key(&e.version),
                    version: e.version,
                    name: e.name,
                    applied_at,
                }
            })
            .collect())
    }

    /// Applies pending migrations in version order, stopping at `target`.
    ///
    /// Creates the ledger on the first-ever run. Each migration is applied
    /// under the ledger lock, which is released whatever happens once taken.
    /// A held lock ends the run with [`RunOutcome::Locked`]; a failure rolls
    /// back that migration and ends the run with
    /// [`MigrateError::MigrationFailed`].
    pub async fn run(&mut self, target: Option<MigrationVersion>) -> Result<RunOutcome> {
        let pending = self.pending(target).await?;
        if pending.is_empty() {
            info!("No pending migrations, database is up to date");
            return Ok(RunOutcome::UpToDate);
        }

        if !self.ledger.exists(&mut self.conn).await? {
            debug!(table = %self.ledger.table(), "Creating ledger table");
            self.ledger.create(&mut self.conn).await?;
        }

        let mut applied = Vec::new();
        for entry in pending {
            let artifact = entry.load()?;

            if self.ledger.try_lock(&mut self.conn).await? == LockAttempt::Held {
                warn!(version = %artifact.version, "Migration table locked, skipped");
                return Ok(RunOutcome::Locked { applied });
            }

            let result = self.apply_locked(&artifact).await;
            if self.release_after(result).await? {
                applied.push(artifact.version);
            }
        }

        Ok(RunOutcome::Applied(applied))
    }

    /// Clears the ledger lock, e.g. after a runner died holding it.
    ///
    /// Returns `false` when there is no ledger yet.
    pub async fn unlock(&mut self) -> Result<bool> {
        if !self.ledger.exists(&mut self.conn).await? {
            return Ok(false);
        }
        self.ledger.release(&mut self.conn).await?;
        warn!(table = %self.ledger.table(), "Ledger lock cleared");
        Ok(true)
    }

    /// Releases the lock, then hands back `result`. A failed release does
    /// not mask an earlier error.
    async fn release_after<T>(&mut self, result: Result<T>) -> Result<T> {
        let released = self.ledger.release(&mut self.conn).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release)) => {
                warn!(error = %release, "Lock release after failure failed");
                Err(e)
            }
        }
    }

    /// Applies one artifact while holding the lock. Returns `false` if
    /// another runner applied it in the meantime.
    async fn apply_locked(&mut self, artifact: &MigrationArtifact) -> Result<bool> {
        if self
            .ledger
            .is_applied(&mut self.conn, artifact.version)
            .await?
        {
            info!(version = %artifact.version, "Applied by another runner, skipping");
            return Ok(false);
        }

        info!(
            version = %artifact.version,
            name = %artifact.name,
            "Applying migration"
        );

        if let Err(source) = self.apply_statements(artifact).await {
            if let Err(e) = self.conn.rollback().await {
                warn!(error = %e, "Rollback failed");
            }
            return Err(MigrateError::MigrationFailed {
                version: artifact.version,
                source: Box::new(source),
            });
        }

        info!(
            version = %artifact.version,
            name = %artifact.name,
            "Migration applied successfully"
        );
        Ok(true)
    }

    async fn apply_statements(&mut self, artifact: &MigrationArtifact) -> Result<()> {
        self.conn.begin().await?;
        for sql in &artifact.statements {
            debug!(sql = %sql, "Executing SQL");
            self.conn.execute(sql).await?;
        }
        self.ledger.record(&mut self.conn, artifact.version).await?;
        self.conn.commit().await
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<()> {
        self.conn.close().await
    }
}
