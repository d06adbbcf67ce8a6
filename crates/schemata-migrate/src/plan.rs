//! Migration plan builder.
//!
//! Diffs the current schema against the snapshot stored with the most recent
//! migration and writes a new artifact directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use schemata_core::{diff_sql, Declarations, SchemaSnapshot};

use crate::artifact::{
    self, DownPlan, MigrationArtifact, MigrationVersion, MIGRATION_FILE, SCHEMA_FILE, UP_SQL_FILE,
};
use crate::error::{MigrateError, Result};

/// A planned migration, written to disk unless built as a dry run.
#[derive(Debug, Clone)]
pub struct PlannedMigration {
    /// The artifact record.
    pub artifact: MigrationArtifact,
    /// Snapshot persisted as `schema.json`.
    pub snapshot: SchemaSnapshot,
    /// Artifact directory (not created in dry-run mode).
    pub path: PathBuf,
}

/// Builds migration artifacts from schema snapshots.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    migrations_dir: PathBuf,
    allow_empty: bool,
    dry_run: bool,
}

impl PlanBuilder {
    /// Creates a builder writing into `migrations_dir`.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            allow_empty: false,
            dry_run: false,
        }
    }

    /// Allows a migration with no statements.
    #[must_use]
    pub const fn allow_empty(mut self, enabled: bool) -> Self {
        self.allow_empty = enabled;
        self
    }

    /// Enables dry-run mode (the plan is returned but nothing is written).
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Builds the next migration from `current`.
    pub fn build(&self, name: &str, current: &SchemaSnapshot) -> Result<PlannedMigration> {
        self.build_at(name, current, Utc::now())
    }

    /// Captures the declaration document at `declarations` and builds the
    /// next migration from it. The name is checked before the file is read.
    pub fn build_from_declarations(
        &self,
        name: &str,
        declarations: &Path,
    ) -> Result<PlannedMigration> {
        validate_name(name)?;
        let current = capture_declarations(declarations)?;
        self.build(name, &current)
    }

    /// Like [`build`](Self::build) with an explicit clock.
    pub fn build_at(
        &self,
        name: &str,
        current: &SchemaSnapshot,
        now: DateTime<Utc>,
    ) -> Result<PlannedMigration> {
        validate_name(name)?;

        if !self.dry_run {
            fs::create_dir_all(&self.migrations_dir)?;
        }

        let entries = artifact::scan(&self.migrations_dir)?;
        let latest = entries.last();
        let version = MigrationVersion::next(now, latest.map(|e| e.version));

        let previous = latest.map(artifact::MigrationEntry::load_snapshot).transpose()?;
        if let Some(entry) = latest {
            debug!(version = %entry.version, name = %entry.name, "Diffing against previous snapshot");
        }

        let statements = diff_sql(previous.as_ref(), current)?;
        if statements.is_empty() && !self.allow_empty {
            return Err(MigrateError::NoChanges);
        }

        let down = match &previous {
            None => DownPlan::DestroyDatabase,
            Some(previous) => DownPlan::Statements {
                statements: diff_sql(Some(current), previous)?,
            },
        };

        let artifact = MigrationArtifact {
            version,
            name: name.to_string(),
            created_at: now,
            statements,
            down,
        };
        let path = self.migrations_dir.join(artifact.dir_name());
        let planned = PlannedMigration {
            artifact,
            snapshot: current.clone(),
            path,
        };

        if self.dry_run {
            info!(version = %version, "Dry run, nothing written");
        } else {
            self.write(&planned)?;
            info!(
                version = %version,
                statements = planned.artifact.statements.len(),
                path = %planned.path.display(),
                "Created migration"
            );
        }

        Ok(planned)
    }

    /// Writes the artifact into a temporary sibling directory, then renames
    /// it into place.
    fn write(&self, planned: &PlannedMigration) -> Result<()> {
        let staging = tempfile::Builder::new()
            .prefix(".pending-")
            .tempdir_in(&self.migrations_dir)?;

        fs::write(staging.path().join(SCHEMA_FILE), planned.snapshot.to_json()?)?;
        fs::write(
            staging.path().join(MIGRATION_FILE),
            serde_json::to_string_pretty(&planned.artifact)?,
        )?;
        fs::write(
            staging.path().join(UP_SQL_FILE),
            planned.artifact.render_up_sql(),
        )?;

        fs::rename(staging.path(), &planned.path)?;
        Ok(())
    }
}

/// Reads a declaration document and captures its schema.
pub fn capture_declarations(path: &Path) -> Result<SchemaSnapshot> {
    let content = fs::read_to_string(path).map_err(|e| {
        MigrateError::Config(format!("cannot read declarations {}: {e}", path.display()))
    })?;
    Ok(Declarations::from_json(&content)?.capture()?)
}

/// Checks a migration name: non-empty, `[A-Za-z0-9_-]` only.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MigrateError::MissingName);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MigrateError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("add_users-2").is_ok());
        assert!(matches!(validate_name(""), Err(MigrateError::MissingName)));
        assert!(matches!(validate_name("  "), Err(MigrateError::MissingName)));
        assert!(matches!(
            validate_name("../escape"),
            Err(MigrateError::InvalidName(_))
        ));
        assert!(matches!(
            validate_name("with space"),
            Err(MigrateError::InvalidName(_))
        ));
    }
}
