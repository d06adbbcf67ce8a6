//! Migration artifacts on disk.
//!
//! Each migration lives in its own directory, `<version>_<name>/`, holding:
//!
//! - `schema.json`: the full schema snapshot after this migration
//! - `migration.json`: the [`MigrationArtifact`] record
//! - `up.sql`: a human-readable rendering of the forward statements
//!
//! Versions are 16 digits: a UTC `YYYYMMDDHHMMSS` timestamp followed by a
//! two-digit sequence, so directory names sort in application order.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use schemata_core::SchemaSnapshot;

use crate::error::{MigrateError, Result};

/// Snapshot file name inside an artifact directory.
pub const SCHEMA_FILE: &str = "schema.json";

/// Artifact record file name inside an artifact directory.
pub const MIGRATION_FILE: &str = "migration.json";

/// Rendered SQL file name inside an artifact directory.
pub const UP_SQL_FILE: &str = "up.sql";

static DIR_PATTERN: OnceLock<Regex> = OnceLock::new();

/// `<version>_<name>`, built once.
fn dir_pattern() -> &'static Regex {
    DIR_PATTERN.get_or_init(|| Regex::new(r"^(\d{16})_(.+)$").expect("valid regex"))
}

/// Totally ordered migration identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationVersion(u64);

impl MigrationVersion {
    const SEQUENCE_SPAN: u64 = 100;

    /// Wraps a raw version number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw version number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The first version of the second containing `now` (sequence `00`).
    #[must_use]
    pub fn base(now: DateTime<Utc>) -> Self {
        let stamp: u64 = now
            .format("%Y%m%d%H%M%S")
            .to_string()
            .parse()
            .unwrap_or_default();
        Self(stamp * Self::SEQUENCE_SPAN)
    }

    /// Next version to allocate: `max(base(now), latest + 1)`.
    ///
    /// Strictly greater than `latest` even if the clock went backwards or
    /// several migrations are created within the same second.
    #[must_use]
    pub fn next(now: DateTime<Utc>, latest: Option<Self>) -> Self {
        let base = Self::base(now);
        match latest {
            Some(latest) if latest >= base => Self(latest.0 + 1),
            _ => base,
        }
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016}", self.0)
    }
}

impl FromStr for MigrationVersion {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.len() > 16 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MigrateError::Config(format!(
                "'{s}' is not a migration version (expected up to 16 digits)"
            )));
        }
        s.parse()
            .map(Self)
            .map_err(|e| MigrateError::Config(format!("'{s}' is not a migration version: {e}")))
    }
}

/// How to revert a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DownPlan {
    /// The first migration: reverting it means destroying the database.
    DestroyDatabase,
    /// Statements restoring the previous snapshot.
    Statements {
        /// Reverse DDL in execution order.
        statements: Vec<String>,
    },
}

/// The persisted record of one migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationArtifact {
    /// Version.
    pub version: MigrationVersion,
    /// User-supplied name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Forward DDL in execution order.
    pub statements: Vec<String>,
    /// Reverse plan.
    pub down: DownPlan,
}

impl MigrationArtifact {
    /// Directory name, `<version>_<name>`.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }

    /// Renders the `up.sql` file.
    #[must_use]
    pub fn render_up_sql(&self) -> String {
        let mut out = format!(
            "-- Migration {}\n-- Created {}\n",
            self.dir_name(),
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if self.statements.is_empty() {
            out.push_str("\n-- No statements\n");
        }
        for sql in &self.statements {
            out.push('\n');
            out.push_str(sql);
            out.push_str(";\n");
        }
        out
    }
}

/// An artifact directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEntry {
    /// Version parsed from the directory name.
    pub version: MigrationVersion,
    /// Name parsed from the directory name.
    pub name: String,
    /// Directory path.
    pub path: PathBuf,
}

impl MigrationEntry {
    /// Loads `migration.json`.
    pub fn load(&self) -> Result<MigrationArtifact> {
        let path = self.path.join(MIGRATION_FILE);
        let content = fs::read_to_string(&path).map_err(|e| MigrateError::MissingArtifact {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let artifact: MigrationArtifact =
            serde_json::from_str(&content).map_err(|e| MigrateError::MissingArtifact {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if artifact.version != self.version {
            return Err(MigrateError::MissingArtifact {
                path,
                message: format!(
                    "records version {} but the directory says {}",
                    artifact.version, self.version
                ),
            });
        }
        Ok(artifact)
    }

    /// Loads `schema.json`.
    pub fn load_snapshot(&self) -> Result<SchemaSnapshot> {
        let path = self.path.join(SCHEMA_FILE);
        fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| SchemaSnapshot::from_json(&content).map_err(|e| e.to_string()))
            .map_err(|message| MigrateError::UnreadableSnapshot { path, message })
    }
}

/// Lists artifact directories under `dir`, sorted by version.
///
/// A missing directory yields an empty list. Entries whose names do not
/// look like `<version>_<name>` are ignored.
pub fn scan(dir: &Path) -> Result<Vec<MigrationEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(captures) = dir_pattern().captures(file_name) else {
            continue;
        };
        let Ok(version) = captures[1].parse::<MigrationVersion>() else {
            continue;
        };
        entries.push(MigrationEntry {
            version,
            name: captures[2].to_string(),
            path: entry.path(),
        });
    }

    entries.sort_by_key(|e| e.version);
    Ok(entries)
}
