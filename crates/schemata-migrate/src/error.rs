//! Error types for the migration system.

use std::path::PathBuf;

use schemata_core::SchemaError;

use crate::artifact::MigrationVersion;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// IO error (reading/writing migration artifacts or config).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `make-migration` was called without a name.
    #[error("A migration name is required")]
    MissingName,

    /// The migration name contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid migration name '{0}': only letters, digits, '_' and '-' are allowed")]
    InvalidName(String),

    /// The previous migration's `schema.json` could not be read.
    #[error("Failed to read schema snapshot '{path}': {message}")]
    UnreadableSnapshot {
        /// Path to the snapshot file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No connection URL could be resolved from flags, env or config.
    #[error("No database URL: pass --database-url, set DATABASE_URL, or run init-config")]
    MissingDatabaseUrl,

    /// Capturing or diffing the schema failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The schema is unchanged since the last migration.
    #[error("No changes detected since the last migration")]
    NoChanges,

    /// The migrations directory holds no artifacts.
    #[error("No migrations found in {0}")]
    NoMigrations(PathBuf),

    /// A requested target version has no artifact.
    #[error("Migration version {0} does not exist")]
    UnknownVersion(MigrationVersion),

    /// An artifact directory is missing one of its files, or it is malformed.
    #[error("Migration artifact '{path}' is invalid: {message}")]
    MissingArtifact {
        /// Path to the artifact directory or file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A statement was rejected by the database.
    #[error("Statement failed: {message}\n  {sql}")]
    Statement {
        /// The failing SQL.
        sql: String,
        /// Database error message.
        message: String,
    },

    /// Applying a migration failed; the run stopped there.
    #[error("Migration {version} failed: {source}")]
    MigrationFailed {
        /// The failing migration.
        version: MigrationVersion,
        /// Underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
