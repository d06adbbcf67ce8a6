//! Error types for schema capture and diffing.

/// Errors raised while capturing, validating, or diffing schemas.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Two declared entities map to the same table.
    #[error("Table '{table}' is declared by both '{first}' and '{second}'")]
    DuplicateTable {
        /// The table name both entities claim.
        table: String,
        /// Entity that declared the table first.
        first: String,
        /// Entity that declared it again.
        second: String,
    },

    /// A table declares the same column twice.
    #[error("Column '{column}' is declared twice in table '{table}'")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A property uses a type the dialect does not know.
    #[error("Unknown type '{type_name}' on property '{entity}.{property}'")]
    UnknownType {
        /// Declaring entity.
        entity: String,
        /// Property name.
        property: String,
        /// The rejected type name.
        type_name: String,
    },

    /// A length or precision is unparsable or out of range.
    #[error("Invalid length '{length}' on property '{entity}.{property}': {reason}")]
    InvalidLength {
        /// Declaring entity.
        entity: String,
        /// Property name.
        property: String,
        /// The declared length string.
        length: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `UNSIGNED` was requested on a non-numeric column.
    #[error("UNSIGNED is only valid on numeric columns, '{entity}.{property}' is {sql_type}")]
    UnsignedNotNumeric {
        /// Declaring entity.
        entity: String,
        /// Property name.
        property: String,
        /// Resolved SQL type.
        sql_type: String,
    },

    /// The schema references something that does not exist.
    #[error("Schema integrity error: {0}")]
    SchemaIntegrity(String),

    /// Snapshot (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
