//! # schemata-core
//!
//! Schema snapshots and a pure diff engine emitting MySQL DDL.
//!
//! This crate provides:
//! - [`SchemaSnapshot`], a serializable point-in-time description of every
//!   declared table
//! - [`capture`], which builds a snapshot from any [`MetadataProvider`]
//! - [`Declarations`], a JSON registration table that resolves high-level
//!   property types to MySQL column types
//! - [`diff`], which computes the ordered DDL turning one snapshot into
//!   another
//!
//! Nothing here performs I/O; the `schemata-migrate` crate persists
//! snapshots and applies the generated statements.
//!
//! ## Example
//!
//! ```rust
//! use schemata_core::{diff_sql, ColumnDescriptor, SchemaSnapshot, TableSnapshot};
//!
//! let v1 = SchemaSnapshot::new().table(
//!     "users",
//!     TableSnapshot::new()
//!         .column("id", ColumnDescriptor::new("INT(11)").primary().auto_increment())
//!         .column("name", ColumnDescriptor::new("VARCHAR(255)")),
//! );
//! let v2 = SchemaSnapshot::new().table(
//!     "users",
//!     TableSnapshot::new()
//!         .column("id", ColumnDescriptor::new("INT(11)").primary().auto_increment())
//!         .column("name", ColumnDescriptor::new("VARCHAR(255)"))
//!         .column("email", ColumnDescriptor::new("VARCHAR(255)").unique()),
//! );
//!
//! let sql = diff_sql(Some(&v1), &v2).unwrap();
//! assert_eq!(
//!     sql,
//!     vec![
//!         "ALTER TABLE `users` ADD COLUMN `email` VARCHAR(255) NULL, \
//!          ADD UNIQUE INDEX `email_UNIQUE` (`email` ASC) VISIBLE"
//!     ]
//! );
//! ```

pub mod declaration;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod metadata;
pub mod operation;
pub mod snapshot;

pub use declaration::{
    Declarations, EntityDeclaration, ForeignKeyDeclaration, PropertyDeclaration, PropertyType,
};
pub use dialect::{foreign_key_index_name, foreign_key_name, MySqlDialect};
pub use diff::{diff, diff_sql, SchemaDiff};
pub use error::{Result, SchemaError};
pub use metadata::{capture, MetadataProvider};
pub use operation::{AlterClause, Operation};
pub use snapshot::{ColumnDescriptor, FkAction, ForeignKeyRef, SchemaSnapshot, TableSnapshot};
