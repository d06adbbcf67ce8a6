//! DDL operations produced by the diff engine.
//!
//! Operations are dialect-neutral data; [`MySqlDialect`](crate::MySqlDialect)
//! renders each one to exactly one SQL statement.

use crate::snapshot::{ColumnDescriptor, ForeignKeyRef, TableSnapshot};

/// One DDL statement's worth of change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `CREATE TABLE` with columns, primary key, unique and FK clauses.
    CreateTable(CreateTableOp),
    /// `DROP TABLE`.
    DropTable(DropTableOp),
    /// `ALTER TABLE` with an ordered clause list.
    AlterTable(AlterTableOp),
    /// Standalone `ALTER TABLE ... DROP FOREIGN KEY ..., DROP INDEX ...`.
    DropForeignKeys(DropForeignKeysOp),
    /// Standalone `ALTER TABLE ... ADD INDEX ..., ADD CONSTRAINT ...`.
    AddForeignKeys(AddForeignKeysOp),
}

impl Operation {
    /// The table this operation touches.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable(op) => &op.name,
            Self::DropTable(op) => &op.name,
            Self::AlterTable(op) => &op.table,
            Self::DropForeignKeys(op) => &op.table,
            Self::AddForeignKeys(op) => &op.table,
        }
    }
}

/// Creates a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableOp {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: TableSnapshot,
}

/// Drops a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTableOp {
    /// Table name.
    pub name: String,
}

/// Alters a table; clauses are rendered in order, comma separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterTableOp {
    /// Table name.
    pub table: String,
    /// Clauses in execution order.
    pub clauses: Vec<AlterClause>,
}

/// A single clause inside `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterClause {
    /// `ADD COLUMN <definition>`.
    AddColumn {
        /// Column name.
        name: String,
        /// New column.
        column: ColumnDescriptor,
    },
    /// `DROP COLUMN <name>`.
    DropColumn {
        /// Column name.
        name: String,
    },
    /// `MODIFY COLUMN <definition>` using the new definition.
    ModifyColumn {
        /// Column name.
        name: String,
        /// Redefined column.
        column: ColumnDescriptor,
    },
    /// `DROP PRIMARY KEY`.
    DropPrimaryKey,
    /// `ADD PRIMARY KEY (<columns>)`.
    AddPrimaryKey {
        /// Key columns in declaration order.
        columns: Vec<String>,
    },
    /// `DROP INDEX <column>_UNIQUE`.
    DropUniqueIndex {
        /// Indexed column.
        column: String,
    },
    /// `ADD UNIQUE INDEX <column>_UNIQUE (<column> ASC) VISIBLE`.
    AddUniqueIndex {
        /// Indexed column.
        column: String,
    },
}

/// Drops foreign key constraints (and their indexes) by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropForeignKeysOp {
    /// Table name.
    pub table: String,
    /// Source columns whose constraints are dropped.
    pub columns: Vec<String>,
}

/// A foreign key attached to a source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    /// Referencing column.
    pub column: String,
    /// Referenced table/column and actions.
    pub references: ForeignKeyRef,
}

/// Adds foreign key constraints (and their indexes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddForeignKeysOp {
    /// Table name.
    pub table: String,
    /// Keys to add.
    pub keys: Vec<ForeignKeyDef>,
}
