//! MySQL DDL rendering.
//!
//! Every [`Operation`] renders to a single statement without a trailing
//! semicolon. Identifiers are quoted with backticks.

use crate::operation::{
    AddForeignKeysOp, AlterClause, AlterTableOp, CreateTableOp, DropForeignKeysOp, DropTableOp,
    ForeignKeyDef, Operation,
};
use crate::snapshot::ColumnDescriptor;

/// Maximum length of the `<table>_<column>` part of a foreign key name.
///
/// With the `fk_` prefix and `_idx` suffix the longest generated identifier
/// is 64 characters, MySQL's limit.
pub const FOREIGN_KEY_NAME_MAX: usize = 57;

/// Constraint name for the foreign key on `table.column`.
///
/// Used both when creating and when dropping the key, so the two always
/// agree.
#[must_use]
pub fn foreign_key_name(table: &str, column: &str) -> String {
    let base: String = format!("{table}_{column}")
        .chars()
        .take(FOREIGN_KEY_NAME_MAX)
        .collect();
    format!("fk_{base}")
}

/// Name of the index backing the foreign key on `table.column`.
#[must_use]
pub fn foreign_key_index_name(table: &str, column: &str) -> String {
    format!("{}_idx", foreign_key_name(table, column))
}

/// Name of the unique index on `column`.
#[must_use]
pub fn unique_index_name(column: &str) -> String {
    format!("{column}_UNIQUE")
}

/// MySQL 8 DDL generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates the dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Renders an operation.
    #[must_use]
    pub fn generate_sql(&self, operation: &Operation) -> String {
        match operation {
            Operation::CreateTable(op) => self.create_table(op),
            Operation::DropTable(op) => self.drop_table(op),
            Operation::AlterTable(op) => self.alter_table(op),
            Operation::DropForeignKeys(op) => self.drop_foreign_keys(op),
            Operation::AddForeignKeys(op) => self.add_foreign_keys(op),
        }
    }

    /// `name TYPE [UNSIGNED] NULL|NOT NULL [DEFAULT x] [AUTO_INCREMENT]`.
    #[must_use]
    pub fn column_definition(&self, name: &str, column: &ColumnDescriptor) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(name), column.sql_type);
        if column.unsigned {
            sql.push_str(" UNSIGNED");
        }
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = column.default_sql.as_deref().filter(|d| !d.is_empty()) {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if column.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }
        sql
    }

    fn column_list<S: AsRef<str>>(&self, columns: &[S]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn unique_index(&self, column: &str) -> String {
        format!(
            "UNIQUE INDEX {} ({} ASC) VISIBLE",
            self.quote_identifier(&unique_index_name(column)),
            self.quote_identifier(column)
        )
    }

    fn foreign_key_index(&self, table: &str, key: &ForeignKeyDef) -> String {
        format!(
            "INDEX {} ({} ASC) VISIBLE",
            self.quote_identifier(&foreign_key_index_name(table, &key.column)),
            self.quote_identifier(&key.column)
        )
    }

    fn foreign_key_constraint(&self, table: &str, key: &ForeignKeyDef) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(&foreign_key_name(table, &key.column)),
            self.quote_identifier(&key.column),
            self.quote_identifier(&key.references.table),
            self.quote_identifier(&key.references.column),
            key.references.on_delete.to_sql(),
            key.references.on_update.to_sql()
        )
    }

    fn create_table(&self, op: &CreateTableOp) -> String {
        let mut parts: Vec<String> = op
            .columns
            .iter()
            .map(|(name, column)| self.column_definition(name, column))
            .collect();

        let primary = op.columns.primary_key();
        if !primary.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", self.column_list(&primary)));
        }

        for (name, _) in op.columns.iter().filter(|(_, c)| c.unique) {
            parts.push(self.unique_index(name));
        }

        for (name, column) in op.columns.iter() {
            if let Some(references) = &column.foreign_key {
                let key = ForeignKeyDef {
                    column: name.to_string(),
                    references: references.clone(),
                };
                parts.push(self.foreign_key_index(&op.name, &key));
                parts.push(self.foreign_key_constraint(&op.name, &key));
            }
        }

        format!(
            "CREATE TABLE {} ({})",
            self.quote_identifier(&op.name),
            parts.join(", ")
        )
    }

    fn drop_table(&self, op: &DropTableOp) -> String {
        format!("DROP TABLE {}", self.quote_identifier(&op.name))
    }

    fn alter_clause(&self, clause: &AlterClause) -> String {
        match clause {
            AlterClause::AddColumn { name, column } => {
                format!("ADD COLUMN {}", self.column_definition(name, column))
            }
            AlterClause::DropColumn { name } => {
                format!("DROP COLUMN {}", self.quote_identifier(name))
            }
            AlterClause::ModifyColumn { name, column } => {
                format!("MODIFY COLUMN {}", self.column_definition(name, column))
            }
            AlterClause::DropPrimaryKey => "DROP PRIMARY KEY".to_string(),
            AlterClause::AddPrimaryKey { columns } => {
                format!("ADD PRIMARY KEY ({})", self.column_list(columns))
            }
            AlterClause::DropUniqueIndex { column } => {
                format!(
                    "DROP INDEX {}",
                    self.quote_identifier(&unique_index_name(column))
                )
            }
            AlterClause::AddUniqueIndex { column } => {
                format!("ADD {}", self.unique_index(column))
            }
        }
    }

    fn alter_table(&self, op: &AlterTableOp) -> String {
        let clauses: Vec<String> = op.clauses.iter().map(|c| self.alter_clause(c)).collect();
        format!(
            "ALTER TABLE {} {}",
            self.quote_identifier(&op.table),
            clauses.join(", ")
        )
    }

    fn drop_foreign_keys(&self, op: &DropForeignKeysOp) -> String {
        let constraints = op.columns.iter().map(|column| {
            format!(
                "DROP FOREIGN KEY {}",
                self.quote_identifier(&foreign_key_name(&op.table, column))
            )
        });
        let indexes = op.columns.iter().map(|column| {
            format!(
                "DROP INDEX {}",
                self.quote_identifier(&foreign_key_index_name(&op.table, column))
            )
        });
        format!(
            "ALTER TABLE {} {}",
            self.quote_identifier(&op.table),
            constraints.chain(indexes).collect::<Vec<_>>().join(", ")
        )
    }

    fn add_foreign_keys(&self, op: &AddForeignKeysOp) -> String {
        let clauses: Vec<String> = op
            .keys
            .iter()
            .flat_map(|key| {
                [
                    format!("ADD {}", self.foreign_key_index(&op.table, key)),
                    format!("ADD {}", self.foreign_key_constraint(&op.table, key)),
                ]
            })
            .collect();
        format!(
            "ALTER TABLE {} {}",
            self.quote_identifier(&op.table),
            clauses.join(", ")
        )
    }
}
