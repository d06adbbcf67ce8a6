//! Schema snapshot types.
//!
//! A [`SchemaSnapshot`] is the point-in-time, by-value description of every
//! declared table. It is what gets persisted as `schema.json` next to each
//! migration and what the diff engine compares. Column order inside a
//! [`TableSnapshot`] is declaration order and survives serialization.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FkAction {
    /// Reject the change while referencing rows exist.
    Restrict,
    /// Propagate the delete/update to referencing rows.
    #[default]
    Cascade,
    /// Set the referencing column to NULL.
    SetNull,
    /// Deferred check; behaves like `Restrict` on InnoDB.
    NoAction,
}

impl FkAction {
    /// Returns the SQL keyword(s) for this action.
    #[must_use]
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// Target of a foreign key declared on a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// `ON DELETE` action.
    pub on_delete: FkAction,
    /// `ON UPDATE` action.
    pub on_update: FkAction,
}

impl ForeignKeyRef {
    /// Creates a reference with `CASCADE` on both delete and update.
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: FkAction::Cascade,
            on_update: FkAction::Cascade,
        }
    }

    /// Sets the `ON DELETE` action.
    #[must_use]
    pub const fn on_delete(mut self, action: FkAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the `ON UPDATE` action.
    #[must_use]
    pub const fn on_update(mut self, action: FkAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Resolved description of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Dialect type, e.g. `VARCHAR(255)` or `DECIMAL(10, 2)`.
    pub sql_type: String,
    /// Part of the primary key.
    pub primary: bool,
    /// Accepts NULL.
    pub nullable: bool,
    /// Has its own unique index.
    pub unique: bool,
    /// `UNSIGNED` modifier (numeric types only).
    pub unsigned: bool,
    /// `AUTO_INCREMENT` modifier.
    pub auto_increment: bool,
    /// Raw SQL for the `DEFAULT` clause.
    pub default_sql: Option<String>,
    /// Foreign key declared on this column.
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnDescriptor {
    /// Creates a nullable column of the given SQL type.
    #[must_use]
    pub fn new(sql_type: impl Into<String>) -> Self {
        Self {
            sql_type: sql_type.into(),
            primary: false,
            nullable: true,
            unique: false,
            unsigned: false,
            auto_increment: false,
            default_sql: None,
            foreign_key: None,
        }
    }

    /// Marks the column as part of the primary key (implies NOT NULL).
    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds the `UNSIGNED` modifier.
    #[must_use]
    pub const fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the raw default SQL.
    #[must_use]
    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default_sql = Some(sql.into());
        self
    }

    /// Declares a foreign key on this column.
    #[must_use]
    pub fn references(mut self, foreign_key: ForeignKeyRef) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }

    /// Returns whether the SQL type is numeric.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        is_numeric_type(&self.sql_type)
    }
}

/// Returns whether a MySQL type name is numeric.
#[must_use]
pub fn is_numeric_type(sql_type: &str) -> bool {
    const NUMERIC: &[&str] = &[
        "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "INTEGER", "BIGINT", "DECIMAL", "NUMERIC",
        "FLOAT", "DOUBLE", "REAL",
    ];
    let base = sql_type
        .trim()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    NUMERIC.contains(&base.as_str())
}

/// Columns of one table, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    columns: Vec<(String, ColumnDescriptor)>,
}

impl TableSnapshot {
    /// Creates an empty table snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Appends a column, builder style. Replaces an existing column of the
    /// same name in place.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, column: ColumnDescriptor) -> Self {
        self.insert(name, column);
        self
    }

    /// Inserts a column, returning the previous descriptor if the name was
    /// already present. Replacement keeps the original position.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        column: ColumnDescriptor,
    ) -> Option<ColumnDescriptor> {
        let name = name.into();
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            return Some(std::mem::replace(&mut slot.1, column));
        }
        self.columns.push((name, column));
        None
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Returns whether a column exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates `(name, descriptor)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnDescriptor)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Column names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Names of the primary key columns, in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, c)| c.primary)
            .map(|(n, _)| n)
            .collect()
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the table has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for TableSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, column) in &self.columns {
            map.serialize_entry(name, column)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TableSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ColumnsVisitor;

        impl<'de> Visitor<'de> for ColumnsVisitor {
            type Value = TableSnapshot;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of column name to column descriptor")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut table = TableSnapshot::new();
                while let Some((name, column)) =
                    access.next_entry::<String, ColumnDescriptor>()?
                {
                    if table.contains(&name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate column '{name}'"
                        )));
                    }
                    table.columns.push((name, column));
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(ColumnsVisitor)
    }
}

/// Every declared table, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, TableSnapshot>,
}

impl SchemaSnapshot {
    /// Creates an empty schema snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Adds a table, builder style.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>, table: TableSnapshot) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Inserts a table, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, table: TableSnapshot) -> Option<TableSnapshot> {
        self.tables.insert(name.into(), table)
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Returns whether a table exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterates tables sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableSnapshot)> {
        self.tables.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if no tables are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Serializes to the `schema.json` document format.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a `schema.json` document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
