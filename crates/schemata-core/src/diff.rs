//! Schema diff engine.
//!
//! Compares two snapshots and produces the ordered DDL operations that turn
//! the first into the second. Pure and deterministic: tables are visited in
//! name order and columns in declaration order.
//!
//! Statement order across tables:
//!
//! 1. foreign key drops of kept tables,
//! 2. `DROP TABLE` for removed tables (referencing tables first),
//! 3. the main `ALTER TABLE` of each kept table,
//! 4. `CREATE TABLE` for added tables (referenced tables first),
//! 5. foreign key adds of kept tables.

use std::collections::{BTreeMap, BTreeSet};

use crate::dialect::MySqlDialect;
use crate::error::{Result, SchemaError};
use crate::operation::{
    AddForeignKeysOp, AlterClause, AlterTableOp, CreateTableOp, DropForeignKeysOp, DropTableOp,
    ForeignKeyDef, Operation,
};
use crate::snapshot::{ColumnDescriptor, SchemaSnapshot, TableSnapshot};

/// Ordered operations transforming one snapshot into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Operations in execution order.
    pub operations: Vec<Operation>,
}

impl SchemaDiff {
    /// Returns `true` when the snapshots are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Renders every operation, one statement each.
    #[must_use]
    pub fn to_sql(&self, dialect: &MySqlDialect) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| dialect.generate_sql(op))
            .collect()
    }
}

/// Computes the operations turning `old` into `new`.
///
/// `old == None` means an empty database: every table is created.
///
/// # Errors
///
/// Returns [`SchemaError::SchemaIntegrity`] when a foreign key in `new`
/// points at a table or column that `new` does not contain.
pub fn diff(old: Option<&SchemaSnapshot>, new: &SchemaSnapshot) -> Result<SchemaDiff> {
    validate_references(new)?;

    let Some(old) = old else {
        let operations = creation_order(new, new.table_names())
            .into_iter()
            .filter_map(|name| new.get(name).map(|table| create_table(name, table)))
            .collect();
        return Ok(SchemaDiff { operations });
    };

    let old_names: BTreeSet<&str> = old.table_names().collect();
    let new_names: BTreeSet<&str> = new.table_names().collect();

    let added: Vec<&str> = new_names.difference(&old_names).copied().collect();
    let removed: Vec<&str> = old_names.difference(&new_names).copied().collect();

    let mut fk_drops = Vec::new();
    let mut alters = Vec::new();
    let mut fk_adds = Vec::new();

    for name in new_names.intersection(&old_names) {
        let (Some(from), Some(to)) = (old.get(name), new.get(name)) else {
            continue;
        };
        let table = TableDiff::compute(from, to);
        if !table.fk_drops.is_empty() {
            fk_drops.push(Operation::DropForeignKeys(DropForeignKeysOp {
                table: (*name).to_string(),
                columns: table.fk_drops,
            }));
        }
        if !table.clauses.is_empty() {
            alters.push(Operation::AlterTable(AlterTableOp {
                table: (*name).to_string(),
                clauses: table.clauses,
            }));
        }
        if !table.fk_adds.is_empty() {
            fk_adds.push(Operation::AddForeignKeys(AddForeignKeysOp {
                table: (*name).to_string(),
                keys: table.fk_adds,
            }));
        }
    }

    let mut operations = fk_drops;

    let mut drop_order = creation_order(old, removed.iter().copied());
    drop_order.reverse();
    operations.extend(drop_order.into_iter().map(|name| {
        Operation::DropTable(DropTableOp {
            name: name.to_string(),
        })
    }));

    operations.extend(alters);

    operations.extend(
        creation_order(new, added.iter().copied())
            .into_iter()
            .filter_map(|name| new.get(name).map(|table| create_table(name, table))),
    );

    operations.extend(fk_adds);

    Ok(SchemaDiff { operations })
}

/// Computes the diff and renders it with [`MySqlDialect`].
///
/// # Errors
///
/// Same as [`diff`].
pub fn diff_sql(old: Option<&SchemaSnapshot>, new: &SchemaSnapshot) -> Result<Vec<String>> {
    Ok(diff(old, new)?.to_sql(&MySqlDialect::new()))
}

fn create_table(name: &str, table: &TableSnapshot) -> Operation {
    Operation::CreateTable(CreateTableOp {
        name: name.to_string(),
        columns: table.clone(),
    })
}

fn validate_references(schema: &SchemaSnapshot) -> Result<()> {
    for (table_name, table) in schema.iter() {
        for (column_name, column) in table.iter() {
            let Some(fk) = &column.foreign_key else {
                continue;
            };
            let Some(target) = schema.get(&fk.table) else {
                return Err(SchemaError::SchemaIntegrity(format!(
                    "{table_name}.{column_name} references missing table `{}`",
                    fk.table
                )));
            };
            if !target.contains(&fk.column) {
                return Err(SchemaError::SchemaIntegrity(format!(
                    "{table_name}.{column_name} references missing column `{}.{}`",
                    fk.table, fk.column
                )));
            }
        }
    }
    Ok(())
}

/// Orders `subset` so that referenced tables come before their referrers.
///
/// Only references between members of `subset` count. Ties are broken by
/// name; tables caught in a cycle are appended in name order.
fn creation_order<'a>(
    schema: &'a SchemaSnapshot,
    subset: impl IntoIterator<Item = &'a str>,
) -> Vec<&'a str> {
    let members: BTreeSet<&str> = subset.into_iter().collect();

    let mut in_degree: BTreeMap<&str, usize> = members.iter().map(|&n| (n, 0)).collect();
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for &name in &members {
        let Some(table) = schema.get(name) else {
            continue;
        };
        let targets: BTreeSet<&str> = table
            .iter()
            .filter_map(|(_, c)| c.foreign_key.as_ref())
            .map(|fk| fk.table.as_str())
            .filter(|target| *target != name && members.contains(target))
            .collect();
        for target in targets {
            dependents.entry(target).or_default().insert(name);
            if let Some(degree) = in_degree.get_mut(name) {
                *degree += 1;
            }
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut order = Vec::with_capacity(members.len());

    while let Some(name) = ready.pop_first() {
        order.push(name);
        in_degree.remove(name);
        for &dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    order.extend(in_degree.into_keys());
    order
}

/// Changes within one kept table.
#[derive(Debug, Default)]
struct TableDiff {
    fk_drops: Vec<String>,
    clauses: Vec<AlterClause>,
    fk_adds: Vec<ForeignKeyDef>,
}

impl TableDiff {
    fn compute(from: &TableSnapshot, to: &TableSnapshot) -> Self {
        let mut added = Vec::new();
        let mut dropped = Vec::new();
        let mut modified = Vec::new();
        let mut unique_drops: Vec<String> = Vec::new();
        let mut unique_adds: Vec<String> = Vec::new();
        let mut fk_drops = Vec::new();
        let mut fk_adds = Vec::new();
        let mut redo_primary = false;

        for (name, old) in from.iter() {
            if to.contains(name) {
                continue;
            }
            dropped.push(AlterClause::DropColumn {
                name: name.to_string(),
            });
            redo_primary |= old.primary;
            if old.foreign_key.is_some() {
                fk_drops.push(name.to_string());
            }
        }

        for (name, new) in to.iter() {
            let Some(old) = from.get(name) else {
                added.push(AlterClause::AddColumn {
                    name: name.to_string(),
                    column: new.clone(),
                });
                redo_primary |= new.primary;
                if new.unique {
                    push_unique(&mut unique_adds, name);
                }
                if let Some(references) = &new.foreign_key {
                    fk_adds.push(ForeignKeyDef {
                        column: name.to_string(),
                        references: references.clone(),
                    });
                }
                continue;
            };

            if definition_changed(old, new) {
                modified.push(AlterClause::ModifyColumn {
                    name: name.to_string(),
                    column: new.clone(),
                });
            }
            redo_primary |= old.primary != new.primary;
            match (old.unique, new.unique) {
                (true, false) => push_unique(&mut unique_drops, name),
                (false, true) => push_unique(&mut unique_adds, name),
                _ => {}
            }
            if old.foreign_key != new.foreign_key {
                if old.foreign_key.is_some() {
                    fk_drops.push(name.to_string());
                }
                if let Some(references) = &new.foreign_key {
                    fk_adds.push(ForeignKeyDef {
                        column: name.to_string(),
                        references: references.clone(),
                    });
                }
            }
        }

        let mut clauses = added;
        clauses.append(&mut dropped);
        clauses.append(&mut modified);
        if redo_primary {
            if !from.primary_key().is_empty() {
                clauses.push(AlterClause::DropPrimaryKey);
            }
            let columns: Vec<String> = to.primary_key().into_iter().map(String::from).collect();
            if !columns.is_empty() {
                clauses.push(AlterClause::AddPrimaryKey { columns });
            }
        }
        clauses.extend(
            unique_drops
                .into_iter()
                .map(|column| AlterClause::DropUniqueIndex { column }),
        );
        clauses.extend(
            unique_adds
                .into_iter()
                .map(|column| AlterClause::AddUniqueIndex { column }),
        );

        Self {
            fk_drops,
            clauses,
            fk_adds,
        }
    }
}

fn push_unique(set: &mut Vec<String>, column: &str) {
    if !set.iter().any(|c| c == column) {
        set.push(column.to_string());
    }
}

/// Whether the column needs `MODIFY COLUMN`.
///
/// Type comparison ignores case and whitespace; defaults are compared with
/// one pair of surrounding quotes removed.
fn definition_changed(old: &ColumnDescriptor, new: &ColumnDescriptor) -> bool {
    let normalize_type = |ty: &str| -> String {
        ty.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_uppercase)
            .collect()
    };
    let normalize_default = |default: Option<&str>| -> Option<String> {
        default.map(|d| {
            let d = d.strip_prefix(['\'', '"']).unwrap_or(d);
            d.strip_suffix(['\'', '"']).unwrap_or(d).to_string()
        })
    };

    normalize_type(&old.sql_type) != normalize_type(&new.sql_type)
        || old.auto_increment != new.auto_increment
        || old.nullable != new.nullable
        || old.unsigned != new.unsigned
        || normalize_default(old.default_sql.as_deref())
            != normalize_default(new.default_sql.as_deref())
}
