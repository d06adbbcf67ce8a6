//! Metadata collaborator interface and snapshot capture.
//!
//! How a domain type describes its table is not this crate's business.
//! Anything that can answer "which table?" and "which columns?" for a set
//! of declared entities implements [`MetadataProvider`]; [`capture`] turns
//! those answers into a [`SchemaSnapshot`].

use std::collections::HashMap;

use crate::error::{Result, SchemaError};
use crate::snapshot::{ColumnDescriptor, SchemaSnapshot, TableSnapshot};

/// Source of table and column metadata for declared entities.
pub trait MetadataProvider {
    /// The declared entity type (a type descriptor, a registration record...).
    type Entity;

    /// Human-readable entity name used in error messages.
    fn entity_name(&self, entity: &Self::Entity) -> String;

    /// The table the entity maps to, or `None` for abstract declarations.
    fn table_name(&self, entity: &Self::Entity) -> Option<String>;

    /// The entity's columns in declaration order.
    ///
    /// Fails when a column cannot be resolved (unknown type, bad length).
    fn columns(&self, entity: &Self::Entity) -> Result<Vec<(String, ColumnDescriptor)>>;
}

/// Builds a snapshot of every entity that maps to a table.
///
/// Entities without a table name are skipped. Two entities claiming the
/// same table, or one table declaring a column twice, is an error; so is
/// any column the provider fails to resolve. Nothing partial is returned.
pub fn capture<P: MetadataProvider>(provider: &P, entities: &[P::Entity]) -> Result<SchemaSnapshot> {
    let mut schema = SchemaSnapshot::new();
    let mut owners: HashMap<String, String> = HashMap::new();

    for entity in entities {
        let Some(table_name) = provider.table_name(entity) else {
            continue;
        };

        let entity_name = provider.entity_name(entity);
        if let Some(first) = owners.get(&table_name) {
            return Err(SchemaError::DuplicateTable {
                table: table_name,
                first: first.clone(),
                second: entity_name,
            });
        }

        let mut table = TableSnapshot::new();
        for (column_name, column) in provider.columns(entity)? {
            if table.contains(&column_name) {
                return Err(SchemaError::DuplicateColumn {
                    table: table_name,
                    column: column_name,
                });
            }
            table.insert(column_name, column);
        }

        owners.insert(table_name.clone(), entity_name);
        schema.insert(table_name, table);
    }

    Ok(schema)
}
