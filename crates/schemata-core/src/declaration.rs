//! Declaration documents: a static registration table for entities.
//!
//! A [`Declarations`] document lists entities with high-level property
//! types (`string`, `number`, `datetime`, ...) and implements
//! [`MetadataProvider`] by resolving those types to MySQL column types.
//!
//! ```rust
//! use schemata_core::Declarations;
//!
//! let declarations = Declarations::from_json(r#"{
//!     "entities": [{
//!         "name": "Customer",
//!         "table": "customers",
//!         "properties": [
//!             { "name": "id", "type": "number", "length": "10", "primary": true,
//!               "unsigned": true, "autoIncrement": true },
//!             { "name": "email", "type": "string", "unique": true, "required": true }
//!         ]
//!     }]
//! }"#).unwrap();
//!
//! let schema = declarations.capture().unwrap();
//! assert_eq!(schema.get("customers").unwrap().get("id").unwrap().sql_type, "INT(10)");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::metadata::{self, MetadataProvider};
use crate::snapshot::{ColumnDescriptor, FkAction, ForeignKeyRef, SchemaSnapshot};

/// Strings longer than this become `LONGTEXT`.
pub const VARCHAR_MAX_LENGTH: u32 = 65_500;

/// Maximum `DECIMAL` precision.
pub const DECIMAL_MAX_PRECISION: u32 = 65;

/// Maximum `DECIMAL` scale.
pub const DECIMAL_MAX_SCALE: u32 = 30;

/// Maximum `INT` display width.
pub const INT_MAX_WIDTH: u32 = 255;

const DEFAULT_STRING_LENGTH: u32 = 255;
const DEFAULT_INT_WIDTH: u32 = 11;

/// High-level property types accepted in declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// `VARCHAR(n)`, or `LONGTEXT` past [`VARCHAR_MAX_LENGTH`].
    String,
    /// Always `LONGTEXT`.
    BigString,
    /// `VARCHAR(36)`.
    Guid,
    /// `INT(n)` or, with a `"p.s"` length, `DECIMAL(p, s)`.
    Number,
    /// `BIGINT`.
    BigNumber,
    /// `TINYINT(1)`.
    Boolean,
    /// `DATE`.
    Date,
    /// `TIME`.
    Time,
    /// `DATETIME`.
    DateTime,
}

impl PropertyType {
    /// Parses a declared type name (case-insensitive).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "bigstring" => Self::BigString,
            "guid" => Self::Guid,
            "number" => Self::Number,
            "bignumber" => Self::BigNumber,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::DateTime,
            _ => return None,
        };
        Some(ty)
    }

    /// Returns whether `UNSIGNED` applies to this type.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::BigNumber)
    }

    /// Resolves the MySQL column type, validating the optional length.
    ///
    /// The error is the human-readable rejection reason.
    pub fn sql_type(self, length: Option<&str>) -> std::result::Result<String, String> {
        match self {
            Self::String => {
                let len = parse_length(length, DEFAULT_STRING_LENGTH)?;
                if len > VARCHAR_MAX_LENGTH {
                    Ok("LONGTEXT".to_string())
                } else {
                    Ok(format!("VARCHAR({len})"))
                }
            }
            Self::BigString => Ok("LONGTEXT".to_string()),
            Self::Guid => Ok("VARCHAR(36)".to_string()),
            Self::Number => match length.map(str::trim) {
                Some(spec) if spec.contains('.') => {
                    let (precision, scale) = spec.split_once('.').unwrap_or((spec, ""));
                    let precision = parse_length(Some(precision), 0)?;
                    if precision > DECIMAL_MAX_PRECISION {
                        return Err(format!(
                            "precision cannot exceed {DECIMAL_MAX_PRECISION}"
                        ));
                    }
                    let scale = parse_length(Some(scale), 0)?;
                    if scale > DECIMAL_MAX_SCALE {
                        return Err(format!("scale cannot exceed {DECIMAL_MAX_SCALE}"));
                    }
                    if scale > precision {
                        return Err("scale cannot exceed precision".to_string());
                    }
                    Ok(format!("DECIMAL({precision}, {scale})"))
                }
                other => {
                    let width = parse_length(other, DEFAULT_INT_WIDTH)?;
                    if width > INT_MAX_WIDTH {
                        return Err(format!("width cannot exceed {INT_MAX_WIDTH}"));
                    }
                    Ok(format!("INT({width})"))
                }
            },
            Self::BigNumber => Ok("BIGINT".to_string()),
            Self::Boolean => Ok("TINYINT(1)".to_string()),
            Self::Date => Ok("DATE".to_string()),
            Self::Time => Ok("TIME".to_string()),
            Self::DateTime => Ok("DATETIME".to_string()),
        }
    }
}

fn parse_length(length: Option<&str>, default: u32) -> std::result::Result<u32, String> {
    let Some(raw) = length else {
        return Ok(default);
    };
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| "not a whole number".to_string())?;
    if value == 0 {
        return Err("must be at least 1".to_string());
    }
    Ok(value)
}

/// Foreign key as written in a declaration: by entity and property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDeclaration {
    /// Referenced entity name.
    pub entity: String,
    /// Referenced property name on that entity.
    pub property: String,
    /// `ON DELETE` action.
    #[serde(default)]
    pub on_delete: FkAction,
    /// `ON UPDATE` action.
    #[serde(default)]
    pub on_update: FkAction,
}

/// One declared property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDeclaration {
    /// Property name on the domain type.
    pub name: String,
    /// Column name, defaults to the property name.
    #[serde(default)]
    pub column: Option<String>,
    /// High-level type name, defaults to `string`.
    #[serde(rename = "type", default = "default_type")]
    pub type_name: String,
    /// Length / precision specification.
    #[serde(default)]
    pub length: Option<String>,
    /// Part of the primary key.
    #[serde(default)]
    pub primary: bool,
    /// NOT NULL.
    #[serde(default)]
    pub required: bool,
    /// Unique index.
    #[serde(default)]
    pub unique: bool,
    /// `UNSIGNED` (numeric types only).
    #[serde(default)]
    pub unsigned: bool,
    /// `AUTO_INCREMENT`.
    #[serde(default)]
    pub auto_increment: bool,
    /// Raw default SQL.
    #[serde(default)]
    pub default_sql: Option<String>,
    /// Foreign key to another entity.
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyDeclaration>,
}

fn default_type() -> String {
    "string".to_string()
}

impl PropertyDeclaration {
    /// The database column name.
    #[must_use]
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// One declared entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDeclaration {
    /// Type name.
    pub name: String,
    /// Table name; absent for abstract declarations.
    #[serde(default)]
    pub table: Option<String>,
    /// Properties in declaration order.
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
}

/// A set of entity declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declarations {
    /// Declared entities.
    pub entities: Vec<EntityDeclaration>,
}

impl Declarations {
    /// Parses a declaration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Captures the schema described by these declarations.
    pub fn capture(&self) -> Result<SchemaSnapshot> {
        metadata::capture(self, &self.entities)
    }

    fn entity(&self, name: &str) -> Option<&EntityDeclaration> {
        self.entities.iter().find(|e| e.name == name)
    }

    fn resolve_foreign_key(
        &self,
        owner: &EntityDeclaration,
        property: &PropertyDeclaration,
        fk: &ForeignKeyDeclaration,
    ) -> Result<ForeignKeyRef> {
        let target = self.entity(&fk.entity).ok_or_else(|| {
            SchemaError::SchemaIntegrity(format!(
                "'{}.{}' references unknown entity '{}'",
                owner.name, property.name, fk.entity
            ))
        })?;
        let table = target.table.clone().ok_or_else(|| {
            SchemaError::SchemaIntegrity(format!(
                "'{}.{}' references '{}', which has no table",
                owner.name, property.name, fk.entity
            ))
        })?;
        let column = target
            .properties
            .iter()
            .find(|p| p.name == fk.property)
            .map(|p| p.column_name().to_string())
            .ok_or_else(|| {
                SchemaError::SchemaIntegrity(format!(
                    "'{}.{}' references unknown property '{}.{}'",
                    owner.name, property.name, fk.entity, fk.property
                ))
            })?;

        Ok(ForeignKeyRef {
            table,
            column,
            on_delete: fk.on_delete,
            on_update: fk.on_update,
        })
    }

    fn resolve_property(
        &self,
        entity: &EntityDeclaration,
        property: &PropertyDeclaration,
    ) -> Result<ColumnDescriptor> {
        let ty = PropertyType::parse(&property.type_name).ok_or_else(|| {
            SchemaError::UnknownType {
                entity: entity.name.clone(),
                property: property.name.clone(),
                type_name: property.type_name.clone(),
            }
        })?;

        let sql_type = ty
            .sql_type(property.length.as_deref())
            .map_err(|reason| SchemaError::InvalidLength {
                entity: entity.name.clone(),
                property: property.name.clone(),
                length: property.length.clone().unwrap_or_default(),
                reason,
            })?;

        if property.unsigned && !ty.is_numeric() {
            return Err(SchemaError::UnsignedNotNumeric {
                entity: entity.name.clone(),
                property: property.name.clone(),
                sql_type,
            });
        }

        let foreign_key = property
            .foreign_key
            .as_ref()
            .map(|fk| self.resolve_foreign_key(entity, property, fk))
            .transpose()?;

        Ok(ColumnDescriptor {
            sql_type,
            primary: property.primary,
            nullable: !(property.required || property.primary),
            unique: property.unique,
            unsigned: property.unsigned,
            auto_increment: property.auto_increment,
            default_sql: property.default_sql.clone(),
            foreign_key,
        })
    }
}

impl MetadataProvider for Declarations {
    type Entity = EntityDeclaration;

    fn entity_name(&self, entity: &EntityDeclaration) -> String {
        entity.name.clone()
    }

    fn table_name(&self, entity: &EntityDeclaration) -> Option<String> {
        entity.table.clone()
    }

    fn columns(&self, entity: &EntityDeclaration) -> Result<Vec<(String, ColumnDescriptor)>> {
        entity
            .properties
            .iter()
            .map(|p| Ok((p.column_name().to_string(), self.resolve_property(entity, p)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_lengths() {
        assert_eq!(PropertyType::String.sql_type(None).unwrap(), "VARCHAR(255)");
        assert_eq!(
            PropertyType::String.sql_type(Some("65500")).unwrap(),
            "VARCHAR(65500)"
        );
        assert_eq!(
            PropertyType::String.sql_type(Some("65501")).unwrap(),
            "LONGTEXT"
        );
        assert!(PropertyType::String.sql_type(Some("0")).is_err());
        assert!(PropertyType::String.sql_type(Some("abc")).is_err());
    }

    #[test]
    fn test_number_types() {
        assert_eq!(PropertyType::Number.sql_type(None).unwrap(), "INT(11)");
        assert_eq!(PropertyType::Number.sql_type(Some("10")).unwrap(), "INT(10)");
        assert_eq!(
            PropertyType::Number.sql_type(Some("10.2")).unwrap(),
            "DECIMAL(10, 2)"
        );
        assert!(PropertyType::Number.sql_type(Some("66.2")).is_err());
        assert!(PropertyType::Number.sql_type(Some("10.31")).is_err());
        assert!(PropertyType::Number.sql_type(Some("10.0")).is_err());
        assert_eq!(
            PropertyType::Number.sql_type(Some("5.5")).unwrap(),
            "DECIMAL(5, 5)"
        );
        assert_eq!(
            PropertyType::Number.sql_type(Some("5.10")).unwrap_err(),
            "scale cannot exceed precision"
        );
        assert!(PropertyType::Number.sql_type(Some("256")).is_err());
    }

    #[test]
    fn test_fixed_types() {
        assert_eq!(PropertyType::Guid.sql_type(None).unwrap(), "VARCHAR(36)");
        assert_eq!(PropertyType::BigString.sql_type(None).unwrap(), "LONGTEXT");
        assert_eq!(PropertyType::BigNumber.sql_type(None).unwrap(), "BIGINT");
        assert_eq!(PropertyType::Boolean.sql_type(None).unwrap(), "TINYINT(1)");
        assert_eq!(PropertyType::DateTime.sql_type(None).unwrap(), "DATETIME");
        assert_eq!(PropertyType::parse("DateTime"), Some(PropertyType::DateTime));
        assert_eq!(PropertyType::parse("money"), None);
    }
}
