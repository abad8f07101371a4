//! Structural schema snapshot models.
//!
//! A [`DatabaseInfo`] is an immutable snapshot assembled by one crawl. It is
//! never mutated after publication; a refresh builds a new value and swaps
//! the cache reference.

use serde::{Deserialize, Serialize};

/// Kind of constraint attached to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnConstraint {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

impl ColumnConstraint {
    /// Parse from the catalog's constraint-type description.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRIMARY KEY" => Some(Self::PrimaryKey),
            "FOREIGN KEY" => Some(Self::ForeignKey),
            "UNIQUE" => Some(Self::Unique),
            "CHECK" => Some(Self::Check),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Formatted type (e.g. `character varying(30)`, `timestamp with time zone`)
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Non-foreign-key constraints on this column. NOT NULL is expressed by
    /// `nullable`, foreign keys by [`TableInfo::foreign_keys`].
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub constraints: Vec<ColumnConstraint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Access method (btree, hash, gin, gist, ...)
    #[serde(rename = "type")]
    pub index_type: String,
    /// Column names in index order; expression entries carry the defining
    /// expression text.
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: String,
    /// Local columns, ordered by position within the key.
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Approximate, from `pg_class.reltuples`.
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub indexes: Vec<IndexInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tables: Vec<TableInfo>,
}

impl SchemaInfo {
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// One crawl's structural snapshot of a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub schemas: Vec<SchemaInfo>,
}

impl DatabaseInfo {
    pub fn schema(&self, name: &str) -> Option<&SchemaInfo> {
        self.schemas.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DatabaseInfo {
        DatabaseInfo {
            schemas: vec![SchemaInfo {
                name: "public".to_string(),
                description: None,
                tables: vec![TableInfo {
                    name: "users".to_string(),
                    description: Some("accounts".to_string()),
                    row_count: 42,
                    columns: vec![ColumnInfo {
                        name: "id".to_string(),
                        data_type: "bigint".to_string(),
                        nullable: false,
                        default: None,
                        description: None,
                        constraints: vec![ColumnConstraint::PrimaryKey],
                    }],
                    indexes: Vec::new(),
                    foreign_keys: Vec::new(),
                }],
            }],
        }
    }

    #[test]
    fn test_lookups() {
        let info = sample();
        assert!(info.schema("public").is_some());
        assert!(info.schema("missing").is_none());
        let schema = info.schema("public").unwrap();
        assert!(schema.table("users").is_some());
        assert!(schema.table("orders").is_none());
    }

    #[test]
    fn test_constraint_parse() {
        assert_eq!(
            ColumnConstraint::parse("PRIMARY KEY"),
            Some(ColumnConstraint::PrimaryKey)
        );
        assert_eq!(
            ColumnConstraint::parse("CHECK"),
            Some(ColumnConstraint::Check)
        );
        assert_eq!(ColumnConstraint::parse("OTHER"), None);
    }

    #[test]
    fn test_optional_fields_skipped_in_json() {
        let info = sample();
        let json = serde_json::to_string(&info).unwrap();
        // No empty arrays or null descriptions serialized.
        assert!(!json.contains("indexes"));
        assert!(!json.contains("foreign_keys"));
        assert!(json.contains("\"row_count\":42"));
        assert!(json.contains("\"type\":\"bigint\""));
    }
}
