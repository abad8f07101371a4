//! Data models.

pub mod query;
pub mod schema;

pub use query::{QueryParam, Row};
pub use schema::{
    ColumnConstraint, ColumnInfo, DatabaseInfo, ForeignKeyInfo, IndexInfo, SchemaInfo, TableInfo,
};
