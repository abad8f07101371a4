//! Schema crawler and in-memory snapshot cache.
//!
//! `SchemaManager` walks the PostgreSQL system catalogs through the shared
//! `DbService` (read-only transactions throughout) and publishes the result
//! as an immutable `Arc<DatabaseInfo>` snapshot. The crawl runs entirely
//! outside the cache lock; readers keep serving the previous snapshot until
//! the new one is swapped in, so a reader observes either the old tree or
//! the new one, never a half-built mix.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::CatalogFilter;
use crate::db::DbService;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnConstraint, ColumnInfo, DatabaseInfo, ForeignKeyInfo, IndexInfo, QueryParam, Row,
    SchemaInfo, TableInfo,
};

/// Crawls catalogs for one registered connection and caches the result.
///
/// One manager serves one identity at a time; `load_schema` replaces the
/// cached snapshot wholesale. Getters never block on a crawl in progress.
pub struct SchemaManager {
    service: Arc<DbService>,
    filter: CatalogFilter,
    cache: RwLock<Option<Arc<DatabaseInfo>>>,
}

impl SchemaManager {
    pub fn new(service: Arc<DbService>, filter: CatalogFilter) -> Self {
        Self {
            service,
            filter,
            cache: RwLock::new(None),
        }
    }

    /// Crawl the database behind `identity` and publish a fresh snapshot.
    ///
    /// A failure to enumerate schemas or tables aborts the whole crawl and
    /// leaves the previous snapshot untouched. A failure on any per-table
    /// detail fetch (columns, constraints, indexes, foreign keys) drops that
    /// one table from the snapshot with a warning; a table is either fully
    /// described or absent.
    pub async fn load_schema(&self, identity: &str) -> DbResult<()> {
        let started = Instant::now();
        info!(identity, "starting schema crawl");

        let schema_rows = self
            .service
            .execute_query(identity, true, queries::SCHEMAS, &[])
            .await
            .map_err(|e| DbError::crawl(format!("schema enumeration failed: {e}")))?;

        let mut schemas = Vec::new();
        let mut tables_total = 0usize;
        let mut tables_skipped = 0usize;

        for schema_row in &schema_rows {
            let Some(schema_name) = str_field(schema_row, "schema_name") else {
                continue;
            };
            if !self.filter.allows_schema(&schema_name) {
                debug!(schema = %schema_name, "schema excluded by filter");
                continue;
            }

            let table_rows = self
                .service
                .execute_query(identity, true, queries::TABLES, &[schema_name.as_str().into()])
                .await
                .map_err(|e| {
                    DbError::crawl(format!("table enumeration failed for {schema_name}: {e}"))
                })?;

            let mut tables = Vec::new();
            for table_row in &table_rows {
                let Some(table_name) = str_field(table_row, "table_name") else {
                    continue;
                };
                if !self.filter.allows_table(&table_name) {
                    debug!(schema = %schema_name, table = %table_name, "table excluded by filter");
                    continue;
                }
                tables_total += 1;

                match self.fetch_table(identity, &schema_name, &table_name, table_row).await {
                    Ok(table) => tables.push(table),
                    Err(e) => {
                        tables_skipped += 1;
                        warn!(
                            schema = %schema_name,
                            table = %table_name,
                            error = %e,
                            "table detail fetch failed, dropping table from snapshot"
                        );
                    }
                }
            }

            schemas.push(SchemaInfo {
                name: schema_name,
                description: opt_str_field(schema_row, "description"),
                tables,
            });
        }

        let snapshot = Arc::new(DatabaseInfo { schemas });
        {
            let mut cache = self.cache.write().await;
            *cache = Some(Arc::clone(&snapshot));
        }

        info!(
            identity,
            schemas = snapshot.schemas.len(),
            tables = tables_total - tables_skipped,
            skipped = tables_skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "schema crawl complete"
        );
        Ok(())
    }

    /// Current snapshot, or `None` before the first successful crawl (or
    /// when the crawl found nothing).
    pub async fn get_database_info(&self) -> Option<Arc<DatabaseInfo>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|db| !db.schemas.is_empty())
            .map(Arc::clone)
    }

    pub async fn get_schema_info(&self, schema_name: &str) -> Option<SchemaInfo> {
        let db = self.get_database_info().await?;
        db.schema(schema_name).cloned()
    }

    pub async fn get_table_info(&self, schema_name: &str, table_name: &str) -> Option<TableInfo> {
        let schema = self.get_schema_info(schema_name).await?;
        schema.table(table_name).cloned()
    }

    /// Drop the cached snapshot without crawling.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }

    async fn fetch_table(
        &self,
        identity: &str,
        schema_name: &str,
        table_name: &str,
        table_row: &Row,
    ) -> DbResult<TableInfo> {
        let params: [QueryParam; 2] = [schema_name.into(), table_name.into()];

        let column_rows = self
            .service
            .execute_query(identity, true, queries::COLUMNS, &params)
            .await?;
        let constraint_rows = self
            .service
            .execute_query(identity, true, queries::CONSTRAINTS, &params)
            .await?;
        let index_rows = self
            .service
            .execute_query(identity, true, queries::INDEXES, &params)
            .await?;
        let fk_rows = self
            .service
            .execute_query(identity, true, queries::FOREIGN_KEYS, &params)
            .await?;

        Ok(TableInfo {
            name: table_name.to_string(),
            description: opt_str_field(table_row, "description"),
            row_count: i64_field(table_row, "row_count"),
            columns: build_columns(&column_rows, &constraint_rows),
            indexes: index_rows.iter().map(build_index).collect(),
            foreign_keys: fk_rows.iter().map(build_foreign_key).collect(),
        })
    }
}

fn build_columns(column_rows: &[Row], constraint_rows: &[Row]) -> Vec<ColumnInfo> {
    column_rows
        .iter()
        .filter_map(|row| {
            let name = str_field(row, "column_name")?;
            let constraints = constraints_for_column(&name, constraint_rows);
            Some(ColumnInfo {
                name,
                data_type: str_field(row, "formatted_type").unwrap_or_default(),
                nullable: str_field(row, "is_nullable").as_deref() == Some("YES"),
                default: opt_str_field(row, "column_default"),
                description: opt_str_field(row, "description"),
                constraints,
            })
        })
        .collect()
}

/// Column-level constraints attached from the table's constraint rows.
/// Foreign keys are reported separately on the table, not per column.
fn constraints_for_column(column: &str, constraint_rows: &[Row]) -> Vec<ColumnConstraint> {
    constraint_rows
        .iter()
        .filter(|row| string_list(row, "column_names").iter().any(|c| c == column))
        .filter_map(|row| {
            let desc = str_field(row, "constraint_type_desc")?;
            let constraint = ColumnConstraint::parse(&desc)?;
            (constraint != ColumnConstraint::ForeignKey).then_some(constraint)
        })
        .collect()
}

fn build_index(row: &Row) -> IndexInfo {
    IndexInfo {
        name: str_field(row, "index_name").unwrap_or_default(),
        index_type: str_field(row, "index_type").unwrap_or_default(),
        columns: string_list(row, "column_names"),
        is_unique: bool_field(row, "is_unique"),
        is_primary: bool_field(row, "is_primary"),
        definition: opt_str_field(row, "index_definition"),
        description: opt_str_field(row, "description"),
    }
}

fn build_foreign_key(row: &Row) -> ForeignKeyInfo {
    ForeignKeyInfo {
        name: str_field(row, "constraint_name").unwrap_or_default(),
        columns: string_list(row, "column_names"),
        referenced_schema: str_field(row, "referenced_schema").unwrap_or_default(),
        referenced_table: str_field(row, "referenced_table").unwrap_or_default(),
        referenced_columns: string_list(row, "referenced_columns"),
        description: opt_str_field(row, "description"),
    }
}

fn str_field(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Like `str_field` but treats NULL and empty string as absent.
fn opt_str_field(row: &Row, key: &str) -> Option<String> {
    str_field(row, key).filter(|s| !s.is_empty())
}

fn i64_field(row: &Row, key: &str) -> i64 {
    row.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn bool_field(row: &Row, key: &str) -> bool {
    row.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn string_list(row: &Row, key: &str) -> Vec<String> {
    row.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// Catalog queries. Identifier columns (`name`, `sqlidentifier`) and
// aggregated identifier arrays are cast to text so they decode uniformly.
mod queries {
    pub const SCHEMAS: &str = r#"
        SELECT
            schema_name::text AS schema_name,
            obj_description(pg_namespace.oid, 'pg_namespace')::text AS description
        FROM information_schema.schemata
        JOIN pg_namespace ON pg_namespace.nspname = schema_name
        WHERE
            schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
            AND schema_name NOT LIKE 'pg\_%' ESCAPE '\'
        ORDER BY schema_name
    "#;

    pub const TABLES: &str = r#"
        SELECT
            t.table_name::text AS table_name,
            obj_description(c.oid, 'pg_class')::text AS description,
            c.reltuples::bigint AS row_count
        FROM information_schema.tables t
        JOIN pg_namespace n ON t.table_schema = n.nspname
        JOIN pg_class c ON t.table_name = c.relname AND n.oid = c.relnamespace
        WHERE
            t.table_schema = $1
            AND t.table_type = 'BASE TABLE'
            AND c.relkind = 'r'
        ORDER BY t.table_name
    "#;

    pub const COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod)::text AS formatted_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            col_description(cls.oid, c.ordinal_position)::text AS description
        FROM information_schema.columns c
        JOIN pg_namespace ns ON c.table_schema = ns.nspname
        JOIN pg_class cls ON c.table_name = cls.relname AND ns.oid = cls.relnamespace
        JOIN pg_attribute a ON a.attrelid = cls.oid AND a.attname = c.column_name
        WHERE
            c.table_schema = $1
            AND c.table_name = $2
            AND cls.relkind = 'r'
            AND a.attnum > 0
            AND NOT a.attisdropped
        ORDER BY c.ordinal_position
    "#;

    pub const CONSTRAINTS: &str = r#"
        SELECT
            c.conname::text AS constraint_name,
            CASE
                WHEN c.contype = 'p' THEN 'PRIMARY KEY'
                WHEN c.contype = 'u' THEN 'UNIQUE'
                WHEN c.contype = 'f' THEN 'FOREIGN KEY'
                WHEN c.contype = 'c' THEN 'CHECK'
                ELSE 'OTHER'
            END AS constraint_type_desc,
            array_agg(col.attname::text ORDER BY u.attposition)
                FILTER (WHERE col.attname IS NOT NULL) AS column_names
        FROM pg_constraint c
        JOIN pg_namespace n ON n.oid = c.connamespace
        JOIN pg_class t ON t.oid = c.conrelid
        LEFT JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS u(attnum, attposition) ON TRUE
        LEFT JOIN pg_attribute col ON col.attrelid = t.oid AND col.attnum = u.attnum
        WHERE
            n.nspname = $1
            AND t.relname = $2
        GROUP BY c.conname, c.contype
        ORDER BY c.contype, c.conname
    "#;

    pub const INDEXES: &str = r#"
        SELECT
            i.relname::text AS index_name,
            am.amname::text AS index_type,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary,
            obj_description(i.oid, 'pg_class')::text AS description,
            pg_get_indexdef(i.oid)::text AS index_definition,
            array_agg(
                CASE
                    WHEN ix.indkey[k.attpos] > 0 THEN a.attname::text
                    ELSE pg_get_indexdef(i.oid, k.i::int, false)
                END
                ORDER BY k.i
            ) AS column_names
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_am am ON i.relam = am.oid
        LEFT JOIN generate_subscripts(ix.indkey, 1) WITH ORDINALITY AS k(attpos, i) ON TRUE
        LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ix.indkey[k.attpos]
        WHERE
            n.nspname = $1
            AND t.relname = $2
            AND ix.indislive
        GROUP BY i.relname, i.oid, am.amname, ix.indisunique, ix.indisprimary
        ORDER BY i.relname
    "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            c.conname::text AS constraint_name,
            array_agg(col.attname::text ORDER BY u.attposition) AS column_names,
            nr.nspname::text AS referenced_schema,
            ref_table.relname::text AS referenced_table,
            array_agg(ref_col.attname::text ORDER BY u2.attposition) AS referenced_columns,
            obj_description(c.oid, 'pg_constraint')::text AS description
        FROM pg_constraint c
        JOIN pg_namespace n ON n.oid = c.connamespace
        JOIN pg_class t ON t.oid = c.conrelid
        JOIN pg_class ref_table ON ref_table.oid = c.confrelid
        JOIN pg_namespace nr ON nr.oid = ref_table.relnamespace
        LEFT JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS u(attnum, attposition) ON TRUE
        LEFT JOIN pg_attribute col ON col.attrelid = t.oid AND col.attnum = u.attnum
        LEFT JOIN LATERAL unnest(c.confkey) WITH ORDINALITY AS u2(attnum, attposition) ON TRUE
        LEFT JOIN pg_attribute ref_col ON ref_col.attrelid = c.confrelid AND ref_col.attnum = u2.attnum
        WHERE
            n.nspname = $1
            AND t.relname = $2
            AND c.contype = 'f'
        GROUP BY c.conname, nr.nspname, ref_table.relname, c.oid
        ORDER BY c.conname
    "#;
}
