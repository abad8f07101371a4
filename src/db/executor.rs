//! Transactional statement execution.
//!
//! Every call runs one statement inside its own transaction on one pooled
//! connection, with the access mode set server-side (`SET TRANSACTION READ
//! ONLY` / `READ WRITE`) rather than by inspecting the SQL text. A call
//! either commits and returns complete results, or rolls back so no partial
//! effect is visible to subsequent calls. Rollback is best effort: its
//! failure is logged but never replaces the original error. Nothing here is
//! retried.

use std::time::Duration;

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Acquire, Executor, PgPool, Postgres, Transaction};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::db::types::row_to_map;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Row};

/// Execute a query and materialize all result rows in driver column order.
pub(crate) async fn execute_query_on(
    pool: &PgPool,
    read_only: bool,
    sql: &str,
    params: &[QueryParam],
    deadline: Duration,
) -> DbResult<Vec<Row>> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| DbError::acquire(e.to_string()))?;
    let mut tx = begin(&mut conn, read_only, sql).await?;

    let rows = match timeout(deadline, fetch_rows(&mut tx, sql, params)).await {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            rollback_best_effort(tx).await;
            return Err(map_statement_err(e));
        }
        Err(_) => {
            rollback_best_effort(tx).await;
            return Err(DbError::timeout("query execution", deadline.as_secs()));
        }
    };

    let results: Vec<Row> = rows.iter().map(row_to_map).collect();

    tx.commit()
        .await
        .map_err(|e| DbError::commit(e.to_string()))?;
    Ok(results)
}

/// Execute a statement without materializing rows; returns the affected-row
/// count.
pub(crate) async fn execute_non_query_on(
    pool: &PgPool,
    read_only: bool,
    sql: &str,
    params: &[QueryParam],
    deadline: Duration,
) -> DbResult<u64> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| DbError::acquire(e.to_string()))?;
    let mut tx = begin(&mut conn, read_only, sql).await?;

    let rows_affected = match timeout(deadline, execute(&mut tx, sql, params)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            rollback_best_effort(tx).await;
            return Err(map_statement_err(e));
        }
        Err(_) => {
            rollback_best_effort(tx).await;
            return Err(DbError::timeout("statement execution", deadline.as_secs()));
        }
    };

    debug!(rows_affected, "statement executed");
    tx.commit()
        .await
        .map_err(|e| DbError::commit(e.to_string()))?;
    Ok(rows_affected)
}

/// Open a transaction and set its access mode server-side.
async fn begin<'c>(
    conn: &'c mut sqlx::pool::PoolConnection<Postgres>,
    read_only: bool,
    sql: &str,
) -> DbResult<Transaction<'c, Postgres>> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| DbError::tx_begin(e.to_string()))?;

    let mode = if read_only {
        debug!(sql = %sql, "executing in read-only transaction");
        "SET TRANSACTION READ ONLY"
    } else {
        // Writes go through here; callers are responsible for what they send.
        warn!(sql = %sql, "executing in read-write transaction");
        "SET TRANSACTION READ WRITE"
    };

    if let Err(e) = (&mut *tx).execute(mode).await {
        rollback_best_effort(tx).await;
        return Err(DbError::tx_begin(e.to_string()));
    }
    Ok(tx)
}

async fn fetch_rows<'q>(
    tx: &mut Transaction<'_, Postgres>,
    sql: &'q str,
    params: &'q [QueryParam],
) -> Result<Vec<PgRow>, sqlx::Error> {
    // Without parameters, run over the simple protocol: some statements do
    // not survive preparation.
    if params.is_empty() {
        (&mut **tx).fetch_all(sql).await
    } else {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        query.fetch_all(&mut **tx).await
    }
}

async fn execute<'q>(
    tx: &mut Transaction<'_, Postgres>,
    sql: &'q str,
    params: &'q [QueryParam],
) -> Result<u64, sqlx::Error> {
    let result = if params.is_empty() {
        (&mut **tx).execute(sql).await?
    } else {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        query.execute(&mut **tx).await?
    };
    Ok(result.rows_affected())
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}

fn map_statement_err(e: sqlx::Error) -> DbError {
    match &e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            DbError::decode(e.to_string())
        }
        _ => DbError::statement(e),
    }
}

async fn rollback_best_effort(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "rollback after failed statement also failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_map_to_decode_variant() {
        let err = map_statement_err(sqlx::Error::Decode("bad value".into()));
        assert!(matches!(err, DbError::Decode { .. }));
    }

    #[test]
    fn test_other_errors_map_to_statement_variant() {
        let err = map_statement_err(sqlx::Error::PoolClosed);
        assert!(matches!(err, DbError::Statement { .. }));
    }
}
