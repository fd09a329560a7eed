//! `sqlx`-backed materialized view refresh and diff.

use std::collections::HashMap;

use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use thiserror::Error;

use crate::pure::{diff, Diff};

/// Failures refreshing or diffing a view.
#[derive(Debug, Error)]
pub enum DiffError {
    /// the underlying database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Identifies one diff-tracked view and its `temp_*` twin.
#[derive(Debug, Clone, Copy)]
pub struct ViewSpec {
    /// the materialized view's name
    pub view: &'static str,
    /// the twin ordinary table compared against on the next cycle
    pub temp_view: &'static str,
    /// primary-key column names, in order
    pub key_columns: &'static [&'static str],
}

/// The diff for one refresh cycle, plus the last-known full row for
/// every removed key -- the Deputy needs those rows (e.g. a revoked
/// lease's MAC) to send an administrative DHCP RELEASE after a host
/// drops out of `dhcphost`.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    /// the added/removed/modified key sets
    pub diff: Diff<Value>,
    /// full previous-snapshot row for each key in `diff.removed`, same order
    pub removed_rows: Vec<Value>,
}

/// Refreshes [`ViewSpec`]s and diffs them against their twins.
#[derive(Debug, Clone)]
pub struct ViewDiffer {
    pool: PgPool,
}

impl ViewDiffer {
    /// Wrap a pool shared with `lease-store`/`deputy-core`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Refresh `spec.view`, compute its diff against `spec.temp_view`,
    /// then copy `spec.view` into `spec.temp_view` for the next cycle --
    /// all inside one transaction.
    pub async fn refresh_and_diff(&self, spec: &ViewSpec) -> Result<RefreshResult, DiffError> {
        let mut txn = self.pool.begin().await?;

        sqlx::query(&format!("REFRESH MATERIALIZED VIEW {}", spec.view))
            .execute(&mut *txn)
            .await?;

        let current = fetch_keyed_rows(&mut txn, spec.view, spec.key_columns).await?;
        let previous = fetch_keyed_rows(&mut txn, spec.temp_view, spec.key_columns).await?;

        let result = diff(&current, &previous);
        let removed_rows = result
            .removed
            .iter()
            .filter_map(|key| previous.get(key).cloned())
            .collect();

        sqlx::query(&format!("TRUNCATE TABLE {}", spec.temp_view))
            .execute(&mut *txn)
            .await?;
        sqlx::query(&format!(
            "INSERT INTO {} SELECT * FROM {}",
            spec.temp_view, spec.view
        ))
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(RefreshResult {
            diff: result,
            removed_rows,
        })
    }

    /// Refresh an untracked view (`radcheck`, `radreply`, ...) with no
    /// diff bookkeeping.
    pub async fn refresh_untracked(&self, view: &str) -> Result<(), DiffError> {
        sqlx::query(&format!("REFRESH MATERIALIZED VIEW {view}"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Fetch every row of `table`, keyed by its `key_columns` packed into a
/// JSON object (so keys of any SQL type can share one Rust type), with
/// the whole row as its JSON value for equality comparison.
async fn fetch_keyed_rows(
    txn: &mut Transaction<'_, Postgres>,
    table: &str,
    key_columns: &[&str],
) -> Result<HashMap<Value, Value>, DiffError> {
    let keys = key_columns.join(", ");
    let query = format!(
        "SELECT to_jsonb(k) AS key, to_jsonb(t) AS row \
         FROM {table} AS t, LATERAL (SELECT {keys}) AS k"
    );

    let rows = sqlx::query(&query).fetch_all(&mut **txn).await?;
    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        let key: Value = row.try_get("key")?;
        let value: Value = row.try_get("row")?;
        out.insert(key, value);
    }
    Ok(out)
}
