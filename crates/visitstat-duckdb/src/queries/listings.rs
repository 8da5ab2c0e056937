//! Read helpers that drive rollup and purge scheduling, plus read-back of
//! stored aggregates.

use chrono::{NaiveDate, Utc};
use duckdb::types::Value;
use duckdb::Connection;
use visitstat_core::{AggregateRow, Dimension, StoreResult, TenantScope};

use crate::error::DbResultExt;
use crate::sql::{day_window, key_value, parse_day, scope_predicate, PENDING_HITS};
use crate::tx::Tx;
use crate::DuckDbBackend;

pub(crate) fn list_days_in(
    conn: &Connection,
    scope: TenantScope,
    today: NaiveDate,
) -> StoreResult<Vec<NaiveDate>> {
    query_days(conn, scope, today, "")
}

pub(crate) fn list_pending_days_in(
    conn: &Connection,
    scope: TenantScope,
    today: NaiveDate,
) -> StoreResult<Vec<NaiveDate>> {
    query_days(conn, scope, today, &format!(" AND {PENDING_HITS}"))
}

fn query_days(
    conn: &Connection,
    scope: TenantScope,
    today: NaiveDate,
    extra: &str,
) -> StoreResult<Vec<NaiveDate>> {
    let (today_start, _) = day_window(today)?;
    let sql = format!(
        "SELECT DISTINCT CAST(CAST(time AS DATE) AS VARCHAR) AS day FROM hit \
         WHERE {} AND time < CAST(?2 AS TIMESTAMP){extra} ORDER BY day",
        scope_predicate(1)
    );
    let mut stmt = conn.prepare(&sql).db()?;
    let mut rows = stmt
        .query(duckdb::params![scope.tenant_id(), today_start])
        .db()?;

    let mut days = Vec::new();
    while let Some(row) = rows.next().db()? {
        let raw: String = row.get(0).db()?;
        days.push(parse_day(&raw)?);
    }
    Ok(days)
}

pub(crate) fn list_paths_in(
    conn: &Connection,
    scope: TenantScope,
    day: NaiveDate,
) -> StoreResult<Vec<String>> {
    let (start, end) = day_window(day)?;
    let sql = format!(
        "SELECT DISTINCT path FROM hit \
         WHERE {} AND time >= CAST(?2 AS TIMESTAMP) AND time < CAST(?3 AS TIMESTAMP) \
         ORDER BY path",
        scope_predicate(1)
    );
    let mut stmt = conn.prepare(&sql).db()?;
    let rows = stmt
        .query_map(duckdb::params![scope.tenant_id(), start, end], |row| {
            row.get::<_, String>(0)
        })
        .db()?;

    let mut paths = Vec::new();
    for row in rows {
        paths.push(row.db()?);
    }
    Ok(paths)
}

pub(crate) fn count_hits_in(conn: &Connection, scope: TenantScope) -> StoreResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM hit WHERE {}", scope_predicate(1));
    conn.prepare(&sql)
        .db()?
        .query_row(duckdb::params![scope.tenant_id()], |row| row.get(0))
        .db()
}

pub(crate) fn list_aggregates_in(
    conn: &Connection,
    dimension: Dimension,
    scope: TenantScope,
) -> StoreResult<Vec<AggregateRow>> {
    let keys = dimension.key_columns();
    let counters = dimension.counter_columns();

    let mut columns = vec![
        "id".to_string(),
        "tenant_id".to_string(),
        "CAST(day AS VARCHAR)".to_string(),
        "path".to_string(),
    ];
    columns.extend(keys.iter().map(|k| k.name.to_string()));
    columns.extend(counters.iter().map(|c| c.to_string()));
    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY day, path, id",
        columns.join(", "),
        dimension.table(),
        scope_predicate(1)
    );

    let mut stmt = conn.prepare(&sql).db()?;
    let mut rows = stmt.query(duckdb::params![scope.tenant_id()]).db()?;
    let mut result = Vec::new();
    while let Some(row) = rows.next().db()? {
        let raw_day: String = row.get(2).db()?;
        let mut key = Vec::with_capacity(keys.len());
        for i in 0..keys.len() {
            key.push(key_value(row.get::<_, Value>(4 + i).db()?)?);
        }
        let mut values = Vec::with_capacity(counters.len());
        for i in 0..counters.len() {
            values.push(row.get::<_, i64>(4 + keys.len() + i).db()?);
        }
        result.push(AggregateRow {
            dimension,
            id: row.get(0).db()?,
            tenant_id: row.get(1).db()?,
            day: parse_day(&raw_day)?,
            path: row.get(3).db()?,
            key,
            counters: values,
        });
    }
    Ok(result)
}

impl DuckDbBackend {
    /// Distinct days with raw hits in `scope`, ascending. The current UTC day
    /// is still filling up and is left out.
    pub async fn list_days(&self, tx: Option<&mut Tx>, scope: TenantScope) -> StoreResult<Vec<NaiveDate>> {
        let today = Utc::now().date_naive();
        self.read(tx, "list_days", |conn| list_days_in(conn, scope, today))
            .await
    }

    /// Like [`list_days`](DuckDbBackend::list_days), limited to days that
    /// still have hits no rollup has counted.
    pub async fn list_pending_days(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
    ) -> StoreResult<Vec<NaiveDate>> {
        let today = Utc::now().date_naive();
        self.read(tx, "list_pending_days", |conn| {
            list_pending_days_in(conn, scope, today)
        })
        .await
    }

    /// Distinct paths (original casing) with raw hits on `day`.
    pub async fn list_paths(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<Vec<String>> {
        self.read(tx, "list_paths", |conn| list_paths_in(conn, scope, day))
            .await
    }

    pub async fn count_hits(&self, tx: Option<&mut Tx>, scope: TenantScope) -> StoreResult<i64> {
        self.read(tx, "count_hits", |conn| count_hits_in(conn, scope))
            .await
    }

    pub async fn list_aggregates(
        &self,
        tx: Option<&mut Tx>,
        dimension: Dimension,
        scope: TenantScope,
    ) -> StoreResult<Vec<AggregateRow>> {
        self.read(tx, "list_aggregates", |conn| {
            list_aggregates_in(conn, dimension, scope)
        })
        .await
    }
}
