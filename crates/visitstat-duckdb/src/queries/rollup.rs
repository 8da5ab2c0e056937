//! Distinct-visitor counts over raw hits, shaped as merge updates, and the
//! marks recording which hits a rollup has already counted.

use chrono::NaiveDate;
use duckdb::types::Value;
use duckdb::Connection;
use tracing::debug;
use visitstat_core::{
    Aggregate, BrowserStats, Dimension, KeyValue, LanguageStats, OsStats, ReferrerStats,
    StoreError, StoreResult, TenantScope, VisitorStats, VisitorTimeStats,
};

use crate::error::DbResultExt;
use crate::sql::{day_param, day_window, key_value, scope_predicate, PENDING_HITS};
use crate::tx::Tx;
use crate::DuckDbBackend;

/// Hit-table expressions producing each dimension's key columns.
fn key_expressions(dimension: Dimension) -> &'static [&'static str] {
    match dimension {
        Dimension::Page => &[],
        Dimension::Hour => &["CAST(hour(time) AS BIGINT)"],
        Dimension::Language => &["language"],
        Dimension::Referrer => &["\"ref\""],
        Dimension::Os => &["os", "os_version"],
        Dimension::Browser => &["browser", "browser_version"],
    }
}

/// Aggregates producing each dimension's counters. The platform split counts
/// `desktop AND NOT mobile` as desktop, `mobile AND NOT desktop` as mobile and
/// neither flag as unknown.
fn counter_expressions(dimension: Dimension) -> &'static [&'static str] {
    match dimension {
        Dimension::Page => &[
            "count(DISTINCT fingerprint)",
            "count(DISTINCT fingerprint) FILTER (WHERE desktop AND NOT mobile)",
            "count(DISTINCT fingerprint) FILTER (WHERE mobile AND NOT desktop)",
            "count(DISTINCT fingerprint) FILTER (WHERE NOT desktop AND NOT mobile)",
        ],
        _ => &["count(DISTINCT fingerprint)"],
    }
}

/// Per-tenant grouped counts of one dimension for one raw path and day,
/// over hits no rollup has counted yet.
///
/// Parameters: `?1` tenant, `?2`/`?3` day window, `?4` path.
pub(crate) fn collect_sql(dimension: Dimension) -> String {
    let mut select = vec!["tenant_id"];
    select.extend_from_slice(key_expressions(dimension));
    select.extend_from_slice(counter_expressions(dimension));
    format!(
        "SELECT {} FROM hit \
         WHERE {} AND time >= CAST(?2 AS TIMESTAMP) AND time < CAST(?3 AS TIMESTAMP) \
         AND {PENDING_HITS} AND path = ?4 \
         GROUP BY ALL ORDER BY ALL",
        select.join(", "),
        scope_predicate(1)
    )
}

/// One mark per tenant with pending hits on the day, covering every hit id
/// up to the highest one present now.
///
/// Parameters: `?1` tenant, `?2` day, `?3`/`?4` day window.
pub(crate) fn mark_sql() -> String {
    format!(
        "INSERT INTO rollup_mark (tenant_id, day, last_hit_id) \
         SELECT tenant_id, CAST(?2 AS DATE), max(id) FROM hit \
         WHERE {} AND time >= CAST(?3 AS TIMESTAMP) AND time < CAST(?4 AS TIMESTAMP) \
         AND {PENDING_HITS} \
         GROUP BY tenant_id",
        scope_predicate(1)
    )
}

pub(crate) fn mark_rolled_up_in(
    conn: &Connection,
    scope: TenantScope,
    day: NaiveDate,
) -> StoreResult<usize> {
    let (start, end) = day_window(day)?;
    conn.execute(
        &mark_sql(),
        duckdb::params![scope.tenant_id(), day_param(day), start, end],
    )
    .db()
}

fn text(value: &KeyValue) -> StoreResult<String> {
    match value {
        KeyValue::Text(s) => Ok(s.clone()),
        KeyValue::Integer(v) => Err(StoreError::InvalidRow(format!(
            "expected a text key, got {v}"
        ))),
    }
}

fn hour(value: &KeyValue) -> StoreResult<u8> {
    match value {
        KeyValue::Integer(v) => u8::try_from(*v)
            .ok()
            .filter(|h| *h < 24)
            .ok_or_else(|| StoreError::InvalidRow(format!("hour {v} out of range"))),
        KeyValue::Text(s) => Err(StoreError::InvalidRow(format!(
            "expected an hour, got {s:?}"
        ))),
    }
}

/// Build the typed update for `dimension` from decoded columns.
fn build_update(
    dimension: Dimension,
    scope: TenantScope,
    day: NaiveDate,
    path: &str,
    key: &[KeyValue],
    counters: &[i64],
) -> StoreResult<Box<dyn Aggregate>> {
    let path = path.to_string();
    let visitors = counters.first().copied().unwrap_or(0);
    let update: Box<dyn Aggregate> = match (dimension, key) {
        (Dimension::Page, []) => Box::new(VisitorStats {
            scope,
            day,
            path,
            visitors,
            platform_desktop: counters.get(1).copied().unwrap_or(0),
            platform_mobile: counters.get(2).copied().unwrap_or(0),
            platform_unknown: counters.get(3).copied().unwrap_or(0),
        }),
        (Dimension::Hour, [h]) => Box::new(VisitorTimeStats {
            scope,
            day,
            path,
            hour: hour(h)?,
            visitors,
        }),
        (Dimension::Language, [language]) => Box::new(LanguageStats {
            scope,
            day,
            path,
            language: text(language)?,
            visitors,
        }),
        (Dimension::Referrer, [referrer]) => Box::new(ReferrerStats {
            scope,
            day,
            path,
            referrer: text(referrer)?,
            visitors,
        }),
        (Dimension::Os, [os, version]) => Box::new(OsStats {
            scope,
            day,
            path,
            os: text(os)?,
            os_version: text(version)?,
            visitors,
        }),
        (Dimension::Browser, [browser, version]) => Box::new(BrowserStats {
            scope,
            day,
            path,
            browser: text(browser)?,
            browser_version: text(version)?,
            visitors,
        }),
        (dimension, key) => {
            return Err(StoreError::InvalidRow(format!(
                "{dimension} expects {} key values, got {}",
                dimension.key_columns().len(),
                key.len()
            )))
        }
    };
    Ok(update)
}

pub(crate) fn collect_path_in(
    conn: &Connection,
    scope: TenantScope,
    day: NaiveDate,
    path: &str,
) -> StoreResult<Vec<Box<dyn Aggregate>>> {
    let (start, end) = day_window(day)?;
    let mut updates: Vec<Box<dyn Aggregate>> = Vec::new();

    for dimension in Dimension::ALL {
        let key_len = key_expressions(dimension).len();
        let counter_len = counter_expressions(dimension).len();

        let mut stmt = conn.prepare(&collect_sql(dimension)).db()?;
        let mut rows = stmt
            .query(duckdb::params![scope.tenant_id(), start, end, path])
            .db()?;
        while let Some(row) = rows.next().db()? {
            let tenant_id: Option<i64> = row.get(0).db()?;
            let mut key = Vec::with_capacity(key_len);
            for i in 0..key_len {
                key.push(key_value(row.get::<_, Value>(1 + i).db()?)?);
            }
            let mut counters = Vec::with_capacity(counter_len);
            for i in 0..counter_len {
                counters.push(row.get::<_, i64>(1 + key_len + i).db()?);
            }
            updates.push(build_update(
                dimension,
                TenantScope::from(tenant_id),
                day,
                path,
                &key,
                &counters,
            )?);
        }
    }
    Ok(updates)
}

impl DuckDbBackend {
    /// Count distinct visitors for one raw path on `day`, grouped by tenant,
    /// for all six dimensions. Each result is ready to pass to
    /// [`merge`](DuckDbBackend::merge).
    pub async fn collect_path(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
        path: &str,
    ) -> StoreResult<Vec<Box<dyn Aggregate>>> {
        self.read(tx, "collect_path", |conn| {
            collect_path_in(conn, scope, day, path)
        })
        .await
    }

    /// Record every pending hit of `scope` on `day` as counted, so later
    /// [`collect_path`](DuckDbBackend::collect_path) and
    /// [`list_pending_days`](DuckDbBackend::list_pending_days) calls skip
    /// them. Run it in the transaction that merged the collected counts.
    /// Returns the number of tenant groups marked.
    pub async fn mark_rolled_up(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<usize> {
        let marked = self
            .write(tx, "mark_rolled_up", |conn| mark_rolled_up_in(conn, scope, day))
            .await?;
        debug!(%scope, %day, marked, "Marked day as rolled up");
        Ok(marked)
    }
}
