//! Small SQL helpers shared by the query modules.

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::types::{ToSql, Value};
use visitstat_core::{KeyValue, StoreError, StoreResult};

/// Timestamps are bound as naive UTC strings, matching the `TIMESTAMP` columns.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) type Params = Vec<Box<dyn ToSql>>;

pub(crate) fn param_refs(params: &Params) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

/// The optional-equality tenant predicate: a NULL parameter matches every row.
pub(crate) fn scope_predicate(param: usize) -> String {
    format!("(CAST(?{param} AS BIGINT) IS NULL OR tenant_id = ?{param})")
}

/// Exact tenant equality: a NULL parameter matches only rows without a tenant.
pub(crate) fn exact_tenant_predicate(param: usize) -> String {
    format!("tenant_id IS NOT DISTINCT FROM CAST(?{param} AS BIGINT)")
}

/// Hits not yet covered by a rollup mark for their tenant and day.
pub(crate) const PENDING_HITS: &str = "NOT EXISTS (SELECT 1 FROM rollup_mark m \
     WHERE m.tenant_id IS NOT DISTINCT FROM hit.tenant_id \
     AND m.day = CAST(hit.time AS DATE) AND hit.id <= m.last_hit_id)";

pub(crate) fn day_param(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// `[day 00:00, day+1 00:00)` as timestamp parameters.
pub(crate) fn day_window(day: NaiveDate) -> StoreResult<(String, String)> {
    let next = day
        .succ_opt()
        .ok_or_else(|| StoreError::InvalidRow(format!("no day after {day}")))?;
    Ok((
        day.format("%Y-%m-%d 00:00:00").to_string(),
        next.format("%Y-%m-%d 00:00:00").to_string(),
    ))
}

pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a `DATE` column read back as `CAST(day AS VARCHAR)`.
pub(crate) fn parse_day(raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StoreError::InvalidRow(format!("bad day {raw:?}: {e}")))
}

pub(crate) fn key_param(value: &KeyValue) -> Box<dyn ToSql> {
    match value {
        KeyValue::Integer(v) => Box::new(*v),
        KeyValue::Text(s) => Box::new(s.clone()),
    }
}

pub(crate) fn key_value(value: Value) -> StoreResult<KeyValue> {
    match value {
        Value::Text(s) => Ok(KeyValue::Text(s)),
        Value::TinyInt(v) => Ok(KeyValue::Integer(v.into())),
        Value::SmallInt(v) => Ok(KeyValue::Integer(v.into())),
        Value::Int(v) => Ok(KeyValue::Integer(v.into())),
        Value::BigInt(v) => Ok(KeyValue::Integer(v)),
        Value::UTinyInt(v) => Ok(KeyValue::Integer(v.into())),
        Value::USmallInt(v) => Ok(KeyValue::Integer(v.into())),
        Value::UInt(v) => Ok(KeyValue::Integer(v.into())),
        other => Err(StoreError::InvalidRow(format!(
            "unsupported key value {other:?}"
        ))),
    }
}
