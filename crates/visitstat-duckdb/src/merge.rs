//! The aggregate merge engine.
//!
//! One algorithm serves all six aggregate tables; a [`Dimension`] supplies the
//! table, its key columns (with their matching rule) and its counters:
//!
//! 1. look up the row for `(scope, day, lower(path), key)`;
//! 2. found: write `existing + delta` for every counter, keyed by `id`;
//! 3. not found: insert the full key tuple with `delta` as initial counters.
//!
//! Steps run on one connection inside one transaction, and the backend
//! serialises transactions, so the lookup and the write are never
//! interleaved with another merge.

use duckdb::Connection;
use tracing::debug;
use visitstat_core::{Aggregate, Dimension, KeyMatch, StoreError, StoreResult};

use crate::error::DbResultExt;
use crate::sql::{day_param, exact_tenant_predicate, key_param, param_refs, scope_predicate, Params};
use crate::tx::Tx;
use crate::DuckDbBackend;

/// What a merge did to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated { id: i64 },
}

/// How an update's tenant selects the row it folds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantMatch {
    /// `Global` is a wildcard and matches a row of any tenant.
    Scope,
    /// `Global` matches only rows stored without a tenant.
    Exact,
}

/// `SELECT id, <counters>` for the row matching a key tuple.
///
/// Parameters: `?1` tenant, `?2` day, `?3` path, `?4..` key values.
pub(crate) fn lookup_sql(dimension: Dimension, tenant: TenantMatch) -> String {
    let tenant_predicate = match tenant {
        TenantMatch::Scope => scope_predicate(1),
        TenantMatch::Exact => exact_tenant_predicate(1),
    };
    let mut sql = format!(
        "SELECT id, {} FROM {} WHERE {} AND day = CAST(?2 AS DATE) AND lower(path) = lower(?3)",
        dimension.counter_columns().join(", "),
        dimension.table(),
        tenant_predicate,
    );
    for (i, column) in dimension.key_columns().iter().enumerate() {
        let param = i + 4;
        match column.matching {
            KeyMatch::IgnoreCase => {
                sql.push_str(&format!(" AND lower({}) = lower(?{param})", column.name))
            }
            KeyMatch::Exact => sql.push_str(&format!(" AND {} = ?{param}", column.name)),
        }
    }
    sql.push_str(" ORDER BY id LIMIT 1");
    sql
}

/// `UPDATE ... SET <counters> WHERE id = ?n`; counters bind to `?1..`.
pub(crate) fn update_sql(dimension: Dimension) -> String {
    let counters = dimension.counter_columns();
    let assignments: Vec<String> = counters
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        dimension.table(),
        assignments.join(", "),
        counters.len() + 1
    )
}

/// `INSERT` of the full key tuple and the initial counters.
pub(crate) fn insert_sql(dimension: Dimension) -> String {
    let mut columns = vec!["tenant_id", "day", "path"];
    columns.extend(dimension.key_columns().iter().map(|k| k.name));
    columns.extend(dimension.counter_columns().iter().copied());

    let placeholders: Vec<String> = (1..=columns.len())
        .map(|i| {
            if i == 2 {
                "CAST(?2 AS DATE)".to_string()
            } else {
                format!("?{i}")
            }
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dimension.table(),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Check an update against its descriptor and the monotonic-counter rule.
fn validate(update: &dyn Aggregate) -> StoreResult<(Vec<i64>, Params)> {
    let dimension = update.dimension();
    let key = update.key();
    let delta = update.counters();

    if key.len() != dimension.key_columns().len()
        || delta.len() != dimension.counter_columns().len()
    {
        return Err(StoreError::InvalidRow(format!(
            "{dimension} update has {} key values and {} counters",
            key.len(),
            delta.len()
        )));
    }
    for (column, value) in dimension.counter_columns().iter().zip(&delta) {
        if *value < 0 {
            return Err(StoreError::InvalidDelta {
                table: dimension.table(),
                column: *column,
                value: *value,
            });
        }
    }

    let mut params: Params = vec![
        Box::new(update.scope().tenant_id()),
        Box::new(day_param(update.day())),
        Box::new(update.path().to_string()),
    ];
    params.extend(key.iter().map(key_param));
    Ok((delta, params))
}

pub(crate) fn merge_in(
    conn: &Connection,
    update: &dyn Aggregate,
    tenant: TenantMatch,
) -> StoreResult<MergeOutcome> {
    let dimension = update.dimension();
    let counters = dimension.counter_columns();
    let (delta, key_params) = validate(update)?;

    let existing: Option<(i64, Vec<i64>)> = {
        let mut stmt = conn.prepare(&lookup_sql(dimension, tenant)).db()?;
        let mut rows = stmt.query(param_refs(&key_params).as_slice()).db()?;
        match rows.next().db()? {
            Some(row) => {
                let id: i64 = row.get(0).db()?;
                let mut values = Vec::with_capacity(counters.len());
                for i in 0..counters.len() {
                    values.push(row.get::<_, i64>(i + 1).db()?);
                }
                Some((id, values))
            }
            None => None,
        }
    };

    match existing {
        Some((id, current)) => {
            let mut params: Params = Vec::with_capacity(counters.len() + 1);
            for ((column, current), delta) in counters.iter().zip(current).zip(&delta) {
                let total = current
                    .checked_add(*delta)
                    .ok_or(StoreError::CounterOverflow {
                        table: dimension.table(),
                        column: *column,
                    })?;
                params.push(Box::new(total));
            }
            params.push(Box::new(id));
            conn.execute(&update_sql(dimension), param_refs(&params).as_slice())
                .db()?;
            Ok(MergeOutcome::Updated { id })
        }
        None => {
            let mut params = key_params;
            params.extend(delta.into_iter().map(|d| Box::new(d) as Box<dyn duckdb::types::ToSql>));
            conn.execute(&insert_sql(dimension), param_refs(&params).as_slice())
                .db()?;
            Ok(MergeOutcome::Inserted)
        }
    }
}

impl DuckDbBackend {
    /// Fold `update` into the aggregate row for its key tuple.
    ///
    /// Without a caller transaction the lookup and the write run in one
    /// transaction of their own. Either the insert or the update happens,
    /// never both and never neither. A `Global` update matches an existing
    /// row of any tenant.
    pub async fn merge(&self, tx: Option<&mut Tx>, update: &dyn Aggregate) -> StoreResult<MergeOutcome> {
        self.merge_with(tx, update, TenantMatch::Scope).await
    }

    /// Like [`merge`](DuckDbBackend::merge), but a `Global` update only
    /// matches rows stored without a tenant. Used for updates produced by
    /// [`collect_path`](DuckDbBackend::collect_path), whose scope is the
    /// grouped `tenant_id` itself.
    pub async fn merge_exact(
        &self,
        tx: Option<&mut Tx>,
        update: &dyn Aggregate,
    ) -> StoreResult<MergeOutcome> {
        self.merge_with(tx, update, TenantMatch::Exact).await
    }

    async fn merge_with(
        &self,
        tx: Option<&mut Tx>,
        update: &dyn Aggregate,
        tenant: TenantMatch,
    ) -> StoreResult<MergeOutcome> {
        let outcome = self
            .write(tx, "merge", |conn| merge_in(conn, update, tenant))
            .await?;
        debug!(
            table = update.dimension().table(),
            scope = %update.scope(),
            ?tenant,
            day = %update.day(),
            path = update.path(),
            ?outcome,
            "Merged counters"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use visitstat_core::{LanguageStats, TenantScope};

    use super::*;

    #[test]
    fn lookup_folds_text_keys_and_matches_versions_exactly() {
        assert_eq!(
            lookup_sql(Dimension::Language, TenantMatch::Scope),
            "SELECT id, visitors FROM language_stats \
             WHERE (CAST(?1 AS BIGINT) IS NULL OR tenant_id = ?1) \
             AND day = CAST(?2 AS DATE) AND lower(path) = lower(?3) \
             AND lower(language) = lower(?4) ORDER BY id LIMIT 1"
        );
        let os = lookup_sql(Dimension::Os, TenantMatch::Scope);
        assert!(os.contains(" AND os = ?4 AND os_version = ?5 "));
    }

    #[test]
    fn page_lookup_reads_all_platform_counters() {
        let sql = lookup_sql(Dimension::Page, TenantMatch::Scope);
        assert!(sql.starts_with(
            "SELECT id, visitors, platform_desktop, platform_mobile, platform_unknown FROM visitor_stats"
        ));
    }

    #[test]
    fn exact_lookup_matches_null_tenant_literally() {
        let sql = lookup_sql(Dimension::Referrer, TenantMatch::Exact);
        assert!(sql.starts_with(
            "SELECT id, visitors FROM referrer_stats \
             WHERE tenant_id IS NOT DISTINCT FROM CAST(?1 AS BIGINT) AND day"
        ));
        assert!(!sql.contains("IS NULL OR"));
    }

    #[test]
    fn update_sets_only_counters() {
        assert_eq!(
            update_sql(Dimension::Page),
            "UPDATE visitor_stats SET visitors = ?1, platform_desktop = ?2, \
             platform_mobile = ?3, platform_unknown = ?4 WHERE id = ?5"
        );
        assert_eq!(
            update_sql(Dimension::Hour),
            "UPDATE visitor_time_stats SET visitors = ?1 WHERE id = ?2"
        );
    }

    #[test]
    fn insert_lists_key_tuple_then_counters() {
        assert_eq!(
            insert_sql(Dimension::Browser),
            "INSERT INTO browser_stats (tenant_id, day, path, browser, browser_version, visitors) \
             VALUES (?1, CAST(?2 AS DATE), ?3, ?4, ?5, ?6)"
        );
    }

    #[test]
    fn negative_delta_is_rejected() {
        let update = LanguageStats {
            scope: TenantScope::Global,
            day: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            path: "/".into(),
            language: "en".into(),
            visitors: -1,
        };
        assert!(matches!(
            validate(&update),
            Err(StoreError::InvalidDelta { column: "visitors", value: -1, .. })
        ));
    }
}
