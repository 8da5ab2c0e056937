use chrono::NaiveDate;
use duckdb::Connection;
use tracing::{debug, info};
use visitstat_core::{Hit, StoreError, StoreResult, TenantScope};

use crate::error::DbResultExt;
use crate::sql::{day_window, format_time, param_refs, scope_predicate, Params};
use crate::tx::Tx;
use crate::DuckDbBackend;

const HIT_COLUMNS: usize = 14;

/// Multi-row `INSERT` covering all hit columns for `rows` hits, with numbered
/// placeholders `(?1..?14), (?15..?28), ...`.
pub(crate) fn insert_hits_sql(rows: usize) -> String {
    let mut sql = String::from(
        r#"INSERT INTO hit (tenant_id, fingerprint, path, url, language, user_agent, "ref", os, os_version, browser, browser_version, desktop, mobile, time) VALUES "#,
    );
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        let base = row * HIT_COLUMNS;
        sql.push('(');
        for col in 1..=HIT_COLUMNS {
            if col > 1 {
                sql.push_str(", ");
            }
            if col == HIT_COLUMNS {
                sql.push_str(&format!("CAST(?{} AS TIMESTAMP)", base + col));
            } else {
                sql.push_str(&format!("?{}", base + col));
            }
        }
        sql.push(')');
    }
    sql
}

fn hit_params(hits: &[Hit]) -> Params {
    let mut params: Params = Vec::with_capacity(hits.len() * HIT_COLUMNS);
    for hit in hits {
        params.push(Box::new(hit.tenant_id));
        params.push(Box::new(hit.fingerprint.clone()));
        params.push(Box::new(hit.path.clone()));
        params.push(Box::new(hit.url.clone()));
        params.push(Box::new(hit.language.clone()));
        params.push(Box::new(hit.user_agent.clone()));
        params.push(Box::new(hit.referrer.clone()));
        params.push(Box::new(hit.os.clone()));
        params.push(Box::new(hit.os_version.clone()));
        params.push(Box::new(hit.browser.clone()));
        params.push(Box::new(hit.browser_version.clone()));
        params.push(Box::new(hit.desktop));
        params.push(Box::new(hit.mobile));
        params.push(Box::new(format_time(&hit.time)));
    }
    params
}

pub(crate) fn save_hits_in(conn: &Connection, hits: &[Hit]) -> StoreResult<usize> {
    let params = hit_params(hits);
    conn.execute(&insert_hits_sql(hits.len()), param_refs(&params).as_slice())
        .db()
}

pub(crate) fn delete_hits_in(conn: &Connection, scope: TenantScope, day: NaiveDate) -> StoreResult<usize> {
    let (start, end) = day_window(day)?;
    let sql = format!(
        "DELETE FROM hit WHERE {} AND time >= CAST(?2 AS TIMESTAMP) AND time < CAST(?3 AS TIMESTAMP)",
        scope_predicate(1)
    );
    conn.execute(&sql, duckdb::params![scope.tenant_id(), start, end])
        .db()
}

impl DuckDbBackend {
    /// Append a batch of hits in one multi-row insert.
    ///
    /// An empty batch is rejected with [`StoreError::EmptyBatch`] without
    /// touching the database. Fields are stored as given; if the engine
    /// rejects any row the whole batch is rolled back (or, inside a caller's
    /// transaction, the statement fails and the caller must roll back).
    pub async fn save_hits(&self, tx: Option<&mut Tx>, hits: &[Hit]) -> StoreResult<()> {
        if hits.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        let inserted = self
            .write(tx, "save_hits", |conn| save_hits_in(conn, hits))
            .await?;
        debug!(hits = inserted, "Saved hits");
        Ok(())
    }

    /// Delete every raw hit of `scope` in `[day 00:00, day+1 00:00)`.
    ///
    /// Irreversible. The caller must make sure the day was rolled up first.
    pub async fn delete_hits_for_day(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<usize> {
        let deleted = self
            .write(tx, "delete_hits_for_day", |conn| {
                delete_hits_in(conn, scope, day)
            })
            .await?;
        info!(%scope, %day, deleted, "Deleted hits for day");
        Ok(deleted)
    }
}
