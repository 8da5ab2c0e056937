//! Periodic rollup of raw hits into the aggregate tables.
//!
//! Each completed day with uncounted hits is processed in one transaction:
//! list its paths, collect distinct-visitor counts per path over the hits no
//! earlier pass has counted, merge every count, mark those hits as counted
//! and, when purging is enabled, delete the day's raw hits. A failing day
//! (commit included) is rolled back in full and the run moves on to the
//! next one. The marks keep repeated passes from counting a hit twice when
//! hits are kept.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{error, info};

use visitstat_core::config::Config;
use visitstat_core::{HitStore, StoreResult, TenantScope};

/// What one day's rollup did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayReport {
    pub paths: usize,
    pub merged: usize,
    pub purged: usize,
}

/// Totals of one [`RollupWorker::run_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupSummary {
    pub days_processed: usize,
    pub days_failed: usize,
    pub merged: usize,
    pub purged: usize,
}

pub struct RollupWorker<S: HitStore> {
    store: Arc<S>,
    scope: TenantScope,
    purge: bool,
}

impl<S: HitStore> RollupWorker<S> {
    pub fn new(store: Arc<S>, scope: TenantScope, purge: bool) -> Self {
        Self {
            store,
            scope,
            purge,
        }
    }

    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self::new(store, config.scope, config.purge_after_rollup)
    }

    /// Roll up every completed day that still has uncounted hits.
    ///
    /// Only a failure to list the days aborts the pass; per-day failures are
    /// logged and counted in [`RollupSummary::days_failed`].
    pub async fn run_once(&self) -> StoreResult<RollupSummary> {
        let days = self.store.list_pending_days(None, self.scope).await?;
        let mut summary = RollupSummary::default();

        for day in days {
            match self.rollup_day(day).await {
                Ok(report) => {
                    summary.days_processed += 1;
                    summary.merged += report.merged;
                    summary.purged += report.purged;
                    info!(
                        scope = %self.scope,
                        %day,
                        paths = report.paths,
                        merged = report.merged,
                        purged = report.purged,
                        "Day rolled up"
                    );
                }
                Err(e) => {
                    summary.days_failed += 1;
                    error!(scope = %self.scope, %day, error = %e, "Rollup failed for day, rolled back");
                }
            }
        }
        Ok(summary)
    }

    /// Roll up a single day in its own transaction.
    pub async fn rollup_day(&self, day: NaiveDate) -> StoreResult<DayReport> {
        let mut tx = self.store.begin().await?;
        match self.rollup_day_in(&mut tx, day).await {
            Ok(report) => {
                self.store.try_commit(tx).await?;
                Ok(report)
            }
            Err(e) => {
                self.store.rollback(tx).await;
                Err(e)
            }
        }
    }

    async fn rollup_day_in(&self, tx: &mut S::Tx, day: NaiveDate) -> StoreResult<DayReport> {
        let store = &self.store;
        let paths = store.list_paths(Some(&mut *tx), self.scope, day).await?;
        let mut report = DayReport {
            paths: paths.len(),
            ..DayReport::default()
        };

        for path in &paths {
            let updates = store
                .collect_path(Some(&mut *tx), self.scope, day, path)
                .await?;
            // Updates carry their grouped tenant; match it exactly.
            for update in &updates {
                store.merge_exact(Some(&mut *tx), update.as_ref()).await?;
            }
            report.merged += updates.len();
        }
        store.mark_rolled_up(Some(&mut *tx), self.scope, day).await?;

        if self.purge {
            report.purged = store
                .delete_hits_for_day(Some(&mut *tx), self.scope, day)
                .await?;
        }
        Ok(report)
    }

    /// Run [`run_once`](Self::run_once) on a fixed interval until the task is
    /// dropped. The first pass starts immediately.
    pub async fn run_loop(self: Arc<Self>, interval: Duration) {
        // tokio panics on a zero period.
        let interval = interval.max(Duration::from_secs(1));
        info!(
            scope = %self.scope,
            interval_secs = interval.as_secs(),
            purge = self.purge,
            "Rollup worker started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(summary) => {
                    let remaining = self.store.count_hits(None, self.scope).await;
                    info!(
                        days_processed = summary.days_processed,
                        days_failed = summary.days_failed,
                        merged = summary.merged,
                        purged = summary.purged,
                        remaining_hits = remaining.ok(),
                        "Rollup pass finished"
                    );
                }
                Err(e) => error!(error = %e, "Rollup pass failed"),
            }
        }
    }
}
