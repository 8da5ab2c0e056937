//! Storage backend abstraction.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::aggregate::{Aggregate, AggregateRow, Dimension};
use crate::error::StoreResult;
use crate::hit::Hit;
use crate::scope::TenantScope;

/// The write path for raw hits and the six aggregate tables.
///
/// Every operation takes an optional transaction. With `None` the backend
/// opens its own transaction and commits it before returning; with
/// `Some(tx)` the operation joins the caller's transaction and never commits
/// or rolls it back (the caller owns it).
#[async_trait]
pub trait HitStore: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Best-effort: a failed commit is logged, not returned.
    async fn commit(&self, tx: Self::Tx);

    /// Commit and return the failure instead of logging it. Nothing is
    /// applied when this fails.
    async fn try_commit(&self, tx: Self::Tx) -> StoreResult<()>;

    /// Best-effort: a failed rollback is logged, not returned.
    async fn rollback(&self, tx: Self::Tx);

    /// Append all hits in one multi-row insert. All-or-nothing.
    async fn save_hits(&self, tx: Option<&mut Self::Tx>, hits: &[Hit]) -> StoreResult<()>;

    /// Fold `update`'s counters into the single row for its key tuple,
    /// creating the row on first merge.
    async fn merge(&self, tx: Option<&mut Self::Tx>, update: &dyn Aggregate) -> StoreResult<()>;

    /// Like [`merge`](HitStore::merge), except that a `Global` update only
    /// matches a row stored without a tenant instead of a row of any tenant.
    async fn merge_exact(
        &self,
        tx: Option<&mut Self::Tx>,
        update: &dyn Aggregate,
    ) -> StoreResult<()>;

    /// Delete every raw hit in `[day 00:00, day+1 00:00)` within `scope`.
    /// Returns the number of deleted hits.
    async fn delete_hits_for_day(
        &self,
        tx: Option<&mut Self::Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<usize>;

    /// Distinct days with raw hits, ascending, excluding the current day.
    async fn list_days(
        &self,
        tx: Option<&mut Self::Tx>,
        scope: TenantScope,
    ) -> StoreResult<Vec<NaiveDate>>;

    /// Days from [`list_days`](HitStore::list_days) that still hold hits no
    /// rollup has counted.
    async fn list_pending_days(
        &self,
        tx: Option<&mut Self::Tx>,
        scope: TenantScope,
    ) -> StoreResult<Vec<NaiveDate>>;

    /// Distinct paths (as stored) with raw hits on `day`.
    async fn list_paths(
        &self,
        tx: Option<&mut Self::Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<Vec<String>>;

    /// Distinct-visitor counts for one raw path and day, one update per
    /// tenant and dimension key, across all six dimensions. Hits already
    /// covered by [`mark_rolled_up`](HitStore::mark_rolled_up) are left out.
    /// A group without a tenant comes back with `Global` scope and is meant
    /// for [`merge_exact`](HitStore::merge_exact).
    async fn collect_path(
        &self,
        tx: Option<&mut Self::Tx>,
        scope: TenantScope,
        day: NaiveDate,
        path: &str,
    ) -> StoreResult<Vec<Box<dyn Aggregate>>>;

    /// Record the pending hits of `scope` on `day` as counted. Returns the
    /// number of tenant groups marked.
    async fn mark_rolled_up(
        &self,
        tx: Option<&mut Self::Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<usize>;

    async fn count_hits(&self, tx: Option<&mut Self::Tx>, scope: TenantScope) -> StoreResult<i64>;

    /// Every stored row of one dimension, ordered by day, path and id.
    async fn list_aggregates(
        &self,
        tx: Option<&mut Self::Tx>,
        dimension: Dimension,
        scope: TenantScope,
    ) -> StoreResult<Vec<AggregateRow>>;
}
