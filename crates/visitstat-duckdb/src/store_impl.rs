use async_trait::async_trait;
use chrono::NaiveDate;
use visitstat_core::{
    Aggregate, AggregateRow, Dimension, Hit, HitStore, StoreResult, TenantScope,
};

use crate::tx::Tx;
use crate::DuckDbBackend;

#[async_trait]
impl HitStore for DuckDbBackend {
    type Tx = Tx;

    async fn begin(&self) -> StoreResult<Tx> {
        DuckDbBackend::begin(self).await
    }

    async fn commit(&self, tx: Tx) {
        DuckDbBackend::commit(self, tx).await
    }

    async fn try_commit(&self, tx: Tx) -> StoreResult<()> {
        DuckDbBackend::try_commit(self, tx).await
    }

    async fn rollback(&self, tx: Tx) {
        DuckDbBackend::rollback(self, tx).await
    }

    async fn save_hits(&self, tx: Option<&mut Tx>, hits: &[Hit]) -> StoreResult<()> {
        DuckDbBackend::save_hits(self, tx, hits).await
    }

    async fn merge(&self, tx: Option<&mut Tx>, update: &dyn Aggregate) -> StoreResult<()> {
        DuckDbBackend::merge(self, tx, update).await.map(|_| ())
    }

    async fn merge_exact(&self, tx: Option<&mut Tx>, update: &dyn Aggregate) -> StoreResult<()> {
        DuckDbBackend::merge_exact(self, tx, update).await.map(|_| ())
    }

    async fn delete_hits_for_day(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<usize> {
        DuckDbBackend::delete_hits_for_day(self, tx, scope, day).await
    }

    async fn list_days(&self, tx: Option<&mut Tx>, scope: TenantScope) -> StoreResult<Vec<NaiveDate>> {
        DuckDbBackend::list_days(self, tx, scope).await
    }

    async fn list_pending_days(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
    ) -> StoreResult<Vec<NaiveDate>> {
        DuckDbBackend::list_pending_days(self, tx, scope).await
    }

    async fn list_paths(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<Vec<String>> {
        DuckDbBackend::list_paths(self, tx, scope, day).await
    }

    async fn collect_path(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
        path: &str,
    ) -> StoreResult<Vec<Box<dyn Aggregate>>> {
        DuckDbBackend::collect_path(self, tx, scope, day, path).await
    }

    async fn mark_rolled_up(
        &self,
        tx: Option<&mut Tx>,
        scope: TenantScope,
        day: NaiveDate,
    ) -> StoreResult<usize> {
        DuckDbBackend::mark_rolled_up(self, tx, scope, day).await
    }

    async fn count_hits(&self, tx: Option<&mut Tx>, scope: TenantScope) -> StoreResult<i64> {
        DuckDbBackend::count_hits(self, tx, scope).await
    }

    async fn list_aggregates(
        &self,
        tx: Option<&mut Tx>,
        dimension: Dimension,
        scope: TenantScope,
    ) -> StoreResult<Vec<AggregateRow>> {
        DuckDbBackend::list_aggregates(self, tx, dimension, scope).await
    }
}
