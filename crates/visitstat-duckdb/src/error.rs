use visitstat_core::{StoreError, StoreResult};

/// Converts engine failures into the store's error taxonomy at each call site.
pub(crate) trait DbResultExt<T> {
    fn db(self) -> StoreResult<T>;
}

impl<T> DbResultExt<T> for Result<T, duckdb::Error> {
    fn db(self) -> StoreResult<T> {
        self.map_err(|e| StoreError::Database(e.to_string()))
    }
}
