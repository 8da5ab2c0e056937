//! Unit of work over the shared DuckDB connection.

use duckdb::Connection;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn, Span};
use visitstat_core::{StoreError, StoreResult};

use crate::error::DbResultExt;

/// An open transaction.
///
/// Holds the connection lock for its whole lifetime, so every transaction on
/// a [`DuckDbBackend`](crate::DuckDbBackend) is serialised: a merge's read and
/// its write can never interleave with another writer. Dropping an unfinished
/// `Tx` (for example a cancelled future) rolls it back.
pub struct Tx {
    conn: OwnedMutexGuard<Connection>,
    open: bool,
    span: Span,
}

impl Tx {
    pub(crate) fn begin(conn: OwnedMutexGuard<Connection>, span: Span) -> StoreResult<Self> {
        conn.execute_batch("BEGIN TRANSACTION").db()?;
        Ok(Self {
            conn,
            open: true,
            span,
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Commit, propagating failure. A failed commit leaves nothing applied.
    pub fn try_commit(mut self) -> StoreResult<()> {
        self.open = false;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // DuckDB aborts the transaction on a failed commit; make sure the
            // connection is not left inside it.
            if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                debug!(parent: &self.span, error = %rollback, "rollback after failed commit");
            }
            return Err(StoreError::Commit(e.to_string()));
        }
        Ok(())
    }

    pub fn try_rollback(mut self) -> StoreResult<()> {
        self.open = false;
        self.conn.execute_batch("ROLLBACK").db()
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(parent: &self.span, error = %e, "error rolling back abandoned transaction");
            }
        }
    }
}
