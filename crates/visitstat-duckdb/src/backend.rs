use std::sync::Arc;
use std::time::Duration;

use duckdb::Connection;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, info_span, warn, Span};
use visitstat_core::config::StoreConfig;
use visitstat_core::{StoreError, StoreResult};

use crate::error::DbResultExt;
use crate::schema::init_sql;
use crate::tx::Tx;

/// A DuckDB backend for the hit and aggregate tables.
///
/// DuckDB is single-writer: one process owns the database file read-write.
/// Inside the process the connection sits behind `Arc<Mutex<_>>` and every
/// operation (and every [`Tx`]) holds the lock while it runs, so all access
/// is serialised. This is the isolation the merge engine relies on: nothing
/// can write between a merge's lookup and its update.
///
/// Memory and thread limits are enforced by [`init_sql`] at open time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
    lock_timeout: Duration,
    span: Span,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path` and create all
    /// tables that do not exist yet.
    pub fn open(path: &str, config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path).db()?;
        let backend = Self::init(conn, path, config)?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, config.memory_limit
        );
        Ok(backend)
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests: data is discarded when the struct is dropped.
    pub fn open_in_memory(config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().db()?;
        Self::init(conn, ":memory:", config)
    }

    fn init(conn: Connection, path: &str, config: &StoreConfig) -> StoreResult<Self> {
        conn.execute_batch(&init_sql(&config.memory_limit)).db()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            lock_timeout: config.lock_timeout,
            span: info_span!("duckdb", db = %path),
        })
    }

    /// Wait for the connection, giving up after the configured lock timeout.
    pub(crate) async fn lock(&self, op: &'static str) -> StoreResult<OwnedMutexGuard<Connection>> {
        tokio::time::timeout(self.lock_timeout, Arc::clone(&self.conn).lock_owned())
            .await
            .map_err(|_| StoreError::Timeout {
                op,
                after: self.lock_timeout,
            })
    }

    /// Open a transaction. Other operations on this backend wait until it is
    /// committed, rolled back or dropped.
    pub async fn begin(&self) -> StoreResult<Tx> {
        let conn = self.lock("begin").await?;
        Tx::begin(conn, self.span.clone())
    }

    /// Commit `tx`. Failures are logged, never returned.
    pub async fn commit(&self, tx: Tx) {
        if let Err(e) = tx.try_commit() {
            warn!(parent: &self.span, error = %e, "error committing transaction");
        }
    }

    /// Commit `tx`, returning the failure. A failed commit applies nothing.
    pub async fn try_commit(&self, tx: Tx) -> StoreResult<()> {
        tx.try_commit()
    }

    /// Roll back `tx`. Failures are logged, never returned.
    pub async fn rollback(&self, tx: Tx) {
        if let Err(e) = tx.try_rollback() {
            warn!(parent: &self.span, error = %e, "error rolling back transaction");
        }
    }

    /// Run a mutating statement group inside the caller's transaction, or in
    /// a transaction of its own that is committed on success and rolled back
    /// on failure.
    pub(crate) async fn write<T, F>(&self, tx: Option<&mut Tx>, op: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send,
        T: Send,
    {
        if let Some(tx) = tx {
            return f(tx.conn());
        }

        let conn = self.lock(op).await?;
        let tx = Tx::begin(conn, self.span.clone())?;
        match f(tx.conn()) {
            Ok(value) => {
                tx.try_commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.try_rollback() {
                    warn!(parent: &self.span, op, error = %rollback, "error rolling back transaction");
                }
                Err(e)
            }
        }
    }

    /// Run a read on the caller's transaction, or directly on the connection.
    pub(crate) async fn read<T, F>(&self, tx: Option<&mut Tx>, op: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send,
        T: Send,
    {
        match tx {
            Some(tx) => f(tx.conn()),
            None => {
                let conn = self.lock(op).await?;
                f(&conn)
            }
        }
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    pub async fn ping(&self) -> StoreResult<()> {
        let conn = self.lock("ping").await?;
        conn.execute_batch("SELECT 1").db()
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    /// Production code should use the typed methods.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
