pub mod backend;
mod error;
pub mod hits;
pub mod merge;
pub mod queries;
pub mod schema;
mod sql;
mod store_impl;
pub mod tx;

pub use backend::DuckDbBackend;
pub use tx::Tx;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `visitstat_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
