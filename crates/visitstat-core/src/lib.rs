pub mod aggregate;
pub mod config;
pub mod error;
pub mod hit;
pub mod scope;
pub mod store;

pub use aggregate::{
    Aggregate, AggregateRow, BrowserStats, Dimension, KeyColumn, KeyMatch, KeyValue,
    LanguageStats, OsStats, ReferrerStats, VisitorStats, VisitorTimeStats,
};
pub use error::{StoreError, StoreResult};
pub use hit::Hit;
pub use scope::TenantScope;
pub use store::HitStore;
