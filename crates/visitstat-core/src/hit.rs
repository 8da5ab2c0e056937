use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw recorded page visit. Mirrors the `hit` table columns exactly.
///
/// Hits are immutable once written. `fingerprint` is an anonymised visitor
/// hash computed upstream; it is not a stable user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// `None` when the deployment is not multi-tenant.
    pub tenant_id: Option<i64>,
    pub fingerprint: String,
    pub path: String,
    pub url: String,
    pub language: String,
    pub user_agent: String,
    pub referrer: String,
    pub os: String,
    pub os_version: String,
    pub browser: String,
    pub browser_version: String,
    /// `desktop` and `mobile` both false means the platform is unknown.
    pub desktop: bool,
    pub mobile: bool,
    pub time: DateTime<Utc>,
}
