//! Aggregate counter entities and the per-dimension descriptors the merge
//! engine is instantiated with.
//!
//! Each of the six aggregate tables keeps at most one row per
//! `(tenant, day, lower(path), dimension key)`. A [`Dimension`] describes how
//! that key is matched and which counters are accumulated; the entity structs
//! below carry one update (key tuple plus counter deltas) for their dimension.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::scope::TenantScope;

/// One axis of aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Visitors per page, split by platform.
    Page,
    Hour,
    Language,
    Referrer,
    Os,
    Browser,
}

/// How a key column is compared when looking up an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// `lower(column) = lower(value)`.
    IgnoreCase,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: &'static str,
    pub matching: KeyMatch,
}

const fn exact(name: &'static str) -> KeyColumn {
    KeyColumn {
        name,
        matching: KeyMatch::Exact,
    }
}

const fn ignore_case(name: &'static str) -> KeyColumn {
    KeyColumn {
        name,
        matching: KeyMatch::IgnoreCase,
    }
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Page,
        Dimension::Hour,
        Dimension::Language,
        Dimension::Referrer,
        Dimension::Os,
        Dimension::Browser,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Dimension::Page => "visitor_stats",
            Dimension::Hour => "visitor_time_stats",
            Dimension::Language => "language_stats",
            Dimension::Referrer => "referrer_stats",
            Dimension::Os => "os_stats",
            Dimension::Browser => "browser_stats",
        }
    }

    /// Key columns beyond `(tenant_id, day, path)`. The path itself is always
    /// matched case-insensitively.
    pub fn key_columns(self) -> &'static [KeyColumn] {
        const HOUR: [KeyColumn; 1] = [exact("hour")];
        const LANGUAGE: [KeyColumn; 1] = [ignore_case("language")];
        const REFERRER: [KeyColumn; 1] = [ignore_case("referrer")];
        const OS: [KeyColumn; 2] = [exact("os"), exact("os_version")];
        const BROWSER: [KeyColumn; 2] = [exact("browser"), exact("browser_version")];

        match self {
            Dimension::Page => &[],
            Dimension::Hour => &HOUR,
            Dimension::Language => &LANGUAGE,
            Dimension::Referrer => &REFERRER,
            Dimension::Os => &OS,
            Dimension::Browser => &BROWSER,
        }
    }

    pub fn counter_columns(self) -> &'static [&'static str] {
        match self {
            Dimension::Page => &[
                "visitors",
                "platform_desktop",
                "platform_mobile",
                "platform_unknown",
            ],
            _ => &["visitors"],
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A dimension key value, bound as a statement parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Integer(i64),
    Text(String),
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(value.to_string())
    }
}

impl From<u8> for KeyValue {
    fn from(value: u8) -> Self {
        KeyValue::Integer(i64::from(value))
    }
}

/// One counter update for a single dimension.
///
/// `key()` is aligned with `dimension().key_columns()` and `counters()` with
/// `dimension().counter_columns()`.
pub trait Aggregate: fmt::Debug + Send + Sync {
    fn dimension(&self) -> Dimension;
    fn scope(&self) -> TenantScope;
    fn day(&self) -> NaiveDate;
    fn path(&self) -> &str;
    fn key(&self) -> Vec<KeyValue>;
    fn counters(&self) -> Vec<i64>;
}

/// Visitors per page and day, with the platform split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorStats {
    pub scope: TenantScope,
    pub day: NaiveDate,
    pub path: String,
    pub visitors: i64,
    pub platform_desktop: i64,
    pub platform_mobile: i64,
    pub platform_unknown: i64,
}

impl Aggregate for VisitorStats {
    fn dimension(&self) -> Dimension {
        Dimension::Page
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    fn day(&self) -> NaiveDate {
        self.day
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn key(&self) -> Vec<KeyValue> {
        Vec::new()
    }

    fn counters(&self) -> Vec<i64> {
        vec![
            self.visitors,
            self.platform_desktop,
            self.platform_mobile,
            self.platform_unknown,
        ]
    }
}

/// Visitors per hour of day (0-23).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorTimeStats {
    pub scope: TenantScope,
    pub day: NaiveDate,
    pub path: String,
    pub hour: u8,
    pub visitors: i64,
}

impl Aggregate for VisitorTimeStats {
    fn dimension(&self) -> Dimension {
        Dimension::Hour
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    fn day(&self) -> NaiveDate {
        self.day
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn key(&self) -> Vec<KeyValue> {
        vec![KeyValue::from(self.hour)]
    }

    fn counters(&self) -> Vec<i64> {
        vec![self.visitors]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageStats {
    pub scope: TenantScope,
    pub day: NaiveDate,
    pub path: String,
    pub language: String,
    pub visitors: i64,
}

impl Aggregate for LanguageStats {
    fn dimension(&self) -> Dimension {
        Dimension::Language
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    fn day(&self) -> NaiveDate {
        self.day
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn key(&self) -> Vec<KeyValue> {
        vec![KeyValue::from(self.language.as_str())]
    }

    fn counters(&self) -> Vec<i64> {
        vec![self.visitors]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerStats {
    pub scope: TenantScope,
    pub day: NaiveDate,
    pub path: String,
    pub referrer: String,
    pub visitors: i64,
}

impl Aggregate for ReferrerStats {
    fn dimension(&self) -> Dimension {
        Dimension::Referrer
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    fn day(&self) -> NaiveDate {
        self.day
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn key(&self) -> Vec<KeyValue> {
        vec![KeyValue::from(self.referrer.as_str())]
    }

    fn counters(&self) -> Vec<i64> {
        vec![self.visitors]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsStats {
    pub scope: TenantScope,
    pub day: NaiveDate,
    pub path: String,
    pub os: String,
    pub os_version: String,
    pub visitors: i64,
}

impl Aggregate for OsStats {
    fn dimension(&self) -> Dimension {
        Dimension::Os
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    fn day(&self) -> NaiveDate {
        self.day
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn key(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::from(self.os.as_str()),
            KeyValue::from(self.os_version.as_str()),
        ]
    }

    fn counters(&self) -> Vec<i64> {
        vec![self.visitors]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserStats {
    pub scope: TenantScope,
    pub day: NaiveDate,
    pub path: String,
    pub browser: String,
    pub browser_version: String,
    pub visitors: i64,
}

impl Aggregate for BrowserStats {
    fn dimension(&self) -> Dimension {
        Dimension::Browser
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    fn day(&self) -> NaiveDate {
        self.day
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn key(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::from(self.browser.as_str()),
            KeyValue::from(self.browser_version.as_str()),
        ]
    }

    fn counters(&self) -> Vec<i64> {
        vec![self.visitors]
    }
}

/// A stored aggregate row of any dimension, as read back from its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRow {
    pub dimension: Dimension,
    pub id: i64,
    /// Raw column value; [`AggregateRow::scope`] gives the typed view.
    pub tenant_id: Option<i64>,
    pub day: NaiveDate,
    pub path: String,
    pub key: Vec<KeyValue>,
    pub counters: Vec<i64>,
}

impl AggregateRow {
    /// Value of the named counter column, if this dimension has it.
    pub fn counter(&self, column: &str) -> Option<i64> {
        self.dimension
            .counter_columns()
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.counters.get(i).copied())
    }

    pub fn visitors(&self) -> i64 {
        self.counter("visitors").unwrap_or(0)
    }

    /// The stored tenant as a scope; a row without a tenant reads as `Global`.
    pub fn scope(&self) -> TenantScope {
        TenantScope::from(self.tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
    }

    #[test]
    fn every_dimension_has_its_own_table() {
        let mut tables: Vec<_> = Dimension::ALL.iter().map(|d| d.table()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), Dimension::ALL.len());
    }

    #[test]
    fn text_keys_fold_case_and_version_keys_do_not() {
        assert_eq!(
            Dimension::Language.key_columns()[0].matching,
            KeyMatch::IgnoreCase
        );
        assert_eq!(
            Dimension::Referrer.key_columns()[0].matching,
            KeyMatch::IgnoreCase
        );
        for dim in [Dimension::Hour, Dimension::Os, Dimension::Browser] {
            assert!(dim
                .key_columns()
                .iter()
                .all(|k| k.matching == KeyMatch::Exact));
        }
        assert!(Dimension::Page.key_columns().is_empty());
    }

    #[test]
    fn entity_values_line_up_with_descriptors() {
        let entities: Vec<Box<dyn Aggregate>> = vec![
            Box::new(VisitorStats {
                scope: TenantScope::Global,
                day: day(),
                path: "/".into(),
                visitors: 3,
                platform_desktop: 2,
                platform_mobile: 1,
                platform_unknown: 0,
            }),
            Box::new(VisitorTimeStats {
                scope: TenantScope::Global,
                day: day(),
                path: "/".into(),
                hour: 5,
                visitors: 1,
            }),
            Box::new(OsStats {
                scope: TenantScope::Tenant(1),
                day: day(),
                path: "/".into(),
                os: "Linux".into(),
                os_version: "6.1".into(),
                visitors: 1,
            }),
        ];
        for entity in &entities {
            let dim = entity.dimension();
            assert_eq!(entity.key().len(), dim.key_columns().len(), "{dim}");
            assert_eq!(entity.counters().len(), dim.counter_columns().len(), "{dim}");
        }
    }

    #[test]
    fn row_counter_lookup_by_column_name() {
        let row = AggregateRow {
            dimension: Dimension::Page,
            id: 1,
            tenant_id: None,
            day: day(),
            path: "/a".into(),
            key: Vec::new(),
            counters: vec![5, 2, 3, 0],
        };
        assert_eq!(row.visitors(), 5);
        assert_eq!(row.counter("platform_mobile"), Some(3));
        assert_eq!(row.counter("hour"), None);
        assert_eq!(row.scope(), TenantScope::Global);
    }

    #[test]
    fn row_scope_follows_stored_tenant() {
        let row = AggregateRow {
            dimension: Dimension::Language,
            id: 7,
            tenant_id: Some(3),
            day: day(),
            path: "/".into(),
            key: vec![KeyValue::from("en")],
            counters: vec![1],
        };
        assert_eq!(row.scope(), TenantScope::Tenant(3));
    }

    #[test]
    fn dimension_serializes_snake_case() {
        let json = serde_json::to_string(&Dimension::Os).expect("serialize");
        assert_eq!(json, "\"os\"");
    }
}
