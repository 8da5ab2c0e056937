use chrono::NaiveDate;

use visitstat_core::config::StoreConfig;
use visitstat_core::{
    BrowserStats, Dimension, KeyValue, LanguageStats, OsStats, ReferrerStats, StoreError,
    TenantScope, VisitorStats, VisitorTimeStats,
};
use visitstat_duckdb::merge::MergeOutcome;
use visitstat_duckdb::DuckDbBackend;

fn db() -> DuckDbBackend {
    DuckDbBackend::open_in_memory(&StoreConfig::default()).expect("db")
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("date")
}

fn page(scope: TenantScope, path: &str, counts: [i64; 4]) -> VisitorStats {
    VisitorStats {
        scope,
        day: day(1),
        path: path.to_string(),
        visitors: counts[0],
        platform_desktop: counts[1],
        platform_mobile: counts[2],
        platform_unknown: counts[3],
    }
}

fn language(scope: TenantScope, path: &str, lang: &str, visitors: i64) -> LanguageStats {
    LanguageStats {
        scope,
        day: day(1),
        path: path.to_string(),
        language: lang.to_string(),
        visitors,
    }
}

#[tokio::test]
async fn page_merge_creates_then_accumulates() {
    let db = db();

    let first = db
        .merge(None, &page(TenantScope::Global, "/a", [3, 2, 1, 0]))
        .await
        .expect("first merge");
    assert_eq!(first, MergeOutcome::Inserted);

    let rows = db
        .list_aggregates(None, Dimension::Page, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].counters, vec![3, 2, 1, 0]);
    assert_eq!(rows[0].day, day(1));
    assert_eq!(rows[0].tenant_id, None);

    let second = db
        .merge(None, &page(TenantScope::Global, "/a", [2, 0, 2, 0]))
        .await
        .expect("second merge");
    assert_eq!(second, MergeOutcome::Updated { id: rows[0].id });

    let rows = db
        .list_aggregates(None, Dimension::Page, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].counters, vec![5, 2, 3, 0]);
}

#[tokio::test]
async fn distinct_hours_produce_distinct_rows() {
    let db = db();
    for hour in [5u8, 17] {
        db.merge(
            None,
            &VisitorTimeStats {
                scope: TenantScope::Global,
                day: day(1),
                path: "/".to_string(),
                hour,
                visitors: 1,
            },
        )
        .await
        .expect("merge");
    }

    let rows = db
        .list_aggregates(None, Dimension::Hour, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 2);
    let hours: Vec<_> = rows.iter().map(|r| r.key[0].clone()).collect();
    assert!(hours.contains(&KeyValue::Integer(5)));
    assert!(hours.contains(&KeyValue::Integer(17)));
}

#[tokio::test]
async fn path_and_text_keys_fold_case() {
    let db = db();
    db.merge(None, &page(TenantScope::Global, "/Home", [1, 1, 0, 0]))
        .await
        .expect("merge");
    db.merge(None, &page(TenantScope::Global, "/home", [1, 0, 1, 0]))
        .await
        .expect("merge");
    db.merge(None, &language(TenantScope::Global, "/Home", "EN-us", 2))
        .await
        .expect("merge");
    db.merge(None, &language(TenantScope::Global, "/HOME", "en-US", 3))
        .await
        .expect("merge");
    for referrer in ["https://Example.com", "https://example.COM"] {
        db.merge(
            None,
            &ReferrerStats {
                scope: TenantScope::Global,
                day: day(1),
                path: "/home".to_string(),
                referrer: referrer.to_string(),
                visitors: 1,
            },
        )
        .await
        .expect("merge");
    }

    let pages = db
        .list_aggregates(None, Dimension::Page, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].path, "/Home", "first casing is kept");
    assert_eq!(pages[0].counters, vec![2, 1, 1, 0]);

    let languages = db
        .list_aggregates(None, Dimension::Language, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(languages.len(), 1);
    assert_eq!(languages[0].visitors(), 5);

    let referrers = db
        .list_aggregates(None, Dimension::Referrer, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(referrers.len(), 1);
    assert_eq!(referrers[0].visitors(), 2);
}

#[tokio::test]
async fn os_and_browser_keys_match_exactly() {
    let db = db();
    for os in ["Windows", "windows"] {
        db.merge(
            None,
            &OsStats {
                scope: TenantScope::Global,
                day: day(1),
                path: "/".to_string(),
                os: os.to_string(),
                os_version: "10".to_string(),
                visitors: 1,
            },
        )
        .await
        .expect("merge");
    }
    for version in ["120", "121", "120"] {
        db.merge(
            None,
            &BrowserStats {
                scope: TenantScope::Global,
                day: day(1),
                path: "/".to_string(),
                browser: "Firefox".to_string(),
                browser_version: version.to_string(),
                visitors: 1,
            },
        )
        .await
        .expect("merge");
    }

    let os_rows = db
        .list_aggregates(None, Dimension::Os, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(os_rows.len(), 2);

    let browser_rows = db
        .list_aggregates(None, Dimension::Browser, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(browser_rows.len(), 2);
    let v120 = browser_rows
        .iter()
        .find(|r| r.key[1] == KeyValue::Text("120".into()))
        .expect("120 row");
    assert_eq!(v120.visitors(), 2);
}

#[tokio::test]
async fn days_are_part_of_the_key() {
    let db = db();
    let mut update = language(TenantScope::Global, "/", "de", 1);
    db.merge(None, &update).await.expect("merge");
    update.day = day(2);
    db.merge(None, &update).await.expect("merge");

    let rows = db
        .list_aggregates(None, Dimension::Language, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].day, day(1));
    assert_eq!(rows[1].day, day(2));
}

#[tokio::test]
async fn tenants_get_independent_rows() {
    let db = db();
    db.merge(None, &page(TenantScope::Tenant(1), "/a", [1, 1, 0, 0]))
        .await
        .expect("merge");
    db.merge(None, &page(TenantScope::Tenant(2), "/a", [4, 0, 4, 0]))
        .await
        .expect("merge");

    let all = db
        .list_aggregates(None, Dimension::Page, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(all.len(), 2);

    let tenant_1 = db
        .list_aggregates(None, Dimension::Page, TenantScope::Tenant(1))
        .await
        .expect("rows");
    assert_eq!(tenant_1.len(), 1);
    assert_eq!(tenant_1[0].tenant_id, Some(1));
    assert_eq!(tenant_1[0].counters, vec![1, 1, 0, 0]);

    let tenant_2 = db
        .list_aggregates(None, Dimension::Page, TenantScope::Tenant(2))
        .await
        .expect("rows");
    assert_eq!(tenant_2[0].counters, vec![4, 0, 4, 0]);
}

#[tokio::test]
async fn global_scope_matches_rows_of_any_tenant() {
    let db = db();
    db.merge(None, &language(TenantScope::Tenant(7), "/", "fr", 2))
        .await
        .expect("merge");
    db.merge(None, &language(TenantScope::Global, "/", "FR", 3))
        .await
        .expect("merge");

    let rows = db
        .list_aggregates(None, Dimension::Language, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tenant_id, Some(7));
    assert_eq!(rows[0].visitors(), 5);
}

#[tokio::test]
async fn exact_merge_keeps_tenant_less_rows_apart() {
    let db = db();
    db.merge_exact(None, &page(TenantScope::Tenant(5), "/", [1, 1, 0, 0]))
        .await
        .expect("merge");
    let outcome = db
        .merge_exact(None, &page(TenantScope::Global, "/", [2, 2, 0, 0]))
        .await
        .expect("merge");
    assert_eq!(outcome, MergeOutcome::Inserted);

    let again = db
        .merge_exact(None, &page(TenantScope::Global, "/", [1, 0, 1, 0]))
        .await
        .expect("merge");
    assert!(matches!(again, MergeOutcome::Updated { .. }));

    let tenant = db
        .list_aggregates(None, Dimension::Page, TenantScope::Tenant(5))
        .await
        .expect("rows");
    assert_eq!(tenant.len(), 1);
    assert_eq!(tenant[0].counters, vec![1, 1, 0, 0]);

    let all = db
        .list_aggregates(None, Dimension::Page, TenantScope::Global)
        .await
        .expect("rows");
    let tenant_less: Vec<_> = all.iter().filter(|r| r.tenant_id.is_none()).collect();
    assert_eq!(tenant_less.len(), 1);
    assert_eq!(tenant_less[0].counters, vec![3, 2, 1, 0]);
}

#[tokio::test]
async fn tenant_zero_is_not_global() {
    let db = db();
    db.merge(None, &language(TenantScope::Tenant(0), "/", "en", 1))
        .await
        .expect("merge");
    db.merge(None, &language(TenantScope::Tenant(1), "/", "en", 1))
        .await
        .expect("merge");

    let zero = db
        .list_aggregates(None, Dimension::Language, TenantScope::Tenant(0))
        .await
        .expect("rows");
    assert_eq!(zero.len(), 1);
    assert_eq!(zero[0].tenant_id, Some(0));
}

#[tokio::test]
async fn shared_transaction_accumulates_like_separate_ones() {
    let separate = db();
    let shared = db();
    let deltas = [[1, 1, 0, 0], [2, 0, 2, 0], [4, 1, 1, 2]];

    for delta in deltas {
        separate
            .merge(None, &page(TenantScope::Global, "/x", delta))
            .await
            .expect("merge");
    }

    let mut tx = shared.begin().await.expect("begin");
    for delta in deltas {
        shared
            .merge(Some(&mut tx), &page(TenantScope::Global, "/X", delta))
            .await
            .expect("merge");
    }
    shared.commit(tx).await;

    let a = separate
        .list_aggregates(None, Dimension::Page, TenantScope::Global)
        .await
        .expect("rows");
    let b = shared
        .list_aggregates(None, Dimension::Page, TenantScope::Global)
        .await
        .expect("rows");
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].counters, vec![7, 2, 3, 2]);
    assert_eq!(a[0].counters, b[0].counters);
}

#[tokio::test]
async fn rolled_back_merges_leave_no_rows() {
    let db = db();
    let mut tx = db.begin().await.expect("begin");
    db.merge(Some(&mut tx), &language(TenantScope::Global, "/", "en", 1))
        .await
        .expect("merge");
    db.rollback(tx).await;

    let rows = db
        .list_aggregates(None, Dimension::Language, TenantScope::Global)
        .await
        .expect("rows");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn negative_delta_is_rejected_and_nothing_is_written() {
    let db = db();
    let err = db
        .merge(None, &language(TenantScope::Global, "/", "en", -2))
        .await
        .expect_err("negative delta");
    assert!(matches!(err, StoreError::InvalidDelta { .. }));

    let rows = db
        .list_aggregates(None, Dimension::Language, TenantScope::Global)
        .await
        .expect("rows");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn hour_check_constraint_backs_the_schema() {
    let db = db();
    let err = db
        .merge(
            None,
            &VisitorTimeStats {
                scope: TenantScope::Global,
                day: day(1),
                path: "/".to_string(),
                hour: 24,
                visitors: 1,
            },
        )
        .await
        .expect_err("hour 24");
    assert!(matches!(err, StoreError::Database(_)));
}
