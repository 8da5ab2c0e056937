/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup (idempotent).
///
/// `memory_limit` comes from `StoreConfig::memory_limit` (env
/// `VISITSTAT_DUCKDB_MEMORY` for the worker, default `"1GB"`).
///
/// The aggregate tables have no unique constraint on their key tuple: path,
/// language and referrer are matched case-insensitively, and a NULL
/// tenant_id never collides in a UNIQUE index. At most one row per key is
/// kept by the merge engine, which runs every lookup-then-write inside a
/// transaction holding the connection.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- HIT (raw, append-only; purged per day after rollup)
-- ===========================================
CREATE SEQUENCE IF NOT EXISTS seq_hit START 1;
CREATE TABLE IF NOT EXISTS hit (
    id              BIGINT PRIMARY KEY DEFAULT nextval('seq_hit'), -- insertion order
    tenant_id       BIGINT,                        -- NULL when not multi-tenant
    fingerprint     VARCHAR NOT NULL CHECK (fingerprint <> ''),
    path            VARCHAR NOT NULL,              -- original casing
    url             VARCHAR NOT NULL,
    language        VARCHAR NOT NULL,
    user_agent      VARCHAR NOT NULL,
    "ref"           VARCHAR NOT NULL,
    os              VARCHAR NOT NULL,
    os_version      VARCHAR NOT NULL,
    browser         VARCHAR NOT NULL,
    browser_version VARCHAR NOT NULL,
    desktop         BOOLEAN NOT NULL,
    mobile          BOOLEAN NOT NULL,              -- desktop = mobile = false: unknown platform
    time            TIMESTAMP NOT NULL             -- UTC
);
-- Purge and listing queries: tenant + time window
CREATE INDEX IF NOT EXISTS idx_hit_tenant_time ON hit(tenant_id, time);

-- ===========================================
-- ROLLUP MARKS (hits of tenant_id on day with id <= last_hit_id are counted)
-- ===========================================
CREATE TABLE IF NOT EXISTS rollup_mark (
    tenant_id       BIGINT,
    day             DATE NOT NULL,
    last_hit_id     BIGINT NOT NULL,
    marked_at       TIMESTAMP NOT NULL DEFAULT current_timestamp
);
CREATE INDEX IF NOT EXISTS idx_rollup_mark_day ON rollup_mark(day, tenant_id);

-- ===========================================
-- AGGREGATES (one row per tenant/day/lower(path)/key)
-- ===========================================
CREATE SEQUENCE IF NOT EXISTS seq_visitor_stats START 1;
CREATE TABLE IF NOT EXISTS visitor_stats (
    id               BIGINT PRIMARY KEY DEFAULT nextval('seq_visitor_stats'),
    tenant_id        BIGINT,
    day              DATE NOT NULL,
    path             VARCHAR NOT NULL,
    visitors         BIGINT NOT NULL DEFAULT 0,
    platform_desktop BIGINT NOT NULL DEFAULT 0,
    platform_mobile  BIGINT NOT NULL DEFAULT 0,
    platform_unknown BIGINT NOT NULL DEFAULT 0
);

CREATE SEQUENCE IF NOT EXISTS seq_visitor_time_stats START 1;
CREATE TABLE IF NOT EXISTS visitor_time_stats (
    id              BIGINT PRIMARY KEY DEFAULT nextval('seq_visitor_time_stats'),
    tenant_id       BIGINT,
    day             DATE NOT NULL,
    path            VARCHAR NOT NULL,
    hour            INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
    visitors        BIGINT NOT NULL DEFAULT 0
);

CREATE SEQUENCE IF NOT EXISTS seq_language_stats START 1;
CREATE TABLE IF NOT EXISTS language_stats (
    id              BIGINT PRIMARY KEY DEFAULT nextval('seq_language_stats'),
    tenant_id       BIGINT,
    day             DATE NOT NULL,
    path            VARCHAR NOT NULL,
    language        VARCHAR NOT NULL,
    visitors        BIGINT NOT NULL DEFAULT 0
);

CREATE SEQUENCE IF NOT EXISTS seq_referrer_stats START 1;
CREATE TABLE IF NOT EXISTS referrer_stats (
    id              BIGINT PRIMARY KEY DEFAULT nextval('seq_referrer_stats'),
    tenant_id       BIGINT,
    day             DATE NOT NULL,
    path            VARCHAR NOT NULL,
    referrer        VARCHAR NOT NULL,
    visitors        BIGINT NOT NULL DEFAULT 0
);

CREATE SEQUENCE IF NOT EXISTS seq_os_stats START 1;
CREATE TABLE IF NOT EXISTS os_stats (
    id              BIGINT PRIMARY KEY DEFAULT nextval('seq_os_stats'),
    tenant_id       BIGINT,
    day             DATE NOT NULL,
    path            VARCHAR NOT NULL,
    os              VARCHAR NOT NULL,
    os_version      VARCHAR NOT NULL,
    visitors        BIGINT NOT NULL DEFAULT 0
);

CREATE SEQUENCE IF NOT EXISTS seq_browser_stats START 1;
CREATE TABLE IF NOT EXISTS browser_stats (
    id              BIGINT PRIMARY KEY DEFAULT nextval('seq_browser_stats'),
    tenant_id       BIGINT,
    day             DATE NOT NULL,
    path            VARCHAR NOT NULL,
    browser         VARCHAR NOT NULL,
    browser_version VARCHAR NOT NULL,
    visitors        BIGINT NOT NULL DEFAULT 0
);
"#
    )
}
