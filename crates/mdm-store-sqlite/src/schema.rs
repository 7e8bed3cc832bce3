//! SQL schema for the MDM SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS records (
    record_key    TEXT PRIMARY KEY,
    class         TEXT NOT NULL,   -- 'local' | 'master'
    resource_type TEXT NOT NULL,
    source        TEXT,            -- owning source system; NULL for masters
    modified_at   TEXT NOT NULL,   -- RFC 3339 UTC, fixed precision
    fields        TEXT NOT NULL DEFAULT '{}'
);

-- Edges are never deleted; obsoletion stamps obsoleted_at.
-- Targets of external edges need not be records in this store.
CREATE TABLE IF NOT EXISTS edges (
    edge_id         TEXT PRIMARY KEY,
    source_key      TEXT NOT NULL,
    target_key      TEXT NOT NULL,
    edge_type       TEXT NOT NULL,
    role            TEXT,
    classification  TEXT NOT NULL,
    score           REAL,
    original_source TEXT,
    original_target TEXT,
    created_at      TEXT NOT NULL,
    obsoleted_at    TEXT,
    CHECK (source_key != target_key)
);

-- At most one active master link per local.
CREATE UNIQUE INDEX IF NOT EXISTS edges_one_master_link
    ON edges(source_key)
    WHERE edge_type = 'master_link' AND obsoleted_at IS NULL;

-- At most one active record of truth per master.
CREATE UNIQUE INDEX IF NOT EXISTS edges_one_record_of_truth
    ON edges(source_key)
    WHERE edge_type = 'record_of_truth' AND obsoleted_at IS NULL;

-- At most one active pending decision (candidate or ignored) per pair.
CREATE UNIQUE INDEX IF NOT EXISTS edges_one_pending_decision
    ON edges(source_key, target_key)
    WHERE edge_type IN ('candidate', 'ignored') AND obsoleted_at IS NULL;

CREATE INDEX IF NOT EXISTS edges_source_idx ON edges(source_key);
CREATE INDEX IF NOT EXISTS edges_target_idx ON edges(target_key);
CREATE INDEX IF NOT EXISTS records_type_idx ON records(resource_type, class);

PRAGMA user_version = 1;
";
