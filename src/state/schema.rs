//! Ledger database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the ledger database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Key-value store for runtime state
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Mirrored agent snapshots
CREATE TABLE IF NOT EXISTS agents (
    id          TEXT PRIMARY KEY,
    state       REAL NOT NULL,
    halted      INTEGER NOT NULL DEFAULT 0,
    status      TEXT NOT NULL DEFAULT 'born',
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    last_seen   TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Finished propagation chains
CREATE TABLE IF NOT EXISTS chains (
    id           TEXT PRIMARY KEY,
    last_target  TEXT NOT NULL,
    reason       TEXT NOT NULL,
    hops         INTEGER NOT NULL,
    deliveries   INTEGER NOT NULL,
    finished_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Veto broadcasts
CREATE TABLE IF NOT EXISTS vetoes (
    id            TEXT PRIMARY KEY,
    agents_halted INTEGER NOT NULL,
    registered    INTEGER NOT NULL,
    issued_at     TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Heartbeat execution log
CREATE TABLE IF NOT EXISTS heartbeat_entries (
    id          TEXT PRIMARY KEY,
    task_name   TEXT NOT NULL,
    result      TEXT,
    success     INTEGER NOT NULL DEFAULT 1,
    executed_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);
CREATE INDEX IF NOT EXISTS idx_chains_reason ON chains(reason);
CREATE INDEX IF NOT EXISTS idx_heartbeat_task ON heartbeat_entries(task_name);
"#;
