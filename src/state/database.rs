//! SQLite ledger database with WAL mode and migration support.

use crate::state::schema;
use crate::types::{AgentSnapshot, Termination};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

/// Lifecycle label stored alongside a mirrored agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    /// Registered, not yet stimulated.
    Born,
    /// Has processed at least one pulse.
    Running,
    /// Vetoed.
    Halted,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Born => "born",
            Self::Running => "running",
            Self::Halted => "halted",
        }
    }
}

/// An agent row as stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub id: String,
    pub state: f64,
    pub halted: bool,
    pub status: String,
    pub last_seen: String,
}

/// A finished chain row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainRecord {
    pub id: String,
    pub last_target: String,
    pub reason: String,
    pub hops: u32,
    pub deliveries: u32,
}

/// The ledger database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating ledger schema v{}", schema::SCHEMA_VERSION);
            self.conn
                .execute_batch(schema::CREATE_SCHEMA)
                .context("Failed to create schema")?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version > schema::SCHEMA_VERSION {
            anyhow::bail!(
                "Ledger schema v{} is newer than supported v{}",
                version,
                schema::SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    /// Get a value from the KV store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get(0)).ok();
        Ok(result)
    }

    /// Set a value in the KV store (upsert).
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Insert or refresh an agent row.
    ///
    /// A halted row never goes back to another status.
    pub fn upsert_agent(
        &self,
        snapshot: &AgentSnapshot,
        status: LedgerStatus,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let status = if snapshot.halted {
            LedgerStatus::Halted
        } else {
            status
        };
        let seen_at = seen_at.to_rfc3339();
        self.conn.execute(
            "INSERT INTO agents (id, state, halted, status, created_at, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                state = ?2,
                halted = MAX(halted, ?3),
                status = CASE WHEN halted = 1 THEN 'halted' ELSE ?4 END,
                last_seen = ?5",
            params![
                snapshot.id.as_str(),
                snapshot.state,
                snapshot.halted as i32,
                status.as_str(),
                seen_at,
            ],
        )?;
        Ok(())
    }

    /// Get one agent row.
    pub fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, state, halted, status, last_seen FROM agents WHERE id = ?1",
        )?;
        let result = stmt
            .query_row(params![id], |row| {
                Ok(AgentRecord {
                    id: row.get(0)?,
                    state: row.get(1)?,
                    halted: row.get::<_, i32>(2)? != 0,
                    status: row.get(3)?,
                    last_seen: row.get(4)?,
                })
            })
            .ok();
        Ok(result)
    }

    /// List all agent rows, ordered by id.
    pub fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, state, halted, status, last_seen FROM agents ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AgentRecord {
                id: row.get(0)?,
                state: row.get(1)?,
                halted: row.get::<_, i32>(2)? != 0,
                status: row.get(3)?,
                last_seen: row.get(4)?,
            })
        })?;

        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    // -----------------------------------------------------------------------
    // Chains
    // -----------------------------------------------------------------------

    /// Record a finished propagation chain.
    pub fn record_chain(&self, done: &Termination) -> Result<()> {
        self.conn.execute(
            "INSERT INTO chains (id, last_target, reason, hops, deliveries, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                done.chain.to_string(),
                done.last_target.as_str(),
                done.reason.to_string(),
                done.hops,
                done.deliveries,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent chains first.
    pub fn recent_chains(&self, limit: u32) -> Result<Vec<ChainRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, last_target, reason, hops, deliveries FROM chains
             ORDER BY finished_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(ChainRecord {
                id: row.get(0)?,
                last_target: row.get(1)?,
                reason: row.get(2)?,
                hops: row.get(3)?,
                deliveries: row.get(4)?,
            })
        })?;

        let mut chains = Vec::new();
        for row in rows {
            chains.push(row?);
        }
        Ok(chains)
    }

    /// Get the total number of recorded chains.
    pub fn chain_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chains", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Vetoes
    // -----------------------------------------------------------------------

    /// Record a veto broadcast.
    pub fn record_veto(&self, agents_halted: usize, registered: usize) -> Result<()> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO vetoes (id, agents_halted, registered, issued_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                agents_halted as i64,
                registered as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Count recorded vetoes.
    pub fn veto_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vetoes", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    /// Log a heartbeat task execution.
    pub fn log_heartbeat(&self, task_name: &str, result: &str, success: bool) -> Result<()> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO heartbeat_entries (id, task_name, result, success)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, task_name, result, success as i32],
        )?;
        Ok(())
    }

    /// Count heartbeat executions of a task.
    pub fn heartbeat_count(&self, task_name: &str) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM heartbeat_entries WHERE task_name = ?1",
            params![task_name],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, ChainId, TerminationReason};

    fn snap(id: &str, state: f64, halted: bool) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId::new(id),
            state,
            halted,
        }
    }

    #[test]
    fn kv_roundtrip() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.kv_get("missing").unwrap(), None);
        db.kv_set("last_heartbeat", "now").unwrap();
        db.kv_set("last_heartbeat", "later").unwrap();
        assert_eq!(db.kv_get("last_heartbeat").unwrap().as_deref(), Some("later"));
    }

    #[test]
    fn agent_rows_follow_lifecycle() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.upsert_agent(&snap("alpha", 0.5, false), LedgerStatus::Born, now)
            .unwrap();
        assert_eq!(db.get_agent("alpha").unwrap().unwrap().status, "born");

        db.upsert_agent(&snap("alpha", 0.54, false), LedgerStatus::Running, now)
            .unwrap();
        let row = db.get_agent("alpha").unwrap().unwrap();
        assert_eq!(row.status, "running");
        assert_eq!(row.state, 0.54);

        db.upsert_agent(&snap("alpha", 0.54, true), LedgerStatus::Running, now)
            .unwrap();
        // a stale, pre-veto snapshot must not revive the row
        db.upsert_agent(&snap("alpha", 0.54, false), LedgerStatus::Running, now)
            .unwrap();
        let row = db.get_agent("alpha").unwrap().unwrap();
        assert!(row.halted);
        assert_eq!(row.status, "halted");
    }

    #[test]
    fn list_agents_is_sorted() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        for id in ["gamma", "alpha", "beta"] {
            db.upsert_agent(&snap(id, 0.0, false), LedgerStatus::Born, now)
                .unwrap();
        }
        let ids: Vec<String> = db.list_agents().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn chains_and_vetoes_are_counted() {
        let db = Database::open_memory().unwrap();
        let done = Termination {
            chain: ChainId::generate(),
            reason: TerminationReason::TtlExpired,
            last_target: AgentId::new("beta"),
            hops: 2,
            deliveries: 1,
        };
        db.record_chain(&done).unwrap();
        assert_eq!(db.chain_count().unwrap(), 1);
        let recent = db.recent_chains(5).unwrap();
        assert_eq!(recent[0].reason, "ttl_expired");
        assert_eq!(recent[0].deliveries, 1);

        db.record_veto(3, 3).unwrap();
        assert_eq!(db.veto_count().unwrap(), 1);
    }

    #[test]
    fn heartbeat_log() {
        let db = Database::open_memory().unwrap();
        db.log_heartbeat("heartbeat_ping", "pong", true).unwrap();
        db.log_heartbeat("heartbeat_ping", "pong", true).unwrap();
        assert_eq!(db.heartbeat_count("heartbeat_ping").unwrap(), 2);
        assert_eq!(db.heartbeat_count("stimulate").unwrap(), 0);
    }

    #[test]
    fn reopening_keeps_schema() {
        let dir = std::env::temp_dir().join(format!("chrysalis-db-{}", ulid::Ulid::new()));
        let path = dir.join("ledger.db");
        {
            let db = Database::open(&path).unwrap();
            db.kv_set("k", "v").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v"));
        drop(db);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
