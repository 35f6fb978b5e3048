//! Configuration schema for chrysalis.toml.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChrysalisConfig {
    /// Human-readable network name.
    pub name: String,

    /// Path to the SQLite ledger database.
    pub db_path: String,

    /// Path to heartbeat YAML config.
    pub heartbeat_config_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Hop budget for pulses injected without an explicit TTL.
    pub default_ttl: u32,

    /// Seed for recipient selection; unset draws from entropy.
    pub seed: Option<u64>,

    /// Mirror agent snapshots and chain outcomes into the ledger database.
    pub mirror_to_ledger: bool,

    /// Config version.
    pub version: u32,

    /// Agents registered when the network is built.
    pub agents: Vec<AgentSeed>,
}

/// An agent to register at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSeed {
    /// Agent id; empty means generate one.
    #[serde(default)]
    pub id: String,

    /// Starting state; unset means uniform random in [0, 1).
    #[serde(default)]
    pub initial_state: Option<f64>,
}

impl AgentSeed {
    pub fn named(id: &str) -> Self {
        Self {
            id: id.to_string(),
            initial_state: None,
        }
    }
}

impl Default for ChrysalisConfig {
    fn default() -> Self {
        Self {
            name: "chrysalis".into(),
            db_path: "~/.chrysalis/ledger.db".into(),
            heartbeat_config_path: "~/.chrysalis/heartbeat.yml".into(),
            log_level: "info".into(),
            default_ttl: 4,
            seed: None,
            mirror_to_ledger: true,
            version: 1,
            agents: vec![
                AgentSeed::named("alpha"),
                AgentSeed::named("beta"),
                AgentSeed::named("gamma"),
            ],
        }
    }
}

impl ChrysalisConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    /// Resolved heartbeat config path.
    pub fn resolved_heartbeat_path(&self) -> String {
        self.resolve_path(&self.heartbeat_config_path)
    }
}
