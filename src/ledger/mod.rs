//! The synaptic ledger: agent directory and network construction.

pub mod directory;

pub use directory::Directory;

use crate::config::ChrysalisConfig;
use crate::error::NetworkError;
use crate::telemetry::Telemetry;
use crate::types::AgentId;
use tracing::info;

/// Build a directory populated with the agents listed in `config`.
///
/// Agents without an explicit initial state start from a random one.
pub fn build_network(config: &ChrysalisConfig, telemetry: Telemetry) -> Result<Directory, NetworkError> {
    let directory = match config.seed {
        Some(seed) => Directory::with_seed(telemetry, seed),
        None => Directory::new(telemetry),
    };

    for seed in &config.agents {
        let id = if seed.id.is_empty() {
            AgentId::generate()
        } else {
            AgentId::new(seed.id.as_str())
        };
        directory.spawn(Some(id), seed.initial_state)?;
    }

    info!(
        "Network '{}' ready with {} agents",
        config.name,
        directory.len()
    );
    Ok(directory)
}
