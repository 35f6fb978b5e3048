//! Veto controller: the network-wide halt.
//!
//! A veto flips every registered agent to Halted. From then on every hop that
//! reaches an agent ends with `TargetHalted` and no agent state changes.
//! Safe to call from any thread at any time, including while chains are in
//! flight.

use crate::ledger::Directory;
use tracing::warn;

/// Halt the whole network.
pub fn issue_veto(directory: &Directory) {
    warn!("Nexus issuing veto to {} agents", directory.len());
    let halted = directory.broadcast_halt();
    if halted == 0 && !directory.is_empty() {
        warn!("Veto found every agent already halted");
    }
}
