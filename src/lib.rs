//! Chrysalis: a pulse-propagation network of autonomous agents.
//!
//! Agents registered in a shared [`ledger::Directory`] exchange scalar
//! pulses. Each delivery updates the receiving agent's state and forwards a
//! derived pulse to a random peer until the hop budget runs out, no peer is
//! left, or a veto halts the network.

pub mod agent;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod ledger;
pub mod propagation;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod veto;

pub use agent::Agent;
pub use error::NetworkError;
pub use ledger::Directory;
pub use propagation::{inject_stimulus, spawn_injection};
pub use veto::issue_veto;
