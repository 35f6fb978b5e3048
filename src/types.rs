//! Shared types used across the chrysalis network.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender id stamped on pulses injected from outside the network.
pub const EXTERNAL_SENDER: &str = "EXTERNAL";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque, immutable agent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh time-ordered id for agents registered without an explicit one.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// The id used as sender for externally injected pulses.
    pub fn external() -> Self {
        Self(EXTERNAL_SENDER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one injected propagation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(ulid::Ulid);

impl ChainId {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Pulse
// ---------------------------------------------------------------------------

/// An immutable message travelling between agents.
///
/// A new pulse is built for every hop; `ttl` is the remaining hop budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    sender: AgentId,
    payload: f64,
    ttl: u32,
}

impl Pulse {
    pub fn new(sender: AgentId, payload: f64, ttl: u32) -> Self {
        Self {
            sender,
            payload,
            ttl,
        }
    }

    /// Pulse entering the network from outside.
    pub fn external(payload: f64, ttl: u32) -> Self {
        Self::new(AgentId::external(), payload, ttl)
    }

    pub fn sender(&self) -> &AgentId {
        &self.sender
    }

    pub fn payload(&self) -> f64 {
        self.payload
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn is_expired(&self) -> bool {
        self.ttl == 0
    }

    /// Build the pulse forwarded by `sender` after processing this one.
    ///
    /// Returns `None` for an expired pulse, which must never be forwarded.
    pub fn forward(&self, sender: AgentId, payload: f64) -> Option<Self> {
        self.ttl.checked_sub(1).map(|ttl| Self::new(sender, payload, ttl))
    }
}

// ---------------------------------------------------------------------------
// Agent lifecycle
// ---------------------------------------------------------------------------

/// The two-state agent lifecycle. Active → Halted is irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Halted,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// Read-only view of an agent handed to persistence and status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub state: f64,
    pub halted: bool,
}

impl AgentSnapshot {
    pub fn status(&self) -> AgentStatus {
        if self.halted {
            AgentStatus::Halted
        } else {
            AgentStatus::Active
        }
    }
}

// ---------------------------------------------------------------------------
// Propagation outcome
// ---------------------------------------------------------------------------

/// Why a propagation chain stopped. These are outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The addressed agent is not registered.
    UnknownTarget,
    /// The addressed agent has been vetoed.
    TargetHalted,
    /// The pulse arrived with no hop budget left.
    TtlExpired,
    /// Nobody other than the current agent is registered.
    NoEligibleRecipient,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTarget => write!(f, "unknown_target"),
            Self::TargetHalted => write!(f, "target_halted"),
            Self::TtlExpired => write!(f, "ttl_expired"),
            Self::NoEligibleRecipient => write!(f, "no_eligible_recipient"),
        }
    }
}

/// Summary of a finished propagation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Termination {
    pub chain: ChainId,
    pub reason: TerminationReason,
    /// Agent the final pulse was addressed to.
    pub last_target: AgentId,
    /// Number of pulses that reached a target (including the terminating one).
    pub hops: u32,
    /// Number of state transitions performed along the chain.
    pub deliveries: u32,
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

/// A heartbeat task entry from the YAML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEntry {
    pub name: String,
    pub schedule: String,
    pub task: String,
    pub enabled: bool,
    #[serde(default)]
    pub params: serde_json::Value,
}
