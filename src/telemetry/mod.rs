//! Telemetry events emitted by the network core.
//!
//! The core reports what happens through a [`TelemetrySink`] instead of
//! printing. Sinks are called inline on the propagation path and must return
//! immediately; anything slow belongs behind a [`ChannelSink`].

pub mod sinks;

pub use sinks::{ChannelSink, FanoutSink, LogSink, NullSink};

use crate::types::{AgentId, ChainId, Pulse, TerminationReason};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Discrete events observable from outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    AgentRegistered {
        agent: AgentId,
        state: f64,
    },
    /// A pulse was processed by `agent`, moving its state to `state`.
    PulseDelivered {
        chain: ChainId,
        agent: AgentId,
        pulse: Pulse,
        state: f64,
    },
    PulseEmitted {
        chain: ChainId,
        from: AgentId,
        to: AgentId,
        pulse: Pulse,
    },
    PropagationTerminated {
        chain: ChainId,
        at: AgentId,
        reason: TerminationReason,
        hops: u32,
        deliveries: u32,
    },
    AgentHalted {
        agent: AgentId,
    },
    VetoBroadcast {
        agents_halted: usize,
        registered: usize,
    },
}

impl TelemetryEvent {
    /// Stable event name, used as the persisted event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentRegistered { .. } => "agent_registered",
            Self::PulseDelivered { .. } => "pulse_delivered",
            Self::PulseEmitted { .. } => "pulse_emitted",
            Self::PropagationTerminated { .. } => "propagation_terminated",
            Self::AgentHalted { .. } => "agent_halted",
            Self::VetoBroadcast { .. } => "veto_broadcast",
        }
    }
}

/// Observer of network events.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Shared handle to a sink.
pub type Telemetry = Arc<dyn TelemetrySink>;
