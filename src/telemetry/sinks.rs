//! Built-in telemetry sinks.

use super::{Telemetry, TelemetryEvent, TelemetrySink};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Renders events as structured `tracing` lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::AgentRegistered { agent, state } => {
                info!(%agent, state = format_args!("{:.4}", state), "Agent registered");
            }
            TelemetryEvent::PulseDelivered {
                chain,
                agent,
                pulse,
                state,
            } => {
                info!(
                    %chain,
                    "[->] Pulse received by {} from {}. Payload: {:.4} [TTL={}] -> state {:.4}",
                    agent,
                    pulse.sender(),
                    pulse.payload(),
                    pulse.ttl(),
                    state,
                );
            }
            TelemetryEvent::PulseEmitted {
                chain,
                from,
                to,
                pulse,
            } => {
                info!(
                    %chain,
                    "[<-] Pulse emitted by {} to {}. Payload: {:.4} [New TTL={}]",
                    from,
                    to,
                    pulse.payload(),
                    pulse.ttl(),
                );
            }
            TelemetryEvent::PropagationTerminated {
                chain,
                at,
                reason,
                hops,
                deliveries,
            } => {
                info!(%chain, %at, %reason, hops, deliveries, "Propagation terminated");
            }
            TelemetryEvent::AgentHalted { agent } => {
                warn!(%agent, "Veto received, agent halted");
            }
            TelemetryEvent::VetoBroadcast {
                agents_halted,
                registered,
            } => {
                warn!(agents_halted, registered, "Nexus veto broadcast");
            }
        }
    }
}

/// Forwards events to an unbounded channel; sending never blocks.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl ChannelSink {
    /// Create a sink together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn record(&self, event: TelemetryEvent) {
        if self.tx.send(event).is_err() {
            debug!("Telemetry receiver dropped; event discarded");
        }
    }
}

/// Sends every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Telemetry>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Telemetry>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Telemetry) {
        self.sinks.push(sink);
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, event: TelemetryEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}
