//! The hop loop.
//!
//! One pulse is driven from agent to agent as an explicit loop, so stack
//! depth is independent of the TTL. Each hop:
//!
//! 1. look up the target            → `UnknownTarget` if absent
//! 2. check the halt flag           → `TargetHalted`
//! 3. check the hop budget          → `TtlExpired` (ttl 0 is never applied)
//! 4. apply the stimulus
//! 5. resolve the next recipient    → `NoEligibleRecipient` if none
//! 6. forward a new pulse with ttl - 1
//!
//! The TTL drops by one per forwarded pulse, so a chain visits at most
//! `initial_ttl + 1` targets.

use crate::ledger::Directory;
use crate::telemetry::TelemetryEvent;
use crate::types::{AgentId, ChainId, Pulse, Termination, TerminationReason};
use tracing::trace;

/// Result of advancing a chain by one hop.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The pulse was processed and forwarded to `next`.
    Forwarded { next: AgentId },
    /// The chain is over.
    Terminated(Termination),
}

/// An in-flight propagation chain over a directory.
///
/// Holds no locks between steps; other chains and the veto may act on the
/// directory while this one is parked.
pub struct Propagation<'a> {
    directory: &'a Directory,
    chain: ChainId,
    target: AgentId,
    pulse: Pulse,
    hops: u32,
    deliveries: u32,
    finished: Option<Termination>,
}

impl<'a> Propagation<'a> {
    pub fn new(directory: &'a Directory, target: AgentId, pulse: Pulse) -> Self {
        Self {
            directory,
            chain: ChainId::generate(),
            target,
            pulse,
            hops: 0,
            deliveries: 0,
            finished: None,
        }
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Agent the pending pulse is addressed to.
    pub fn target(&self) -> &AgentId {
        &self.target
    }

    /// The pulse waiting to be delivered.
    pub fn pulse(&self) -> &Pulse {
        &self.pulse
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Advance by one hop. Once terminated, keeps returning the same result.
    pub fn step(&mut self) -> Step {
        if let Some(done) = &self.finished {
            return Step::Terminated(done.clone());
        }
        self.hops += 1;

        let Some(agent) = self.directory.get(&self.target) else {
            return self.terminate(TerminationReason::UnknownTarget);
        };
        if agent.is_halted() {
            return self.terminate(TerminationReason::TargetHalted);
        }
        if self.pulse.is_expired() {
            return self.terminate(TerminationReason::TtlExpired);
        }

        // The veto may land between the check above and the state lock; the
        // agent re-checks under the lock and refuses.
        let Some((state, response)) = agent.try_apply_stimulus(self.pulse.payload()) else {
            return self.terminate(TerminationReason::TargetHalted);
        };
        self.deliveries += 1;

        let telemetry = self.directory.telemetry();
        telemetry.record(TelemetryEvent::PulseDelivered {
            chain: self.chain,
            agent: self.target.clone(),
            pulse: self.pulse.clone(),
            state,
        });

        let Some(next) = self.directory.resolve_next(&self.target) else {
            return self.terminate(TerminationReason::NoEligibleRecipient);
        };
        let Some(pulse) = self.pulse.forward(self.target.clone(), response) else {
            // Unreachable: expired pulses stop before being applied.
            return self.terminate(TerminationReason::TtlExpired);
        };

        trace!(chain = %self.chain, from = %self.target, to = %next, ttl = pulse.ttl(), "forwarding");
        telemetry.record(TelemetryEvent::PulseEmitted {
            chain: self.chain,
            from: self.target.clone(),
            to: next.clone(),
            pulse: pulse.clone(),
        });

        self.target = next.clone();
        self.pulse = pulse;
        Step::Forwarded { next }
    }

    /// Step until the chain terminates.
    pub fn run(mut self) -> Termination {
        loop {
            if let Step::Terminated(done) = self.step() {
                return done;
            }
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> Step {
        let done = Termination {
            chain: self.chain,
            reason,
            last_target: self.target.clone(),
            hops: self.hops,
            deliveries: self.deliveries,
        };
        self.directory
            .telemetry()
            .record(TelemetryEvent::PropagationTerminated {
                chain: self.chain,
                at: self.target.clone(),
                reason,
                hops: self.hops,
                deliveries: self.deliveries,
            });
        self.finished = Some(done.clone());
        Step::Terminated(done)
    }
}

/// Drive `pulse` from `target` until the chain terminates.
pub fn propagate(directory: &Directory, target: AgentId, pulse: Pulse) -> Termination {
    Propagation::new(directory, target, pulse).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{ChannelSink, NullSink};
    use std::sync::Arc;

    fn network(ids: &[(&str, f64)]) -> Directory {
        let dir = Directory::with_seed(Arc::new(NullSink), 42);
        for (id, state) in ids {
            dir.spawn(Some((*id).into()), Some(*state)).unwrap();
        }
        dir
    }

    #[test]
    fn unknown_target_terminates_immediately() {
        let dir = network(&[("alpha", 0.5)]);
        let done = propagate(&dir, "nobody".into(), Pulse::external(0.5, 3));
        assert_eq!(done.reason, TerminationReason::UnknownTarget);
        assert_eq!(done.hops, 1);
        assert_eq!(done.deliveries, 0);
        assert_eq!(done.last_target.as_str(), "nobody");
    }

    #[test]
    fn single_agent_applies_once_then_has_no_recipient() {
        let dir = network(&[("solo", 0.5)]);
        let done = propagate(&dir, "solo".into(), Pulse::external(1.0, 10));
        assert_eq!(done.reason, TerminationReason::NoEligibleRecipient);
        assert_eq!(done.deliveries, 1);
        assert_eq!(dir.get(&"solo".into()).unwrap().state(), 0.9 * 0.5 + 0.1 * 1.0);
    }

    #[test]
    fn alpha_beta_scenario() {
        let dir = network(&[("alpha", 0.5), ("beta", 0.2)]);

        let mut chain = Propagation::new(&dir, "alpha".into(), Pulse::external(0.9, 1));
        assert_eq!(chain.step(), Step::Forwarded { next: "beta".into() });

        let alpha = dir.get(&"alpha".into()).unwrap().state();
        assert!((alpha - 0.54).abs() < 1e-12);
        assert_eq!(chain.pulse().ttl(), 0);
        assert_eq!(chain.pulse().sender().as_str(), "alpha");
        assert!((chain.pulse().payload() - 0.594).abs() < 1e-12);

        let Step::Terminated(done) = chain.step() else {
            panic!("chain should end at beta");
        };
        assert_eq!(done.reason, TerminationReason::TtlExpired);
        assert_eq!(done.last_target.as_str(), "beta");
        assert_eq!(done.hops, 2);
        assert_eq!(done.deliveries, 1);
        assert_eq!(dir.get(&"beta".into()).unwrap().state(), 0.2);
    }

    #[test]
    fn ttl_bounds_hop_count() {
        let dir = network(&[("a", 0.1), ("b", 0.2), ("c", 0.3), ("d", 0.4)]);
        for ttl in 0..25u32 {
            let done = propagate(&dir, "a".into(), Pulse::external(0.5, ttl));
            assert_eq!(done.reason, TerminationReason::TtlExpired);
            assert_eq!(done.hops, ttl + 1);
            assert_eq!(done.deliveries, ttl);
        }
    }

    #[test]
    fn long_chains_do_not_grow_the_stack() {
        let dir = network(&[("a", 0.1), ("b", 0.2)]);
        let done = propagate(&dir, "a".into(), Pulse::external(0.5, 200_000));
        assert_eq!(done.reason, TerminationReason::TtlExpired);
        assert_eq!(done.deliveries, 200_000);
    }

    #[test]
    fn halted_target_is_not_touched() {
        let dir = network(&[("alpha", 0.5), ("beta", 0.2)]);
        dir.get(&"alpha".into()).unwrap().halt();
        let done = propagate(&dir, "alpha".into(), Pulse::external(0.9, 5));
        assert_eq!(done.reason, TerminationReason::TargetHalted);
        assert_eq!(done.deliveries, 0);
        assert_eq!(dir.get(&"alpha".into()).unwrap().state(), 0.5);
    }

    #[test]
    fn veto_between_hops_stops_the_next_one() {
        let dir = network(&[("alpha", 0.5), ("beta", 0.2), ("gamma", 0.8)]);
        let mut chain = Propagation::new(&dir, "alpha".into(), Pulse::external(0.9, 5));

        let Step::Forwarded { next } = chain.step() else {
            panic!("first hop should forward");
        };
        let before = dir.snapshots();
        dir.broadcast_halt();

        let Step::Terminated(done) = chain.step() else {
            panic!("second hop should terminate");
        };
        assert_eq!(done.reason, TerminationReason::TargetHalted);
        assert_eq!(done.last_target, next);
        assert_eq!(done.deliveries, 1);

        let after = dir.snapshots();
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.state, a.state);
            assert!(a.halted);
        }
    }

    #[test]
    fn finished_chain_is_sticky() {
        let dir = network(&[("alpha", 0.5)]);
        let mut chain = Propagation::new(&dir, "alpha".into(), Pulse::external(0.9, 0));
        let first = chain.step();
        assert!(chain.is_finished());
        assert_eq!(chain.step(), first);
        assert_eq!(dir.get(&"alpha".into()).unwrap().state(), 0.5);
    }

    #[test]
    fn events_follow_the_chain() {
        let (sink, mut rx) = ChannelSink::channel();
        let dir = Directory::with_seed(Arc::new(sink), 3);
        dir.spawn(Some("alpha".into()), Some(0.5)).unwrap();
        dir.spawn(Some("beta".into()), Some(0.2)).unwrap();
        while rx.try_recv().is_ok() {}

        let done = propagate(&dir, "alpha".into(), Pulse::external(0.9, 1));

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            ["pulse_delivered", "pulse_emitted", "propagation_terminated"]
        );
        assert_eq!(done.reason, TerminationReason::TtlExpired);
    }
}
