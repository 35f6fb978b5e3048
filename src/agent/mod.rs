//! A network agent: identity, scalar state, and the Active → Halted switch.
//!
//! The halt flag is an atomic read by the propagation engine before every
//! delivery. State updates are serialized per agent; `halt()` takes the same
//! lock while flipping the flag, so once it returns no further transition can
//! land on this agent.

pub mod rule;

use crate::error::NetworkError;
use crate::types::{AgentId, AgentSnapshot, AgentStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A single pulse-processing agent.
#[derive(Debug)]
pub struct Agent {
    id: AgentId,
    state: Mutex<f64>,
    halted: AtomicBool,
}

impl Agent {
    /// Create an active agent. The initial state must be finite.
    pub fn new(id: AgentId, initial_state: f64) -> Result<Self, NetworkError> {
        if !initial_state.is_finite() {
            return Err(NetworkError::invalid(format!(
                "initial state for agent '{}' must be finite, got {}",
                id, initial_state
            )));
        }
        Ok(Self {
            id,
            state: Mutex::new(initial_state),
            halted: AtomicBool::new(false),
        })
    }

    /// Create an agent with a uniformly random state in `[0, 1)`.
    pub fn with_random_state(id: AgentId) -> Self {
        Self {
            id,
            state: Mutex::new(rand::random::<f64>()),
            halted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Current internal state.
    pub fn state(&self) -> f64 {
        *self.lock_state()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> AgentStatus {
        if self.is_halted() {
            AgentStatus::Halted
        } else {
            AgentStatus::Active
        }
    }

    /// Process a stimulus and return the response payload.
    ///
    /// On a halted agent this is a no-op that answers with the response
    /// derived from the current, unchanged state.
    pub fn apply_stimulus(&self, payload: f64) -> f64 {
        let mut state = self.lock_state();
        if self.is_halted() {
            return rule::response(*state);
        }
        let (next, response) = rule::transition(*state, payload);
        *state = next;
        response
    }

    /// Like [`apply_stimulus`](Self::apply_stimulus), but reports `None`
    /// instead of answering when the agent is halted.
    ///
    /// Returns `(new_state, response)` as written under the state lock.
    pub fn try_apply_stimulus(&self, payload: f64) -> Option<(f64, f64)> {
        let mut state = self.lock_state();
        if self.is_halted() {
            return None;
        }
        let (next, response) = rule::transition(*state, payload);
        *state = next;
        Some((next, response))
    }

    /// Halt the agent. Returns `true` only for the call that performed the
    /// Active → Halted transition.
    pub fn halt(&self) -> bool {
        let _state = self.lock_state();
        !self.halted.swap(true, Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let state = self.lock_state();
        AgentSnapshot {
            id: self.id.clone(),
            state: *state,
            halted: self.is_halted(),
        }
    }

    // A panic while holding the lock cannot leave the f64 half-written.
    fn lock_state(&self) -> MutexGuard<'_, f64> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn agent(id: &str, state: f64) -> Agent {
        Agent::new(AgentId::new(id), state).unwrap()
    }

    #[test]
    fn stimulus_updates_state_and_returns_response() {
        let a = agent("alpha", 0.5);
        let response = a.apply_stimulus(0.9);
        assert_eq!(a.state(), 0.9 * 0.5 + 0.1 * 0.9);
        assert_eq!(response, 1.1 * (0.9 * 0.5 + 0.1 * 0.9));
    }

    #[test]
    fn halted_agent_ignores_stimulus() {
        let a = agent("alpha", 0.5);
        assert!(a.halt());
        let response = a.apply_stimulus(0.9);
        assert_eq!(a.state(), 0.5);
        assert_eq!(response, 0.5 * 1.1);
        assert_eq!(a.try_apply_stimulus(0.9), None);
        assert_eq!(a.state(), 0.5);
    }

    #[test]
    fn try_apply_reports_the_state_it_wrote() {
        let a = agent("alpha", 0.5);
        let (next, response) = a.try_apply_stimulus(0.9).unwrap();
        assert_eq!(next, rule::next_state(0.5, 0.9));
        assert_eq!(response, rule::response(next));
        assert_eq!(a.state(), next);
    }

    #[test]
    fn halt_is_idempotent() {
        let a = agent("alpha", 0.5);
        assert_eq!(a.status(), AgentStatus::Active);
        assert!(a.halt());
        assert!(!a.halt());
        assert!(a.is_halted());
        assert_eq!(a.status(), AgentStatus::Halted);
    }

    #[test]
    fn non_finite_initial_state_is_rejected() {
        assert!(matches!(
            Agent::new(AgentId::new("x"), f64::NAN),
            Err(NetworkError::InvalidArgument(_))
        ));
        assert!(Agent::new(AgentId::new("x"), f64::INFINITY).is_err());
    }

    #[test]
    fn random_state_is_in_unit_interval() {
        for _ in 0..32 {
            let a = Agent::with_random_state(AgentId::generate());
            let s = a.state();
            assert!((0.0..1.0).contains(&s));
        }
    }

    #[test]
    fn concurrent_stimuli_are_serialized() {
        // Every call applies the same update, so any interleaving must land
        // on the sequential result; a lost update would fall short of it.
        let a = Arc::new(agent("alpha", 0.0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let a = a.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        a.apply_stimulus(1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let expected = (0..40).fold(0.0, |s, _| rule::next_state(s, 1.0));
        assert_eq!(a.state(), expected);
    }

    #[test]
    fn snapshot_reflects_fields() {
        let a = agent("beta", 0.2);
        a.halt();
        let snap = a.snapshot();
        assert_eq!(snap.id.as_str(), "beta");
        assert_eq!(snap.state, 0.2);
        assert!(snap.halted);
    }
}
