//! Pulse propagation: injection entry points and the hop loop.

pub mod engine;

pub use engine::{propagate, Propagation, Step};

use crate::error::NetworkError;
use crate::ledger::Directory;
use crate::types::{AgentId, Pulse, Termination};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Check injection arguments and build the initial pulse.
fn initial_pulse(payload: f64, initial_ttl: i64) -> Result<Pulse, NetworkError> {
    if !payload.is_finite() {
        return Err(NetworkError::invalid(format!(
            "payload must be finite, got {}",
            payload
        )));
    }
    if initial_ttl < 0 {
        return Err(NetworkError::invalid(format!(
            "initial TTL must be non-negative, got {}",
            initial_ttl
        )));
    }
    let ttl = u32::try_from(initial_ttl).map_err(|_| {
        NetworkError::invalid(format!("initial TTL {} exceeds {}", initial_ttl, u32::MAX))
    })?;
    Ok(Pulse::external(payload, ttl))
}

/// Start a propagation chain at `target` and run it to termination.
///
/// Malformed input is rejected before any agent is touched.
pub fn inject_stimulus(
    directory: &Directory,
    target: &AgentId,
    payload: f64,
    initial_ttl: i64,
) -> Result<Termination, NetworkError> {
    let pulse = initial_pulse(payload, initial_ttl)?;
    Ok(propagate(directory, target.clone(), pulse))
}

/// Run a propagation chain on the blocking pool.
///
/// Arguments are validated before spawning, so the returned handle always
/// resolves to a termination. Chains spawned this way run concurrently over
/// the same directory.
pub fn spawn_injection(
    directory: Arc<Directory>,
    target: AgentId,
    payload: f64,
    initial_ttl: i64,
) -> Result<JoinHandle<Termination>, NetworkError> {
    let pulse = initial_pulse(payload, initial_ttl)?;
    Ok(tokio::task::spawn_blocking(move || {
        propagate(&directory, target, pulse)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullSink;
    use crate::types::TerminationReason;

    fn network() -> Directory {
        let dir = Directory::with_seed(Arc::new(NullSink), 1);
        dir.spawn(Some("alpha".into()), Some(0.5)).unwrap();
        dir.spawn(Some("beta".into()), Some(0.2)).unwrap();
        dir
    }

    #[test]
    fn negative_ttl_is_rejected() {
        let dir = network();
        let err = inject_stimulus(&dir, &"alpha".into(), 0.9, -1).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidArgument(_)));
        assert_eq!(dir.get(&"alpha".into()).unwrap().state(), 0.5);
    }

    #[test]
    fn non_finite_payload_is_rejected() {
        let dir = network();
        for payload in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(inject_stimulus(&dir, &"alpha".into(), payload, 3).is_err());
        }
        assert_eq!(dir.get(&"alpha".into()).unwrap().state(), 0.5);
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let dir = network();
        assert!(inject_stimulus(&dir, &"alpha".into(), 0.1, i64::MAX).is_err());
    }

    #[test]
    fn zero_ttl_never_applies() {
        let dir = network();
        let done = inject_stimulus(&dir, &"alpha".into(), 0.9, 0).unwrap();
        assert_eq!(done.reason, TerminationReason::TtlExpired);
        assert_eq!(done.deliveries, 0);
        assert_eq!(dir.get(&"alpha".into()).unwrap().state(), 0.5);
    }

    #[tokio::test]
    async fn spawned_injection_runs_to_termination() {
        let dir = Arc::new(network());
        let handle = spawn_injection(dir.clone(), "alpha".into(), 0.9, 1).unwrap();
        let done = handle.await.unwrap();
        assert_eq!(done.reason, TerminationReason::TtlExpired);
        assert_eq!(done.deliveries, 1);
    }

    #[tokio::test]
    async fn spawn_injection_validates_before_spawning() {
        let dir = Arc::new(network());
        assert!(spawn_injection(dir, "alpha".into(), f64::NAN, 1).is_err());
    }
}
