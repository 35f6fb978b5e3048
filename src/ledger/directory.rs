//! Concurrent agent table with random recipient resolution.

use crate::agent::Agent;
use crate::error::NetworkError;
use crate::telemetry::{Telemetry, TelemetryEvent};
use crate::types::{AgentId, AgentSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Registered agents of one simulation run.
///
/// The directory only does addressing: it never filters by halt state and
/// never runs agent logic. Agents are shared out as `Arc<Agent>` so several
/// propagation chains can reach the same agent at once.
pub struct Directory {
    agents: DashMap<AgentId, Arc<Agent>>,
    /// Recipient selector. Held only for the duration of one draw.
    rng: Mutex<StdRng>,
    /// Set by the first veto; agents registered afterwards start halted.
    vetoed: AtomicBool,
    telemetry: Telemetry,
}

impl Directory {
    /// Create an empty directory with an entropy-seeded selector.
    pub fn new(telemetry: Telemetry) -> Self {
        Self::from_rng(telemetry, StdRng::from_entropy())
    }

    /// Create an empty directory whose recipient draws are reproducible.
    pub fn with_seed(telemetry: Telemetry, seed: u64) -> Self {
        Self::from_rng(telemetry, StdRng::seed_from_u64(seed))
    }

    fn from_rng(telemetry: Telemetry, rng: StdRng) -> Self {
        Self {
            agents: DashMap::new(),
            rng: Mutex::new(rng),
            vetoed: AtomicBool::new(false),
            telemetry,
        }
    }

    /// Sink receiving this network's events.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    // ── Registration ─────────────────────────────────────────

    /// Register an agent under its id. Colliding ids are rejected.
    ///
    /// Once the network has been vetoed, new agents are halted before they
    /// become reachable.
    pub fn register(&self, agent: Agent) -> Result<Arc<Agent>, NetworkError> {
        let (agent, vetoed) = match self.agents.entry(agent.id().clone()) {
            Entry::Occupied(entry) => return Err(NetworkError::DuplicateId(entry.key().clone())),
            Entry::Vacant(entry) => {
                // Checked under the shard lock: a broadcast that missed this
                // entry has already set the flag.
                let vetoed = self.vetoed.load(Ordering::SeqCst);
                if vetoed {
                    agent.halt();
                }
                (entry.insert(Arc::new(agent)).clone(), vetoed)
            }
        };

        self.telemetry.record(TelemetryEvent::AgentRegistered {
            agent: agent.id().clone(),
            state: agent.state(),
        });
        if vetoed {
            debug!("Agent {} registered after veto, halted", agent.id());
            self.telemetry.record(TelemetryEvent::AgentHalted {
                agent: agent.id().clone(),
            });
        }
        Ok(agent)
    }


    /// Create and register an agent.
    ///
    /// Missing ids are generated; a missing state is drawn from `[0, 1)`.
    pub fn spawn(
        &self,
        id: Option<AgentId>,
        initial_state: Option<f64>,
    ) -> Result<Arc<Agent>, NetworkError> {
        let id = id.unwrap_or_else(AgentId::generate);
        let agent = match initial_state {
            Some(state) => Agent::new(id, state)?,
            None => Agent::with_random_state(id),
        };
        self.register(agent)
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn get(&self, id: &AgentId) -> Option<Arc<Agent>> {
        self.agents.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self, id: &AgentId) -> Option<AgentSnapshot> {
        self.get(id).map(|agent| agent.snapshot())
    }

    /// Snapshots of every agent, sorted by id.
    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        let agents: Vec<Arc<Agent>> = self.agents.iter().map(|e| e.value().clone()).collect();
        let mut snaps: Vec<AgentSnapshot> = agents.iter().map(|a| a.snapshot()).collect();
        snaps.sort_by(|a, b| a.id.cmp(&b.id));
        snaps
    }

    /// Whether every registered agent is halted (vacuously true when empty).
    pub fn all_halted(&self) -> bool {
        self.agents.iter().all(|e| e.value().is_halted())
    }

    // ── Addressing ───────────────────────────────────────────

    /// Pick a recipient uniformly at random among agents other than
    /// `exclude`. Halted agents stay eligible.
    pub fn resolve_next(&self, exclude: &AgentId) -> Option<AgentId> {
        // Shard iteration order varies between directories, so the candidates
        // are sorted for a seeded selector to replay the same draws. This
        // makes each hop O(n log n) in the number of agents.
        let mut candidates: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|e| e.key() != exclude)
            .map(|e| e.key().clone())
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort();

        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        candidates.choose(&mut *rng).cloned()
    }

    // ── Control ──────────────────────────────────────────────

    /// Halt every registered agent, and every agent registered later.
    /// Returns how many agents this call transitioned; already-halted agents
    /// are left as they are.
    pub fn broadcast_halt(&self) -> usize {
        // Latched before collecting: a registration this pass misses halts
        // its own agent.
        self.vetoed.store(true, Ordering::SeqCst);
        // Collect first so no shard lock is held while agents are halted.
        let agents: Vec<Arc<Agent>> = self.agents.iter().map(|e| e.value().clone()).collect();

        let mut halted = 0;
        for agent in &agents {
            if agent.halt() {
                halted += 1;
                self.telemetry.record(TelemetryEvent::AgentHalted {
                    agent: agent.id().clone(),
                });
            }
        }
        debug!("Halted {} of {} agents", halted, agents.len());

        self.telemetry.record(TelemetryEvent::VetoBroadcast {
            agents_halted: halted,
            registered: agents.len(),
        });
        halted
    }
}
