//! Ledger mirroring. Keeps the database in step with the live network.
//!
//! The mirror drains telemetry from a channel on its own task and writes
//! snapshots through a [`LedgerPersistence`] backend. The network never waits
//! for it, and persistence failures are logged and dropped.
//!
//! DB writes are offloaded via `spawn_blocking` so sqlite I/O does not
//! block the async runtime.

use crate::ledger::Directory;
use crate::state::database::{Database, LedgerStatus};
use crate::telemetry::TelemetryEvent;
use crate::types::{AgentId, AgentSnapshot, Termination};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Durable storage for network state.
#[async_trait]
pub trait LedgerPersistence: Send + Sync {
    /// Store the latest snapshot of an agent.
    async fn mirror_agent(&self, snapshot: AgentSnapshot, status: LedgerStatus) -> Result<()>;

    /// Store the outcome of a finished chain.
    async fn record_chain(&self, done: Termination) -> Result<()>;

    /// Store a veto broadcast.
    async fn record_veto(&self, agents_halted: usize, registered: usize) -> Result<()>;
}

/// [`LedgerPersistence`] backed by the SQLite ledger database.
#[derive(Clone)]
pub struct SqliteLedger {
    db: Arc<Mutex<Database>>,
}

impl SqliteLedger {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Run a closure against the database on the blocking pool.
    async fn with_db<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Database) -> Result<()> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let db = db.blocking_lock();
            f(&db)
        })
        .await??;
        Ok(())
    }
}

#[async_trait]
impl LedgerPersistence for SqliteLedger {
    async fn mirror_agent(&self, snapshot: AgentSnapshot, status: LedgerStatus) -> Result<()> {
        self.with_db(move |db| db.upsert_agent(&snapshot, status, Utc::now()))
            .await
    }

    async fn record_chain(&self, done: Termination) -> Result<()> {
        self.with_db(move |db| db.record_chain(&done)).await
    }

    async fn record_veto(&self, agents_halted: usize, registered: usize) -> Result<()> {
        self.with_db(move |db| db.record_veto(agents_halted, registered))
            .await
    }
}

/// Background task translating telemetry into ledger writes.
pub struct LedgerMirror {
    directory: Arc<Directory>,
    store: Arc<dyn LedgerPersistence>,
    events: mpsc::UnboundedReceiver<TelemetryEvent>,
}

impl LedgerMirror {
    pub fn new(
        directory: Arc<Directory>,
        store: Arc<dyn LedgerPersistence>,
        events: mpsc::UnboundedReceiver<TelemetryEvent>,
    ) -> Self {
        Self {
            directory,
            store,
            events,
        }
    }

    /// Mirror events until the channel closes or `cancel` fires.
    ///
    /// On cancellation, events already queued are still written.
    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        info!("Ledger mirror started");
        let mut written = 0;

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => written += self.apply(event).await,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    while let Ok(event) = self.events.try_recv() {
                        written += self.apply(event).await;
                    }
                    break;
                }
            }
        }

        info!("Ledger mirror stopped after {} writes", written);
        written
    }

    /// Persist one event. Returns the number of successful writes.
    async fn apply(&self, event: TelemetryEvent) -> u64 {
        let result = match event {
            TelemetryEvent::AgentRegistered { agent, .. } => {
                self.mirror(&agent, LedgerStatus::Born).await
            }
            TelemetryEvent::PulseDelivered { agent, .. } => {
                self.mirror(&agent, LedgerStatus::Running).await
            }
            TelemetryEvent::AgentHalted { agent } => {
                self.mirror(&agent, LedgerStatus::Halted).await
            }
            TelemetryEvent::PropagationTerminated {
                chain,
                at,
                reason,
                hops,
                deliveries,
            } => {
                let done = Termination {
                    chain,
                    reason,
                    last_target: at,
                    hops,
                    deliveries,
                };
                self.store.record_chain(done).await.map(|_| true)
            }
            TelemetryEvent::VetoBroadcast {
                agents_halted,
                registered,
            } => self
                .store
                .record_veto(agents_halted, registered)
                .await
                .map(|_| true),
            TelemetryEvent::PulseEmitted { .. } => Ok(false),
        };

        match result {
            Ok(true) => 1,
            Ok(false) => 0,
            Err(e) => {
                warn!("Ledger write failed: {:#}", e);
                0
            }
        }
    }

    async fn mirror(&self, agent: &AgentId, status: LedgerStatus) -> Result<bool> {
        // Mirror the current snapshot rather than the event payload, so the
        // row reflects the latest state even if events queue up.
        let Some(snapshot) = self.directory.snapshot(agent) else {
            debug!("Agent {} vanished before mirroring", agent);
            return Ok(false);
        };
        self.store.mirror_agent(snapshot, status).await?;
        Ok(true)
    }
}

/// Write every agent of `directory` to the ledger.
pub async fn mirror_all(directory: &Directory, store: &dyn LedgerPersistence) -> Result<usize> {
    let snapshots = directory.snapshots();
    let count = snapshots.len();
    for snapshot in snapshots {
        let status = if snapshot.halted {
            LedgerStatus::Halted
        } else {
            LedgerStatus::Running
        };
        store.mirror_agent(snapshot, status).await?;
    }
    Ok(count)
}
