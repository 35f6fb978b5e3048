//! Cron-based heartbeat daemon that runs background tasks on schedule.
//!
//! Reads heartbeat.yml for task definitions and executes them on their
//! cron schedules against the live network and its ledger.

use crate::config::ChrysalisConfig;
use crate::heartbeat::tasks::{self, TaskContext};
use crate::types::HeartbeatEntry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background heartbeat daemon.
pub struct HeartbeatDaemon {
    ctx: TaskContext,
    entries: Vec<HeartbeatEntry>,
    last_run: HashMap<String, DateTime<Utc>>,
    tick_interval: std::time::Duration,
}

impl HeartbeatDaemon {
    /// Create a new heartbeat daemon, loading entries from the YAML config.
    pub fn new(config: &ChrysalisConfig, ctx: TaskContext) -> Result<Self> {
        let entries = load_heartbeat_config(config)?;
        info!("Loaded {} heartbeat entries", entries.len());
        Ok(Self::with_entries(ctx, entries))
    }

    /// Create a daemon with an explicit task list.
    pub fn with_entries(ctx: TaskContext, entries: Vec<HeartbeatEntry>) -> Self {
        Self {
            ctx,
            entries,
            last_run: HashMap::new(),
            tick_interval: std::time::Duration::from_secs(1),
        }
    }

    /// Run the heartbeat loop (call from a tokio::spawn).
    ///
    /// The loop exits cooperatively when `cancel` is triggered.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!("Heartbeat daemon started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("Heartbeat tick failed: {e}");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Heartbeat daemon shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Process one tick, running every entry that is due at `now`.
    ///
    /// Individual task failures are logged and do not stop other tasks.
    /// Infrastructure errors (e.g. DB write failure) are propagated.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut ran = 0;

        for entry in &self.entries {
            if !entry.enabled {
                continue;
            }

            let schedule = match Schedule::from_str(&entry.schedule) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Invalid cron schedule '{}' for '{}': {}", entry.schedule, entry.name, e);
                    continue;
                }
            };

            // First sighting counts as overdue by a minute.
            let last = self
                .last_run
                .get(&entry.name)
                .copied()
                .unwrap_or(now - chrono::Duration::minutes(1));

            let Some(next_run) = schedule.after(&last).next() else {
                continue;
            };
            if next_run > now {
                continue;
            }

            debug!("Running heartbeat task: {}", entry.name);
            let result = tasks::execute_task(&entry.task, &entry.params, &self.ctx).await;

            let (result_str, success) = match &result {
                Ok(msg) => (msg.clone(), true),
                Err(e) => (format!("Error: {}", e), false),
            };

            {
                let db = self.ctx.db.lock().await;
                db.log_heartbeat(&entry.name, &result_str, success)
                    .context("Failed to log heartbeat to database")?;
            }

            self.last_run.insert(entry.name.clone(), now);
            ran += 1;

            if !success {
                warn!("Heartbeat task '{}' failed: {}", entry.name, result_str);
            }
        }

        Ok(ran)
    }
}

/// Load heartbeat entries from the YAML config file.
fn load_heartbeat_config(config: &ChrysalisConfig) -> Result<Vec<HeartbeatEntry>> {
    let path = config.resolved_heartbeat_path();
    let path = std::path::Path::new(&path);

    if !path.exists() {
        debug!("No heartbeat config at {:?}, using defaults", path);
        return Ok(default_heartbeat_entries(config.default_ttl));
    }

    let contents = std::fs::read_to_string(path).context("Failed to read heartbeat.yml")?;
    parse_heartbeat_config(&contents)
}

/// Parse heartbeat entries from YAML.
pub fn parse_heartbeat_config(contents: &str) -> Result<Vec<HeartbeatEntry>> {
    serde_yaml::from_str(contents).context("Failed to parse heartbeat.yml")
}

/// Default heartbeat entries if no config file exists.
///
/// Schedules use the six-field cron format (seconds first).
pub fn default_heartbeat_entries(default_ttl: u32) -> Vec<HeartbeatEntry> {
    vec![
        HeartbeatEntry {
            name: "heartbeat_ping".into(),
            schedule: "0 * * * * *".into(), // Every minute
            task: "heartbeat_ping".into(),
            enabled: true,
            params: serde_json::Value::Null,
        },
        HeartbeatEntry {
            name: "snapshot_agents".into(),
            schedule: "*/30 * * * * *".into(), // Every 30 seconds
            task: "snapshot_agents".into(),
            enabled: true,
            params: serde_json::Value::Null,
        },
        HeartbeatEntry {
            name: "stimulate".into(),
            schedule: "*/10 * * * * *".into(),
            task: "stimulate".into(),
            enabled: true,
            params: serde_json::json!({ "ttl": default_ttl }),
        },
    ]
}
