//! Built-in heartbeat task implementations.

use crate::ledger::Directory;
use crate::propagation;
use crate::state::{mirror_all, Database, SqliteLedger};
use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a heartbeat task may touch.
#[derive(Clone)]
pub struct TaskContext {
    pub directory: Arc<Directory>,
    pub db: Arc<Mutex<Database>>,
    /// TTL used by `stimulate` when the entry has no `ttl` param.
    pub default_ttl: u32,
}

/// Execute a named heartbeat task.
pub async fn execute_task(
    task_name: &str,
    params: &serde_json::Value,
    ctx: &TaskContext,
) -> Result<String> {
    match task_name {
        "heartbeat_ping" => task_heartbeat_ping(&ctx.db).await,
        "snapshot_agents" => task_snapshot_agents(ctx).await,
        "stimulate" => task_stimulate(params, ctx).await,
        _ => bail!("Unknown heartbeat task: {}", task_name),
    }
}

/// Record that the network is alive.
async fn task_heartbeat_ping(db: &Arc<Mutex<Database>>) -> Result<String> {
    let db = db.lock().await;
    db.kv_set("last_heartbeat", &chrono::Utc::now().to_rfc3339())?;
    Ok("pong".into())
}

/// Refresh every agent row (state, halt flag, last_seen).
async fn task_snapshot_agents(ctx: &TaskContext) -> Result<String> {
    let store = SqliteLedger::new(ctx.db.clone());
    let count = mirror_all(&ctx.directory, &store).await?;
    Ok(format!("{} agents mirrored", count))
}

/// Inject a random stimulus into a random agent.
///
/// Params: `ttl` (optional, defaults to the configured TTL).
async fn task_stimulate(params: &serde_json::Value, ctx: &TaskContext) -> Result<String> {
    let ttl = params
        .get("ttl")
        .and_then(|v| v.as_i64())
        .unwrap_or(ctx.default_ttl as i64);

    let (target, payload) = {
        let mut rng = rand::thread_rng();
        let ids = ctx.directory.ids();
        let Some(target) = ids.choose(&mut rng).cloned() else {
            return Ok("Skipped: no agents registered".into());
        };
        (target, rng.gen::<f64>())
    };

    let done = propagation::spawn_injection(ctx.directory.clone(), target.clone(), payload, ttl)?
        .await
        .context("Propagation worker panicked")?;

    Ok(format!(
        "{:.4} -> {} [TTL={}]: {} after {} deliveries",
        payload, target, ttl, done.reason, done.deliveries
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullSink;
    use crate::veto::issue_veto;

    fn context(agents: &[&str]) -> TaskContext {
        let dir = Directory::with_seed(Arc::new(NullSink), 1);
        for id in agents {
            dir.spawn(Some((*id).into()), Some(0.5)).unwrap();
        }
        TaskContext {
            directory: Arc::new(dir),
            db: Arc::new(Mutex::new(Database::open_memory().unwrap())),
            default_ttl: 3,
        }
    }

    #[tokio::test]
    async fn unknown_task_fails() {
        let ctx = context(&["alpha"]);
        assert!(execute_task("nope", &serde_json::Value::Null, &ctx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn stimulate_reports_termination() {
        let ctx = context(&["alpha", "beta"]);
        let msg = execute_task("stimulate", &serde_json::json!({ "ttl": 2 }), &ctx)
            .await
            .unwrap();
        assert!(msg.contains("ttl_expired"), "{msg}");
    }

    #[tokio::test]
    async fn stimulate_after_veto_is_halted() {
        let ctx = context(&["alpha", "beta"]);
        issue_veto(&ctx.directory);
        let msg = execute_task("stimulate", &serde_json::Value::Null, &ctx)
            .await
            .unwrap();
        assert!(msg.contains("target_halted"), "{msg}");
    }

    #[tokio::test]
    async fn stimulate_on_empty_network_is_skipped() {
        let ctx = context(&[]);
        let msg = execute_task("stimulate", &serde_json::Value::Null, &ctx)
            .await
            .unwrap();
        assert!(msg.starts_with("Skipped"));
    }

    #[tokio::test]
    async fn stimulate_rejects_negative_ttl() {
        let ctx = context(&["alpha", "beta"]);
        let err = execute_task("stimulate", &serde_json::json!({ "ttl": -1 }), &ctx).await;
        assert!(err.is_err());
    }
}
