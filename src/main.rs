//! Chrysalis: pulse-propagation network runner.
//!
//! Usage:
//!   chrysalis init                 Write default config files
//!   chrysalis inject --target ID   Inject one stimulus and run the chain
//!   chrysalis scenario             Cascade, veto, and blocked re-injection
//!   chrysalis status               Show the mirrored ledger
//!   chrysalis daemon               Run the network with its heartbeat

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chrysalis::config::{self, ChrysalisConfig};
use chrysalis::heartbeat::{self, HeartbeatDaemon, TaskContext};
use chrysalis::ledger::{self, Directory};
use chrysalis::propagation;
use chrysalis::state::{mirror_all, Database, LedgerMirror, SqliteLedger};
use chrysalis::telemetry::{ChannelSink, FanoutSink, LogSink, Telemetry};
use chrysalis::types::*;
use chrysalis::veto;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "chrysalis")]
#[command(version)]
#[command(about = "Pulse-propagation network of autonomous agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to chrysalis home directory (defaults to ~/.chrysalis).
    #[arg(long)]
    home: Option<String>,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write default chrysalis.toml and heartbeat.yml.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },

    /// Inject one external stimulus and run the chain to termination.
    Inject {
        /// Agent receiving the stimulus.
        #[arg(long)]
        target: String,

        /// Stimulus payload.
        #[arg(long, allow_negative_numbers = true)]
        payload: f64,

        /// Hop budget (defaults to the configured TTL).
        #[arg(long, allow_negative_numbers = true)]
        ttl: Option<i64>,
    },

    /// Run the three-agent veto demonstration.
    Scenario,

    /// Show the mirrored ledger.
    Status,

    /// Run the network with its heartbeat until Ctrl+C, then veto.
    Daemon,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home_dir = cli
        .home
        .as_deref()
        .map(|h| PathBuf::from(shellexpand::tilde(h).into_owned()))
        .unwrap_or_else(config::default_home_dir);

    // Initialize logging
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| load(&home_dir).ok().map(|cfg| cfg.log_level))
        .unwrap_or_else(|| "info".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => cmd_init(&home_dir, force),
        Commands::Inject {
            target,
            payload,
            ttl,
        } => cmd_inject(&home_dir, &target, payload, ttl).await,
        Commands::Scenario => cmd_scenario(&home_dir).await,
        Commands::Status => cmd_status(&home_dir),
        Commands::Daemon => cmd_daemon(&home_dir).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path, force: bool) -> Result<()> {
    let config_path = home_dir.join(config::CONFIG_FILE);
    if config_path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            "!!".yellow().bold(),
            config_path.display()
        );
        return Ok(());
    }

    let cfg = ChrysalisConfig::default();
    config::save_config(&cfg, &config_path)?;

    let heartbeat_path = PathBuf::from(cfg.resolved_heartbeat_path());
    let entries = heartbeat::daemon::default_heartbeat_entries(cfg.default_ttl);
    let yaml = serde_yaml::to_string(&entries).context("Failed to serialize heartbeat entries")?;
    if let Some(parent) = heartbeat_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&heartbeat_path, yaml)
        .with_context(|| format!("Failed to write {}", heartbeat_path.display()))?;

    println!("{} Wrote {}", ">>>".green().bold(), config_path.display());
    println!("{} Wrote {}", ">>>".green().bold(), heartbeat_path.display());
    Ok(())
}

async fn cmd_inject(home_dir: &Path, target: &str, payload: f64, ttl: Option<i64>) -> Result<()> {
    let cfg = load(home_dir)?;
    let net = Network::start(&cfg)?;
    let ttl = ttl.unwrap_or(cfg.default_ttl as i64);

    println!(
        "{} Injecting {:.4} into '{}' [TTL={}]",
        ">>>".green().bold(),
        payload,
        target,
        ttl
    );
    let done = propagation::inject_stimulus(&net.directory, &AgentId::new(target), payload, ttl)?;
    print_termination(&done);

    net.shutdown().await;
    Ok(())
}

async fn cmd_scenario(home_dir: &Path) -> Result<()> {
    let mut cfg = load(home_dir)?;
    cfg.agents = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(config::AgentSeed::named)
        .collect();
    let net = Network::start(&cfg)?;

    println!("{}", "--- STEP 1: normal pulse cascade, TTL=5 ---".bold());
    let done = propagation::inject_stimulus(&net.directory, &"alpha".into(), 0.5, 5)?;
    print_termination(&done);

    println!("{}", "--- STEP 2: nexus veto ---".bold());
    veto::issue_veto(&net.directory);

    println!("{}", "--- STEP 3: new cascade after veto ---".bold());
    let done = propagation::inject_stimulus(&net.directory, &"beta".into(), 0.9, 2)?;
    print_termination(&done);

    if done.reason == TerminationReason::TargetHalted {
        println!("{} Veto authority confirmed", ">>>".green().bold());
    } else {
        println!("{} Pulse escaped the veto: {}", "!!!".red().bold(), done.reason);
    }

    print_agents(&net.directory.snapshots());
    net.shutdown().await;
    Ok(())
}

fn cmd_status(home_dir: &Path) -> Result<()> {
    let cfg = load(home_dir)?;
    let db = open_db(&cfg)?;

    let agents = db.list_agents()?;
    let chains = db.recent_chains(10)?;
    let last_heartbeat = db.kv_get("last_heartbeat")?.unwrap_or_else(|| "never".into());

    println!();
    println!("{}", "=== Chrysalis Status ===".bold());
    println!();
    println!("  {}:  {}", "Network".bold(), cfg.name);
    println!("  {}:", "Agents".bold());
    for a in &agents {
        println!(
            "    {:<28} {:>10.4}  {:<8}  {}",
            a.id,
            a.state,
            colorize_status(&a.status),
            a.last_seen.dimmed()
        );
    }
    println!();
    println!("  {}:", "Recent chains".bold());
    for c in &chains {
        println!(
            "    {}  {:<22} at {:<16} hops={} deliveries={}",
            c.id.dimmed(),
            c.reason,
            c.last_target,
            c.hops,
            c.deliveries
        );
    }
    println!();
    println!("  {}:", "Runtime".bold());
    println!("    Chains:    {}", db.chain_count()?);
    println!("    Vetoes:    {}", db.veto_count()?);
    println!("    Heartbeat: {}", last_heartbeat);
    println!();

    Ok(())
}

async fn cmd_daemon(home_dir: &Path) -> Result<()> {
    let cfg = load(home_dir)?;
    let net = Network::start(&cfg)?;

    println!(
        "{} Starting daemon for '{}' with {} agents ...",
        ">>>".green().bold(),
        cfg.name,
        net.directory.len(),
    );

    let ctx = TaskContext {
        directory: net.directory.clone(),
        db: net.db.clone(),
        default_ttl: cfg.default_ttl,
    };
    let mut daemon = HeartbeatDaemon::new(&cfg, ctx)?;
    let heartbeat_cancel = net.cancel.clone();
    let heartbeat_handle = tokio::spawn(async move {
        if let Err(e) = daemon.run(heartbeat_cancel).await {
            tracing::error!("Heartbeat daemon error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down: issuing veto...", "<<<".red().bold());
    veto::issue_veto(&net.directory);

    net.cancel.cancel();
    if let Err(e) = heartbeat_handle.await {
        warn!("Heartbeat task join error: {}", e);
    }

    // Final snapshot of the halted network
    let store = SqliteLedger::new(net.db.clone());
    let count = mirror_all(&net.directory, &store).await?;
    {
        let db = net.db.lock().await;
        db.kv_set("network_state", "halted")?;
    }
    info!("Persisted {} halted agents", count);

    net.shutdown().await;
    info!("Daemon shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A live network plus its ledger mirror.
struct Network {
    directory: Arc<Directory>,
    db: Arc<Mutex<Database>>,
    cancel: CancellationToken,
    mirror: Option<JoinHandle<u64>>,
}

impl Network {
    /// Open the ledger, build the directory from config, and start mirroring.
    fn start(cfg: &ChrysalisConfig) -> Result<Self> {
        let db = Arc::new(Mutex::new(open_db(cfg)?));
        let cancel = CancellationToken::new();

        let mut sinks = FanoutSink::new(vec![Arc::new(LogSink)]);
        let mut events = None;
        if cfg.mirror_to_ledger {
            let (sink, rx) = ChannelSink::channel();
            sinks.push(Arc::new(sink));
            events = Some(rx);
        }
        let telemetry: Telemetry = Arc::new(sinks);

        let directory = Arc::new(ledger::build_network(cfg, telemetry)?);

        let mirror = events.map(|rx| {
            let store = Arc::new(SqliteLedger::new(db.clone()));
            let mirror = LedgerMirror::new(directory.clone(), store, rx);
            tokio::spawn(mirror.run(cancel.clone()))
        });

        Ok(Self {
            directory,
            db,
            cancel,
            mirror,
        })
    }

    /// Stop mirroring once queued events are written.
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Some(handle) = self.mirror {
            let timeout = tokio::time::Duration::from_secs(10);
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(written)) => info!("Ledger mirror wrote {} records", written),
                Ok(Err(e)) => warn!("Ledger mirror join error: {}", e),
                Err(_) => warn!("Ledger mirror did not drain within {:?}", timeout),
            }
        }
    }
}

fn load(home_dir: &Path) -> Result<ChrysalisConfig> {
    let config_path = home_dir.join(config::CONFIG_FILE);
    config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

fn open_db(cfg: &ChrysalisConfig) -> Result<Database> {
    let db_path = cfg.resolved_db_path();
    let db_path = Path::new(&db_path);
    Database::open(db_path)
        .with_context(|| format!("Failed to open ledger at {}", db_path.display()))
}

fn print_termination(done: &Termination) {
    let reason = match done.reason {
        TerminationReason::TtlExpired | TerminationReason::NoEligibleRecipient => {
            done.reason.to_string().green()
        }
        TerminationReason::TargetHalted => done.reason.to_string().yellow(),
        TerminationReason::UnknownTarget => done.reason.to_string().red(),
    };
    println!(
        "  chain {} terminated at '{}': {} (hops={}, deliveries={})",
        done.chain.to_string().dimmed(),
        done.last_target,
        reason,
        done.hops,
        done.deliveries
    );
}

fn print_agents(snapshots: &[AgentSnapshot]) {
    for s in snapshots {
        println!(
            "    {:<10} {:>8.4}  {}",
            s.id.as_str(),
            s.state,
            colorize_status(&s.status().to_string())
        );
    }
}

fn colorize_status(status: &str) -> String {
    match status {
        "born" => status.cyan().to_string(),
        "running" | "active" => status.green().to_string(),
        "halted" => status.red().bold().to_string(),
        _ => status.dimmed().to_string(),
    }
}
