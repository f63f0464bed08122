//! Prefork demo binary.
//!
//! Boots a registry of demo initializers and forks workers through the
//! reference supervisor, or runs boot checks without forking.

use anyhow::Context;
use clap::{Parser, Subcommand};
use prefork::{
    Config, ForkSensitive, InitContext, Initializer, Phase, PreforkConfig, PreforkSupervisor,
    Registration, Registry,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "prefork",
    about = "Fork-safe initializer lifecycle registry demo",
    version
)]
struct Cli {
    /// Application config file (TOML)
    #[arg(short, long, default_value = "prefork.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the registry and fork workers
    Run {
        /// Number of workers (overrides the config file)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Boot the registry without forking and print health as JSON
    Check,

    /// List registered initializers
    List,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_file_or_default(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run { workers: None }) {
        Commands::Run { workers } => run(config, workers),
        Commands::Check => check(config),
        Commands::List => list(),
    }
}

/// Boot the master and fork workers.
fn run(config: Config, workers_override: Option<usize>) -> anyhow::Result<()> {
    let workers = workers_override.unwrap_or(config.workers);
    let ctx = InitContext::new(config);

    let mut supervisor = PreforkSupervisor::new(
        demo_registry()?,
        PreforkConfig {
            workers,
            respawn: false,
        },
    );

    let report = supervisor.boot(&ctx)?;
    if !report.is_fully_successful() {
        warn!(failed = ?report.failed_names(), "Boot completed degraded");
    }

    let exits = supervisor.run(|worker| {
        info!(worker = worker, pid = std::process::id(), "Worker serving");
        // Stand-in for the request loop
        std::thread::sleep(Duration::from_millis(250));
        0
    })?;

    info!(workers = exits.len(), "All workers exited");
    println!(
        "{}",
        serde_json::to_string_pretty(&supervisor.registry().health())?
    );
    Ok(())
}

/// Boot the registry in-process and print health and status.
fn check(config: Config) -> anyhow::Result<()> {
    let ctx = InitContext::new(config);
    let mut registry = demo_registry()?;

    registry.validate()?;
    registry.require_capabilities(&["logging", "database", "message-queue"])?;
    registry.run_all(&ctx);

    let output = serde_json::json!({
        "health": registry.health(),
        "initializers": registry.status(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// List registered initializers with phase and capabilities.
fn list() -> anyhow::Result<()> {
    let registry = demo_registry()?;
    for status in registry.status() {
        println!(
            "{:<16} {:<16} {}",
            status.name,
            status.phase,
            status.provides.join(", ")
        );
    }
    Ok(())
}

/// Build the demo initializer set.
fn demo_registry() -> prefork::Result<Registry> {
    let mut registry = Registry::new();
    registry.load(vec![
        Registration::normal(LogSink::new()),
        Registration::fork_sensitive(DbPool::new()),
        Registration::fork_sensitive(QueueClient::new()),
    ])?;
    Ok(registry)
}

/// Demo initializer: configures the process-wide log sink once at boot.
struct LogSink {
    configured: bool,
}

impl LogSink {
    fn new() -> Self {
        Self { configured: false }
    }
}

impl Initializer for LogSink {
    fn name(&self) -> &str {
        "log-sink"
    }

    fn provides(&self) -> &[&str] {
        &["logging"]
    }

    fn execute(&mut self, ctx: &InitContext) -> anyhow::Result<()> {
        if self.configured {
            return Ok(());
        }

        let level = ctx
            .config()
            .environment
            .get("LOG_LEVEL")
            .map(String::as_str)
            .unwrap_or("info");
        info!(level = level, "Log sink configured");
        self.configured = true;
        Ok(())
    }
}

/// Demo initializer: a socket-backed database pool that must not cross a
/// fork.
struct DbPool {
    url: Option<String>,
    pool: Option<String>,
}

impl DbPool {
    fn new() -> Self {
        Self {
            url: None,
            pool: None,
        }
    }

    fn open_pool(url: &str) -> String {
        format!("{}#{}", url, std::process::id())
    }
}

impl Initializer for DbPool {
    fn name(&self) -> &str {
        "db-pool"
    }

    fn phase(&self) -> Phase {
        Phase::ForkSensitive
    }

    fn provides(&self) -> &[&str] {
        &["database"]
    }

    fn execute(&mut self, ctx: &InitContext) -> anyhow::Result<()> {
        let url = ctx
            .config()
            .database_url
            .clone()
            .unwrap_or_else(|| "postgres://localhost/app".to_string());
        self.pool = Some(Self::open_pool(&url));
        info!(url = %url, "Database pool opened");
        self.url = Some(url);
        Ok(())
    }
}

impl ForkSensitive for DbPool {
    fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.pool.take().is_some() {
            info!("Database pool released before fork");
        }
        Ok(())
    }

    fn reconnect(&mut self) -> anyhow::Result<()> {
        let url = self
            .url
            .as_deref()
            .context("database pool was never configured")?;
        self.pool = Some(Self::open_pool(url));
        info!(pid = std::process::id(), "Database pool reconnected");
        Ok(())
    }
}

/// Demo initializer: a message-queue client with the same fork contract.
struct QueueClient {
    url: Option<String>,
    channel: Option<String>,
}

impl QueueClient {
    fn new() -> Self {
        Self {
            url: None,
            channel: None,
        }
    }
}

impl Initializer for QueueClient {
    fn name(&self) -> &str {
        "queue-client"
    }

    fn phase(&self) -> Phase {
        Phase::ForkSensitive
    }

    fn provides(&self) -> &[&str] {
        &["message-queue"]
    }

    fn execute(&mut self, ctx: &InitContext) -> anyhow::Result<()> {
        let url = ctx
            .config()
            .queue_url
            .clone()
            .unwrap_or_else(|| "amqp://localhost/app".to_string());
        self.channel = Some(format!("{}/{}", url, std::process::id()));
        info!(url = %url, "Queue channel opened");
        self.url = Some(url);
        Ok(())
    }
}

impl ForkSensitive for QueueClient {
    fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.channel.take().is_some() {
            info!("Queue channel released before fork");
        }
        Ok(())
    }

    fn reconnect(&mut self) -> anyhow::Result<()> {
        let url = self
            .url
            .as_deref()
            .context("queue client was never configured")?;
        self.channel = Some(format!("{}/{}", url, std::process::id()));
        info!(pid = std::process::id(), "Queue channel reconnected");
        Ok(())
    }
}
