//! Polymarket Position Mirror
//!
//! Keeps a follower account's positions in line with a source account,
//! scaled by a copy ratio. Runs a periodic single-flight sync loop with an
//! HTTP API for policy configuration and manual sync triggers.

mod api;
mod db;
mod error;
mod models;
mod server;
mod trading;
mod traits;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Instrument, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use crate::api::{ClobClient, DataClient, DryRunExecutor, DATA_API_BASE};
use crate::db::{Database, InMemoryPolicyStore};
use crate::models::CopyPolicy;
use crate::server::AppState;
use crate::traits::{OrderExecutor, PolicyStore};
use crate::trading::{
    cycle_span, log_outcome, Scheduler, SyncConfig, SyncOrchestrator, SyncOutcome, TriggerSource,
    DUST_THRESHOLD,
};

/// Database value selecting the non-persistent policy store.
const MEMORY_STORE: &str = "memory";

/// Polymarket position mirror CLI.
#[derive(Parser)]
#[command(name = "polymirror")]
#[command(about = "Mirror a Polymarket account's positions into your own", long_about = None)]
struct Cli {
    /// Database URL, or "memory" for a non-persistent policy store
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:./polymirror.db?mode=rwc", global = true)]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Follower wallet address (the account that copies)
    #[arg(long, env = "MY_WALLET_ADDRESS", global = true)]
    follower: Option<String>,

    /// Seconds between scheduled sync cycles
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value = "60", global = true)]
    interval: u64,

    /// Seconds shutdown waits for an in-flight cycle
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "30", global = true)]
    grace: u64,

    /// Log trades instead of placing them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Polymarket Data API base URL
    #[arg(long, env = "DATA_API_URL", default_value = DATA_API_BASE, global = true)]
    data_api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync scheduler and HTTP API until Ctrl+C
    Serve {
        /// Address for the HTTP API
        #[arg(long, env = "API_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },

    /// Run one sync cycle in the foreground
    Sync,

    /// Inspect or change the copy policy
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Show effective configuration
    Config,
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Show the current copy policy
    Show,

    /// Replace the copy policy
    Set {
        /// Address of the account to mirror
        address: String,

        /// Display name for the source account
        #[arg(long)]
        label: Option<String>,

        /// Multiplier applied to the source's position sizes
        #[arg(short, long, default_value = "1.0")]
        ratio: f64,

        /// Cap on the quantity of any single order
        #[arg(short, long)]
        fixed_amount: Option<f64>,

        /// Store the policy without syncing it
        #[arg(long)]
        paused: bool,
    },

    /// Remove the copy policy
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Serve { bind } => serve(&cli, *bind).await,
        Commands::Sync => sync_once(&cli).await,
        Commands::Policy { action } => policy(&cli, action).await,
        Commands::Config => {
            print_config(&cli);
            Ok(())
        }
    }
}

async fn serve(cli: &Cli, bind: SocketAddr) -> Result<()> {
    let policies = open_store(&cli.database).await?;
    let scheduler = Arc::new(Scheduler::new(build_orchestrator(cli, policies.clone())?));

    println!("\n=== Polymarket Position Mirror ===");
    println!("Follower:      {}", cli.follower.as_deref().unwrap_or("(not set)"));
    println!("Sync interval: {}s", cli.interval);
    println!("API:           http://{}", bind);
    println!("\nPress Ctrl+C to stop.\n");

    let ticker = tokio::spawn(scheduler.clone().run());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let state = Arc::new(AppState {
        policies,
        scheduler: scheduler.clone(),
    });
    let mut api = tokio::spawn(server::serve(bind, state, async move {
        stop_rx.await.ok();
    }));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
        result = &mut api => {
            scheduler.shutdown().await;
            return result.context("API server task failed")?;
        }
    }

    scheduler.shutdown().await;
    stop_tx.send(()).ok();

    api.await.context("API server task failed")??;
    ticker.await.context("Scheduler task failed")?;

    info!("Shutdown complete");
    Ok(())
}

async fn sync_once(cli: &Cli) -> Result<()> {
    let policies = open_store(&cli.database).await?;
    let orchestrator = build_orchestrator(cli, policies)?;

    let cycle_id = Uuid::new_v4();
    let outcome = orchestrator
        .run_cycle_with_id(cycle_id)
        .instrument(cycle_span(cycle_id, TriggerSource::Cli))
        .await;
    log_outcome(&outcome);

    println!("\n{}", outcome);
    if let Some(report) = outcome.report() {
        for result in &report.results {
            let status = match &result.result {
                Ok(receipt) if receipt.simulated => "simulated".to_string(),
                Ok(receipt) => receipt.order_id.clone().unwrap_or_else(|| "placed".to_string()),
                Err(e) => format!("failed: {}", e),
            };
            println!("  {:<50} {}", truncate(&result.instruction.to_string(), 48), status);
        }
    }

    match outcome {
        SyncOutcome::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

async fn policy(cli: &Cli, action: &PolicyAction) -> Result<()> {
    let store = open_store(&cli.database).await?;

    match action {
        PolicyAction::Show => match store.get().await? {
            Some(policy) => print_policy(&policy),
            None => println!("No copy policy configured. Use 'polymirror policy set <address>'."),
        },

        PolicyAction::Set {
            address,
            label,
            ratio,
            fixed_amount,
            paused,
        } => {
            let policy =
                CopyPolicy::from_floats(address.clone(), label.clone(), *ratio, *fixed_amount, !paused)?;
            let stored = store.replace(policy).await?;
            println!("Copy policy saved.");
            print_policy(&stored);
        }

        PolicyAction::Clear => {
            if store.clear().await? {
                println!("Copy policy cleared.");
            } else {
                println!("No copy policy to clear.");
            }
        }
    }

    Ok(())
}

fn print_policy(policy: &CopyPolicy) {
    println!("\n=== Copy Policy ===\n");
    println!("  Source:        {}", policy.source_address);
    println!("  Label:         {}", policy.label.as_deref().unwrap_or("-"));
    println!("  Copy Ratio:    {}", policy.copy_ratio.normalize());
    println!(
        "  Fixed Amount:  {}",
        policy
            .fixed_amount
            .map(|a| a.normalize().to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Active:        {}", if policy.is_active { "Yes" } else { "No (paused)" });
}

fn print_config(cli: &Cli) {
    let clob_configured = std::env::var("POLYMARKET_PRIVATE_KEY").is_ok();

    println!("\n=== Sync Configuration ===\n");
    println!("  Database:         {}", cli.database);
    println!("  Follower:         {}", cli.follower.as_deref().unwrap_or("(not set)"));
    println!("  Sync Interval:    {}s", cli.interval);
    println!("  Shutdown Grace:   {}s", cli.grace);
    println!("  Dust Threshold:   {}", DUST_THRESHOLD);
    println!("  Data API:         {}", cli.data_api_url);
    println!(
        "  Mode:             {}",
        if cli.dry_run || !clob_configured {
            "DRY RUN (no real trades)"
        } else {
            "LIVE TRADING"
        }
    );
}

async fn open_store(database: &str) -> Result<Arc<dyn PolicyStore>> {
    if database == MEMORY_STORE {
        warn!("Using in-memory policy store; the policy is lost on restart");
        return Ok(Arc::new(InMemoryPolicyStore::new()));
    }

    let db = Database::new(database).await?;
    Ok(Arc::new(db))
}

fn build_orchestrator(cli: &Cli, policies: Arc<dyn PolicyStore>) -> Result<Arc<SyncOrchestrator>> {
    let provider = Arc::new(DataClient::with_base_url(cli.data_api_url.clone())?);
    let (executor, simulated) = build_executor(cli.dry_run);

    let config = SyncConfig {
        follower_address: cli.follower.clone(),
        poll_interval_secs: cli.interval,
        shutdown_grace_secs: cli.grace,
        dry_run: simulated,
    };

    if config.follower().is_none() {
        warn!("MY_WALLET_ADDRESS not set; sync cycles will be skipped");
    }

    Ok(Arc::new(SyncOrchestrator::new(config, policies, provider, executor)))
}

/// Pick the order executor. Returns whether orders are simulated.
fn build_executor(dry_run: bool) -> (Arc<dyn OrderExecutor>, bool) {
    if dry_run {
        info!("Dry run enabled, orders will be logged only");
        return (Arc::new(DryRunExecutor::new()), true);
    }

    match ClobClient::from_env() {
        Ok(client) => {
            info!(address = %client.address(), "CLOB client ready, trading live");
            (Arc::new(client), false)
        }
        Err(e) => {
            warn!(error = %e, "CLOB credentials unavailable, falling back to dry run");
            (Arc::new(DryRunExecutor::new()), true)
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
