mod cache;
mod capture;
mod config;
mod desktop;
mod event;
mod orchestrator;
mod paths;
mod periodic;
mod preflight;
mod vpn;
mod watch;
mod watcher;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::cache::FsCacheStore;
use crate::config::{Config, PeriodicOverrides};
use crate::desktop::{LsofSession, OcrToastReader, ProtonVpn, XdotoolFocus, XdotoolRefresh};
use crate::orchestrator::{Orchestrator, ThreadSleep};
use crate::vpn::{RandomChooser, RotationController, VpnServerPool};
use crate::watcher::DomainWatcher;

/// Keeps FreeTube's cache free of stale YouTube data.
#[derive(Debug, Parser)]
#[command(name = "tubeflush", version, about)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/tubeflush/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Clear the cache on a fixed interval and refresh when safe; rotate the VPN on block messages.
    Periodic {
        /// Path to the cache directory to clear
        #[arg(long)]
        cache_dir: Option<String>,
        /// Name of the application window to monitor
        #[arg(long)]
        app_name: Option<String>,
        /// Refresh interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Clear the cache and refresh whenever HTTPS traffic to a watched domain is captured.
    Watch,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = match &cli.config {
        Some(p) => p.clone(),
        None => match paths::config_file_path() {
            Some(p) => p,
            None => {
                tracing::warn!("Neither XDG_CONFIG_HOME nor HOME is set; using built-in defaults");
                return Ok(Config::default());
            }
        },
    };
    tracing::debug!("Loading config from {}", path.display());
    config::load_or_default(&path)
}

fn run_periodic(config: Config) {
    let p = &config.periodic;
    let orchestrator = Orchestrator {
        app_name: p.app_name.clone(),
        cache_dir: p.cache_path(),
        settle: Duration::from_secs(p.settle_secs),
        focus: XdotoolFocus,
        session: LsofSession { domain: p.session_domain.clone() },
        cache: FsCacheStore,
        actuator: XdotoolRefresh,
    };
    let mut rotation = RotationController::new(
        &config.vpn.keywords,
        VpnServerPool::new(config.vpn.region.clone(), config.vpn.pool_size),
        Duration::from_secs(config.vpn.settle_secs),
        ProtonVpn,
        RandomChooser,
    );

    tracing::info!("Starting periodic refresher for {}...", p.app_name);
    periodic::run(
        &orchestrator,
        &OcrToastReader,
        &mut rotation,
        &ThreadSleep,
        Duration::from_secs(p.interval_secs),
    );
}

fn run_watch(config: Config) -> Result<()> {
    let w = &config.watch;
    let orchestrator = Orchestrator {
        app_name: w.app_name.clone(),
        cache_dir: w.cache_path(),
        settle: Duration::from_secs(w.settle_secs),
        focus: XdotoolFocus,
        session: LsofSession { domain: config.periodic.session_domain.clone() },
        cache: FsCacheStore,
        actuator: XdotoolRefresh,
    };
    let watcher = DomainWatcher::new(w.domains.clone());
    let mut packets = capture::TcpdumpCapture::spawn(capture::HTTPS_FILTER)?;

    tracing::info!("Monitoring HTTPS requests to {:?}...", w.domains);
    let handled = watch::run(&watcher, &mut packets, &orchestrator, &ThreadSleep);
    packets.finish().context("Packet capture failed")?;
    anyhow::bail!("Packet capture ended after {handled} matched packet(s)")
}

/// How long a failed worker waits for a Ctrl+C that may already be in flight.
const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, PartialEq)]
enum Exit {
    Interrupted,
    Finished,
    Failed(String),
}

/// Races the worker against `interrupt`. Ctrl+C reaches tcpdump too, so the
/// worker can fail just before the interrupt is seen here; a failure only
/// counts if no interrupt follows within `grace`.
async fn supervise<W, I>(worker: W, interrupt: I, grace: Duration) -> Exit
where
    W: Future<Output = Result<()>>,
    I: Future<Output = ()>,
{
    tokio::pin!(worker);
    tokio::pin!(interrupt);

    let failure = tokio::select! {
        biased;
        _ = &mut interrupt => return Exit::Interrupted,
        res = &mut worker => match res {
            Ok(()) => return Exit::Finished,
            Err(e) => e,
        },
    };
    match tokio::time::timeout(grace, &mut interrupt).await {
        Ok(()) => Exit::Interrupted,
        Err(_) => Exit::Failed(format!("{failure:#}")),
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("[config] {e:#}");
            std::process::exit(1);
        }
    };
    if let Mode::Periodic { cache_dir, app_name, interval } = &cli.mode {
        config.apply_periodic_overrides(PeriodicOverrides {
            cache_dir: cache_dir.clone(),
            app_name: app_name.clone(),
            interval_secs: *interval,
        });
    }
    if let Err(e) = config.validate() {
        tracing::error!("[config] Invalid configuration: {e:#}");
        std::process::exit(1);
    }

    // ── Dependencies ──────────────────────────────────────────────────────────
    let tools = match cli.mode {
        Mode::Periodic { .. } => preflight::PERIODIC_TOOLS,
        Mode::Watch => preflight::WATCH_TOOLS,
    };
    if let Err(e) = preflight::require_tools(tools) {
        tracing::error!("{e}");
        std::process::exit(1);
    }

    tracing::info!("tubeflush v{} started", env!("CARGO_PKG_VERSION"));

    // ── Main loop ─────────────────────────────────────────────────────────────
    // The loops block on subprocesses and sleeps, so they run on the blocking
    // pool while this task waits for Ctrl+C.
    let handle = tokio::task::spawn_blocking(move || match cli.mode {
        Mode::Periodic { .. } => {
            run_periodic(config);
            Ok(())
        }
        Mode::Watch => run_watch(config),
    });

    let worker = async move { handle.await.context("Monitor thread panicked").and_then(|r| r) };
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Unable to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    match supervise(worker, interrupt, INTERRUPT_GRACE).await {
        Exit::Interrupted => {
            tracing::info!("Exiting gracefully...");
            // The blocking worker cannot be cancelled; exiting drops it mid-wait.
            std::process::exit(0);
        }
        Exit::Finished => {}
        Exit::Failed(e) => {
            tracing::error!("Error monitoring network traffic: {e}");
            std::process::exit(1);
        }
    }
}
