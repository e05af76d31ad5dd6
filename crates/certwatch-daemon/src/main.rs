use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use certwatch_acme::AcmeShIssuer;
use certwatch_core::CertwatchConfig;
use certwatch_notify::{Notification, NotificationManager, NotifyStatus};
use certwatch_probe::TlsProbe;
use certwatch_scheduler::{RenewalCycle, SchedulerEngine, StateStore};

/// How long to wait before re-reading a configuration that failed to
/// validate in watch mode.
const CONFIG_RETRY_WAIT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "certwatch", version, about = "Wildcard TLS certificate renewal automation")]
struct Cli {
    /// Path to the TOML config file. Falls back to the CERTWATCH_CONFIG
    /// environment variable, then ~/.certwatch/certwatch.toml.
    #[arg(short, long)]
    config: Option<String>,

    /// Defaults to `watch` when omitted.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one renewal cycle and exit.
    Run,
    /// Run the long-lived scheduler loop.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CERTWATCH_CONFIG").ok());

    match cli.command.unwrap_or(Command::Watch) {
        Command::Run => run_once(config_path.as_deref()).await,
        Command::Watch => watch(config_path.as_deref()).await,
    }
}

/// Single-shot mode. Exit codes: 0 on skip or renewal, 1 on a failed cycle,
/// 2 on invalid configuration.
async fn run_once(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path);

    if let Err(e) = config.validate() {
        error!(error = %e, "configuration is invalid");
        notify_config_failure(&config, &e.to_string()).await;
        std::process::exit(2);
    }

    let (cycle, _store) = build_cycle(&config)?;
    let outcome = cycle.run().await;
    if outcome.is_failure() {
        std::process::exit(1);
    }
    Ok(())
}

/// Long-running mode. An invalid configuration is retried rather than fatal,
/// so the service can recover once the operator fixes it.
async fn watch(config_path: Option<&str>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("interrupt received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let mut config_shutdown = shutdown_rx.clone();
    let config = loop {
        let config = load_config(config_path);
        match config.validate() {
            Ok(()) => break config,
            Err(e) => {
                error!(
                    error = %e,
                    retry_secs = CONFIG_RETRY_WAIT.as_secs(),
                    "configuration is invalid, waiting before retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(CONFIG_RETRY_WAIT) => {}
                    _ = config_shutdown.changed() => {}
                }
                if *config_shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    };

    let (cycle, store) = build_cycle(&config)?;
    let engine = SchedulerEngine::new(config, cycle, store);
    engine.run(shutdown_rx).await;
    Ok(())
}

/// Explicit path > CERTWATCH_CONFIG > ~/.certwatch/certwatch.toml; an
/// unreadable file degrades to defaults, which validation then reports.
fn load_config(config_path: Option<&str>) -> Arc<CertwatchConfig> {
    let config = CertwatchConfig::load(config_path).unwrap_or_else(|e| {
        warn!("Config load failed ({e}), using defaults");
        CertwatchConfig::default()
    });
    Arc::new(config)
}

fn build_cycle(config: &Arc<CertwatchConfig>) -> anyhow::Result<(RenewalCycle, StateStore)> {
    let domain = config.domain().to_string();
    let probe = TlsProbe::new(Duration::from_secs(config.scheduler.probe_timeout_secs))?;
    let issuer = AcmeShIssuer::new(config.clone());
    let notifier = NotificationManager::from_config(&config.notifiers)?;
    let store = StateStore::new(&config.scheduler.state_path);

    info!(
        %domain,
        state_path = %config.scheduler.state_path,
        notifiers = notifier.backends(),
        "certwatch configured"
    );

    let cycle = RenewalCycle::new(
        config.clone(),
        domain,
        Arc::new(probe),
        Arc::new(issuer),
        Arc::new(notifier),
        store.clone(),
    );
    Ok((cycle, store))
}

/// A broken configuration is still worth a notification when any notifier
/// sections did load.
async fn notify_config_failure(config: &CertwatchConfig, detail: &str) {
    let manager = match NotificationManager::from_config(&config.notifiers) {
        Ok(manager) => manager,
        Err(e) => {
            warn!(error = %e, "notifiers unavailable for the configuration error report");
            return;
        }
    };

    let domain = if config.domain().is_empty() {
        "unknown"
    } else {
        config.domain()
    };
    let note = Notification::new(
        NotifyStatus::Failure,
        domain,
        format!("Configuration error: {detail}"),
        None,
    );
    manager.dispatch(&note).await;
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "could not install the SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
