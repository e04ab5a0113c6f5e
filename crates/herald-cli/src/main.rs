//! Herald binary: one supervised bot instance per process.

use clap::Parser;
use herald_cli::cli::Cli;
use herald_cli::collaborators::default_collaborators;
use herald_cli::config::AppConfig;
use herald_cli::error::{CliError, Result};
use herald_cli::setup::{self, InstancePaths};
use herald_control::ControlState;
use herald_core::config::DEFAULT_CONTROL_PORT;
use herald_core::transport::{DisconnectCause, TransportEvent};
use herald_core::types::{
    normalize_phone, BoundUser, ConnectionState, InstanceId, InstanceIdentity, Jid,
};
use herald_runtime::stub::{ScriptedConnector, ScriptedSession, StubTransport};
use herald_runtime::tasks::ProcStatusSampler;
use herald_runtime::{spawn_cache_flush, spawn_memory_watchdog, EventCache, SessionStore, Supervisor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    install_panic_hook();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "herald failed to start");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = AppConfig::load(&cli)?;

    let phone_number = cli
        .phone_number
        .as_deref()
        .map(normalize_phone)
        .filter(|p| !p.is_empty());
    let identity = InstanceIdentity {
        instance_id: InstanceId::new(&cli.instance_id),
        phone_number,
        control_port: cli.control_port.unwrap_or(DEFAULT_CONTROL_PORT),
    };
    info!(
        instance = %identity.instance_id,
        control_port = identity.control_port,
        "starting herald instance"
    );

    let paths = InstancePaths::resolve(&config.paths.base_dir, &identity.instance_id);
    setup::prepare(&paths, config.paths.template_dir.as_deref())?;

    let store = Arc::new(SessionStore::new(&paths.session_dir));
    let cache = Arc::new(EventCache::new(paths.events_file(), &config.herald.cache));
    cache.load_from_disk().await?;

    if !cli.loopback {
        return Err(CliError::Setup(
            "no external transport backend is compiled into this build; run with --loopback"
                .to_string(),
        ));
    }
    let connector = loopback_connector(&identity);

    let root = CancellationToken::new();
    let (supervisor, status) = Supervisor::new(
        identity.clone(),
        connector,
        store,
        cache.clone(),
        default_collaborators(&config.bot),
        config.herald.supervisor.clone(),
        root.clone(),
    );

    let control_state = ControlState::new(status, root.clone(), &config.herald.control);
    let control_task = tokio::spawn(herald_control::serve(
        identity.control_port,
        control_state,
        root.clone(),
    ));

    let flush_task = spawn_cache_flush(cache, config.herald.cache.clone(), root.clone());
    let (breach_tx, mut breach_rx) = mpsc::channel(1);
    let watchdog_task =
        spawn_memory_watchdog(ProcStatusSampler, config.herald.memory.clone(), root.clone(), breach_tx);

    let mut supervisor_task = tokio::spawn(supervisor.run());

    let mut exit_code = 0;
    tokio::select! {
        result = &mut supervisor_task => {
            match result {
                Ok(ConnectionState::LoggedOut) => {
                    warn!("instance logged out; exiting so a fresh pairing can be initiated");
                }
                Ok(state) => info!(state = %state, "supervisor finished"),
                Err(e) => {
                    error!(error = %e, "supervisor task failed");
                    exit_code = 1;
                }
            }
        }
        Some(rss) = breach_rx.recv() => {
            error!(rss_bytes = rss, "memory limit exceeded; terminating for a clean restart");
            exit_code = 1;
        }
        _ = root.cancelled() => {
            info!("stop requested");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
        }
    }

    // Wind everything down; the flush task writes its final snapshot before
    // exiting.
    root.cancel();
    let _ = flush_task.await;
    let _ = watchdog_task.await;
    if !supervisor_task.is_finished() {
        let _ = supervisor_task.await;
    }
    if let Ok(Err(e)) = control_task.await {
        warn!(error = %e, "control surface error during shutdown");
    }

    info!("herald instance stopped");
    Ok(exit_code)
}

// ----------------------------------------------------------------------------
// Loopback Transport
// ----------------------------------------------------------------------------

/// An in-process session for running an instance with no network: the link
/// opens after a settle delay (long enough for the pairing flow to surface
/// on first run) and then stays quiet until shutdown.
fn loopback_connector(identity: &InstanceIdentity) -> Arc<ScriptedConnector> {
    let user = identity
        .phone_number
        .clone()
        .unwrap_or_else(|| "loopback".to_string());
    let session = ScriptedSession::new(
        StubTransport::with_pairing_code("HRLD1234CODE"),
        vec![
            (
                Duration::from_secs(10),
                TransportEvent::Open {
                    user: BoundUser {
                        jid: Jid::normalize(&user),
                        name: None,
                    },
                },
            ),
            (
                Duration::from_secs(60 * 60 * 24 * 30),
                TransportEvent::Close {
                    cause: DisconnectCause::ConnectionLost {
                        reason: "loopback shutdown".to_string(),
                    },
                },
            ),
        ],
    );
    ScriptedConnector::new(vec![session])
}

// ----------------------------------------------------------------------------
// Process Plumbing
// ----------------------------------------------------------------------------

/// Logging via tracing-subscriber; `RUST_LOG` wins, `--verbose` lifts the
/// default to debug.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Panics anywhere in the process get a structured log line before the
/// default hook aborts the task.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(panic = %info, "panic");
        default_hook(info);
    }));
}
