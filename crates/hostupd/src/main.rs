// # hostupd - Hostup Dynamic DNS Client
//
// Thin integration layer: parses the command line, builds the components
// from configuration, and hands control to hostup-core. All reconciliation,
// retry and persistence logic lives in hostup-core.
//
// ## Modes
//
// - `run`: daemon; reconciles every `--interval-secs` until SIGTERM/SIGINT.
//   SIGHUP triggers an immediate cycle.
// - `once`: a single cycle, for cron or systemd timers
// - `status`: published record and local state, as JSON
// - `zones`, `records`, `add`, `delete`, `delete-domain`: raw API maintenance
// - `lego`: DNS-01 hook for lego's exec provider
//
// ## Example
//
// ```bash
// export HOSTUP_DNS_CLIENT_API_KEY=your_key
// export HOSTUP_HOSTNAME=home.example.org
// export HOSTUP_STATE_PATH=/var/lib/hostup/state.json
//
// hostupd run
// ```

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, validate_domain_name};
use hostup_core::config::{ClientConfig, StateStoreConfig};
use hostup_core::engine::{EngineEvent, FailureKind, ReconciliationEngine, UpdateOutcome};
use hostup_core::scheduler::{Scheduler, TriggerHandle};
use hostup_core::state::{FileStateStore, MemoryStateStore};
use hostup_core::traits::{ProviderClient, ReconciliationState, StateStore};
use hostup_core::{Error, ProviderError, shutdown};
use hostup_provider::{HostupProvider, NewRecord};
use hostup_resolver_http::HttpAddressResolver;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// TTL for records created by the maintenance commands when none is given
const DEFAULT_TTL: u32 = 3600;

/// Grace period on top of the cycle timeout when stopping the daemon
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown or successful command
/// - 1: Configuration or usage error
/// - 2: Runtime error, or a retryable failure in `once` mode
/// - 3: Fatal provider failure (bad key, unknown zone, rejected request)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostupExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
    FatalProviderError = 3,
}

impl From<HostupExitCode> for ExitCode {
    fn from(code: HostupExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                HostupExitCode::ConfigError.into()
            } else {
                HostupExitCode::Success.into()
            };
        }
    };

    let log_level = match cli.global.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HostupExitCode::ConfigError.into();
        }
    };

    // Logs go to stderr so command output on stdout stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HostupExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HostupExitCode::RuntimeError.into();
        }
    };

    rt.block_on(execute(cli)).into()
}

async fn execute(cli: Cli) -> HostupExitCode {
    let Cli { global, command } = cli;

    match command {
        Command::Run(args) => match args.client_config(&global) {
            Ok(config) => finish(run_daemon(config).await),
            Err(e) => config_error(e),
        },
        Command::Once(args) => match args.client_config(&global) {
            Ok(config) => finish(run_once(config).await),
            Err(e) => config_error(e),
        },
        Command::Status(args) => match args.client_config(&global) {
            Ok(config) => finish(show_status(config).await),
            Err(e) => config_error(e),
        },
        command => {
            let provider = match global
                .provider_config()
                .and_then(|config| Ok(HostupProvider::new(&config, DEFAULT_TTL)?))
            {
                Ok(provider) => provider,
                Err(e) => return config_error(e),
            };
            finish(run_maintenance(&provider, command).await)
        }
    }
}

fn config_error(err: anyhow::Error) -> HostupExitCode {
    error!("Configuration error: {:#}", err);
    HostupExitCode::ConfigError
}

/// Map a command's result onto an exit code
fn finish(result: Result<HostupExitCode>) -> HostupExitCode {
    let err = match result {
        Ok(code) => return code,
        Err(err) => err,
    };

    error!("{:#}", err);
    if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        if provider_err.is_retryable() {
            HostupExitCode::RuntimeError
        } else {
            HostupExitCode::FatalProviderError
        }
    } else if let Some(Error::Config(_) | Error::InvalidInput(_)) = err.downcast_ref::<Error>() {
        HostupExitCode::ConfigError
    } else {
        HostupExitCode::RuntimeError
    }
}

async fn build_state_store(config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
    Ok(match config {
        StateStoreConfig::File { path } => Box::new(FileStateStore::new(path).await?),
        StateStoreConfig::Memory => {
            warn!("No state path configured; state will not survive a restart");
            Box::new(MemoryStateStore::new())
        }
    })
}

async fn build_engine(
    config: &ClientConfig,
) -> Result<(ReconciliationEngine, mpsc::Receiver<EngineEvent>)> {
    let resolver = HttpAddressResolver::new(&config.resolver)?;
    let provider = HostupProvider::from_config(config)?;
    let store = build_state_store(&config.state_store).await?;

    info!(
        "Managing {} record for {} (ttl {}, mode: {})",
        config.record.record_type,
        config.record.hostname,
        config.record.ttl,
        if config.provider.dry_run { "DRY-RUN" } else { "LIVE" }
    );

    let (engine, events) = ReconciliationEngine::new(
        Box::new(resolver),
        Box::new(provider),
        store,
        config.clone(),
    )?;
    Ok((engine, events))
}

/// Drain engine events into the log
///
/// The engine already logs every decision; events are only echoed at debug
/// level so the channel never fills.
fn spawn_event_logger(mut events: mpsc::Receiver<EngineEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    })
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: ClientConfig) -> Result<HostupExitCode> {
    let (engine, events) = build_engine(&config).await?;
    let events_task = spawn_event_logger(events);

    let scheduler = Scheduler::new(Arc::new(engine), &config.schedule);
    let triggers = scheduler.trigger_handle();
    let (trigger, shutdown) = shutdown::channel();

    info!(
        "Starting hostupd daemon (interval {}s)",
        config.schedule.interval_secs
    );
    let mut scheduler_task = tokio::spawn(scheduler.run(shutdown));

    let signal = tokio::select! {
        signal = wait_for_signals(triggers) => signal?,
        joined = &mut scheduler_task => {
            joined.context("Scheduler task failed")?;
            anyhow::bail!("Scheduler stopped unexpectedly");
        }
    };

    info!("Received shutdown signal: {}", signal);
    trigger.trigger();

    // An in-flight cycle is bounded by its own deadline
    let grace = config.engine.cycle_timeout().saturating_add(SHUTDOWN_GRACE);
    match tokio::time::timeout(grace, scheduler_task).await {
        Ok(joined) => joined.context("Scheduler task failed")?,
        Err(_) => anyhow::bail!("Shutdown timeout after {:?}", grace),
    }

    let _ = events_task.await;
    info!("hostupd stopped");
    Ok(HostupExitCode::Success)
}

/// Run a single cycle and report its outcome
async fn run_once(config: ClientConfig) -> Result<HostupExitCode> {
    let (engine, events) = build_engine(&config).await?;
    let events_task = spawn_event_logger(events);

    // A signal abandons pending retries; the cycle still persists its state
    let (trigger, shutdown) = shutdown::channel();
    let signal_task = tokio::spawn(async move {
        if let Ok(signal) = wait_for_shutdown_signal().await {
            info!("Received shutdown signal: {}", signal);
            trigger.trigger();
        }
    });

    let report = engine.run_cycle(&shutdown).await;
    signal_task.abort();
    drop(engine);
    let _ = events_task.await;

    let code = match &report.outcome {
        UpdateOutcome::NoChangeNeeded => {
            info!("{} is up to date", config.record.hostname);
            HostupExitCode::Success
        }
        UpdateOutcome::Updated(record) => {
            info!("Updated {}", record);
            HostupExitCode::Success
        }
        UpdateOutcome::Failed {
            kind: FailureKind::Cancelled,
            ..
        } => {
            warn!("Cycle cancelled by shutdown");
            HostupExitCode::RuntimeError
        }
        UpdateOutcome::Failed { kind, retryable } => {
            error!(
                "Update failed after {} attempt(s): {} (retryable: {})",
                report.attempts, kind, retryable
            );
            if *retryable {
                HostupExitCode::RuntimeError
            } else {
                HostupExitCode::FatalProviderError
            }
        }
    };

    if let Some(e) = &report.persist_error {
        error!("Failed to persist state: {}", e);
        if code == HostupExitCode::Success {
            return Ok(HostupExitCode::RuntimeError);
        }
    }

    Ok(code)
}

/// Print the published record and the local state as JSON
async fn show_status(config: ClientConfig) -> Result<HostupExitCode> {
    let provider = HostupProvider::from_config(&config)?;
    let hostname = &config.record.hostname;

    let published = match provider
        .fetch_current_record(hostname, config.record.record_type)
        .await
    {
        Ok(record) => Some(record),
        Err(ProviderError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let (state, state_path) = local_state(&config.state_store).await?;

    let in_sync = match (&published, &state.last_applied_address) {
        (Some(published), Some(applied)) => published.address() == applied.address(),
        _ => false,
    };

    let status = serde_json::json!({
        "hostname": hostname,
        "recordType": config.record.record_type,
        "published": published,
        "inSync": in_sync,
        "statePath": state_path,
        "state": state,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);

    Ok(HostupExitCode::Success)
}

/// Persisted state and the file it came from, if any
async fn local_state(config: &StateStoreConfig) -> Result<(ReconciliationState, Option<PathBuf>)> {
    match config {
        StateStoreConfig::File { path } => {
            let store = FileStateStore::new(path).await?;
            let state = store.load().await?;
            Ok((state, Some(store.path().to_path_buf())))
        }
        StateStoreConfig::Memory => Ok((ReconciliationState::default(), None)),
    }
}

/// Raw zone and record commands
async fn run_maintenance(provider: &HostupProvider, command: Command) -> Result<HostupExitCode> {
    match command {
        Command::Zones => {
            for zone in provider.list_zones().await? {
                println!("{}", zone);
            }
        }
        Command::Records { zone_id } => {
            let zone = provider.list_records(&zone_id).await?;
            println!("{} (zone {})", zone.domain, zone.id);
            for record in &zone.records {
                println!("{}", record);
            }
        }
        Command::Add {
            zone_id,
            record_type,
            name,
            value,
            ttl,
        } => {
            validate_domain_name(&name).map_err(|e| Error::config(e.to_string()))?;
            if ttl == 0 {
                return Err(Error::config("TTL must be > 0").into());
            }
            let record = NewRecord::new(
                record_type.to_uppercase(),
                name.trim_end_matches('.'),
                value,
                ttl,
            );
            println!("{}", provider.add_record(&zone_id, &record).await?);
        }
        Command::Delete { zone_id, record_id } => {
            let message = provider.delete_record(&zone_id, &record_id).await?;
            println!("{}", message.unwrap_or_else(|| format!("Deleted record {}", record_id)));
        }
        Command::DeleteDomain { domain } => {
            validate_domain_name(&domain).map_err(|e| Error::config(e.to_string()))?;
            let deleted = provider.delete_domain(&domain).await?;
            if deleted.is_empty() {
                println!("No records found for {}", domain);
            }
            for record in &deleted {
                println!("deleted {}", record);
            }
        }
        Command::Lego {
            action,
            domain,
            value,
        } => {
            validate_domain_name(&domain).map_err(|e| Error::config(e.to_string()))?;
            let record = provider.lego(action, &domain, &value).await?;
            info!("lego {} succeeded for {}", action, domain);
            println!("{}", record);
        }
        Command::Run(_) | Command::Once(_) | Command::Status(_) => {
            anyhow::bail!("not a maintenance command")
        }
    }

    Ok(HostupExitCode::Success)
}

/// Wait for SIGTERM or SIGINT, turning SIGHUP into a manual trigger
#[cfg(unix)]
async fn wait_for_signals(triggers: TriggerHandle) -> Result<&'static str> {
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => return signal,
            _ = sighup.recv() => {
                if triggers.trigger() {
                    info!("SIGHUP received, triggering reconciliation");
                } else {
                    warn!("SIGHUP received but a trigger is already pending");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_triggers: TriggerHandle) -> Result<&'static str> {
    wait_for_shutdown_signal().await
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
