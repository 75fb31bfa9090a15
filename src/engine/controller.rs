//! Run controller: the caller-facing surface.
//!
//! Starts at most one run at a time on a background task, forwards stop
//! requests to it, and exposes its event stream and progress to the binary
//! and the dashboard. Setup faults (bad credential, client construction)
//! happen inside the run task and end it with a fatal event.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::engine::cancel::RunFlag;
use crate::engine::events::EventLog;
use crate::engine::executor::{SwapClient, SwapExecutor};
use crate::engine::orchestrator::Orchestrator;
use crate::platforms::jupiter::JupiterClient;
use crate::platforms::solana::SolanaLedger;
use crate::types::{LogEvent, RunEnd, RunProgress};
use crate::wallet;

/// The production client type.
pub type LiveClient = SwapExecutor<JupiterClient, SolanaLedger>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("A run is already in progress")]
    AlreadyRunning,
}

struct ActiveRun {
    flag: RunFlag,
    handle: JoinHandle<()>,
    done: watch::Receiver<Option<RunEnd>>,
}

/// Owns the lifecycle of runs.
pub struct RunController {
    events: EventLog,
    progress: Arc<watch::Sender<RunProgress>>,
    active: Mutex<Option<ActiveRun>>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new(EventLog::default())
    }
}

impl RunController {
    pub fn new(events: EventLog) -> Self {
        let (progress, _) = watch::channel(RunProgress::default());
        Self {
            events,
            progress: Arc::new(progress),
            active: Mutex::new(None),
        }
    }

    /// Start a live run against Jupiter and the configured RPC endpoint.
    pub async fn start_run(&self, config: Arc<RunConfig>) -> Result<()> {
        self.start_inner(config, |cfg, events| live_client(cfg, events))
            .await
    }

    /// Start a run with an injected client.
    pub async fn start_with_client<C>(&self, config: Arc<RunConfig>, client: C) -> Result<()>
    where
        C: SwapClient + 'static,
    {
        self.start_inner(config, move |_, _| Ok(client)).await
    }

    async fn start_inner<C, F>(&self, config: Arc<RunConfig>, setup: F) -> Result<()>
    where
        C: SwapClient + 'static,
        F: FnOnce(&RunConfig, &EventLog) -> Result<C> + Send + 'static,
    {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            return Err(ControlError::AlreadyRunning.into());
        }

        self.events.clear();
        self.progress.send_replace(RunProgress {
            running: true,
            target: config.trade_count,
            ..RunProgress::default()
        });

        let flag = RunFlag::new();
        let events = self.events.clone();
        let progress = self.progress.clone();
        let run_flag = flag.clone();
        let (done_tx, done) = watch::channel(None);

        let handle = tokio::spawn(async move {
            let end = match setup(&config, &events) {
                Ok(client) => {
                    let trade_count = config.trade_count;
                    let mut orchestrator = Orchestrator::new(client, config, events.clone(), run_flag)
                        .with_progress(progress);
                    let end = orchestrator.run().await;
                    if end == RunEnd::Completed {
                        events.info(format!("All {trade_count} trades completed"));
                    }
                    end
                }
                Err(err) => {
                    error!(error = %format!("{err:#}"), "Run setup failed");
                    events.error(format!("Fatal error: {err:#}"));
                    progress.send_modify(|p| p.running = false);
                    RunEnd::Fatal(format!("{err:#}"))
                }
            };
            events.info(format!("Task finished ({end})"));
            done_tx.send_replace(Some(end));
        });

        *active = Some(ActiveRun { flag, handle, done });
        Ok(())
    }

    /// Request a stop. Observed before the next leg; a leg in flight
    /// completes first. No-op when idle.
    pub async fn cancel_run(&self) {
        if let Some(run) = self.active.lock().await.as_ref() {
            if run.flag.is_running() {
                info!("Stop requested");
                run.flag.cancel();
            }
        }
    }

    /// Wait for the latest run to end. `None` when nothing was started.
    ///
    /// Safe to drop mid-wait; the run keeps going and can still be
    /// cancelled or waited on again.
    pub async fn wait(&self) -> Option<RunEnd> {
        let mut done = self.active.lock().await.as_ref()?.done.clone();
        let end = match done.wait_for(Option::is_some).await {
            Ok(end) => end.clone(),
            Err(_) => None,
        };
        Some(end.unwrap_or_else(|| {
            self.progress.send_modify(|p| p.running = false);
            RunEnd::Fatal("run task aborted".into())
        }))
    }

    pub fn is_running(&self) -> bool {
        self.progress.borrow().running
    }

    pub fn progress(&self) -> RunProgress {
        self.progress.borrow().clone()
    }

    /// Live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

/// Decode the credential and connect the live venues.
pub fn live_client(config: &RunConfig, events: &EventLog) -> Result<LiveClient> {
    let keypair =
        wallet::keypair_from_secret(&config.private_key).context("Invalid private key")?;
    let api_key = config
        .api_key
        .as_ref()
        .map(|k| SecretString::new(k.expose_secret().clone()));
    let api = JupiterClient::new(&config.jupiter_url, api_key)?;
    let ledger = SolanaLedger::new(&config.rpc_url);

    events.info(format!(
        "Bot started for wallet {}",
        wallet::short_pubkey(&keypair)
    ));

    Ok(SwapExecutor::new(
        api,
        ledger,
        keypair,
        config.tokens.clone(),
        Duration::from_secs(config.policy.confirm_timeout_secs),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
