//! Cycle Daemon
//!
//! Runs a background loop that watches for the 24-hour cycle boundary
//! and drives one evolution cycle per calendar date. Uses
//! `tokio::time::interval` for the tick loop and `Arc<AtomicBool>` for
//! graceful shutdown signaling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::evolution::EvolutionOrchestrator;
use crate::scheduler::{current_cycle_id, ForegroundProbe};
use crate::types::CycleReport;

/// Options for creating a cycle daemon.
pub struct CycleDaemonOptions {
    /// Tick interval in seconds. Defaults to 300.
    pub tick_interval_secs: u64,
}

impl Default for CycleDaemonOptions {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
        }
    }
}

/// The cycle daemon. Spawns a background tokio task that periodically
/// checks whether a new calendar date has started and, if so, runs one
/// evolution cycle against the shared orchestrator.
pub struct CycleDaemon {
    /// Atomic flag indicating whether the daemon is running.
    running: Arc<AtomicBool>,
    /// Handle to the spawned background task.
    interval_handle: Option<JoinHandle<()>>,
    /// Tick interval in seconds.
    tick_interval_secs: u64,
    /// The orchestrator driven by this daemon. One cycle runs at a time;
    /// the mutex is the single-owner guarantee.
    orchestrator: Arc<Mutex<EvolutionOrchestrator>>,
    foreground: Arc<dyn ForegroundProbe>,
}

/// Create a new cycle daemon from the given options.
pub fn create_cycle_daemon(
    orchestrator: Arc<Mutex<EvolutionOrchestrator>>,
    foreground: Arc<dyn ForegroundProbe>,
    options: CycleDaemonOptions,
) -> CycleDaemon {
    CycleDaemon {
        running: Arc::new(AtomicBool::new(false)),
        interval_handle: None,
        tick_interval_secs: options.tick_interval_secs,
        orchestrator,
        foreground,
    }
}

impl CycleDaemon {
    /// Start the daemon background loop.
    pub fn start(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("Cycle daemon is already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        info!(
            "Starting cycle daemon with {}s tick interval",
            self.tick_interval_secs
        );

        let running = Arc::clone(&self.running);
        let orchestrator = Arc::clone(&self.orchestrator);
        let foreground = Arc::clone(&self.foreground);
        let tick_secs = self.tick_interval_secs;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            let mut last_cycle_run: Option<String> = None;

            loop {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    info!("Cycle daemon stopping");
                    break;
                }

                let today = current_cycle_id();
                if last_cycle_run.as_deref() == Some(today.as_str()) {
                    debug!("Cycle {} already ran, sleeping", today);
                    continue;
                }

                match run_one_cycle(&orchestrator, foreground.as_ref()).await {
                    Ok(report) => {
                        info!(
                            "Cycle {} finished: {}/{} upgrades succeeded",
                            report.cycle, report.upgrades_succeeded, report.upgrades_attempted
                        );
                        last_cycle_run = Some(today);
                    }
                    Err(e) => {
                        // Leave last_cycle_run unset so the next tick retries.
                        error!("Evolution cycle failed: {:#}", e);
                    }
                }
            }
        });

        self.interval_handle = Some(handle);
    }

    /// Stop the daemon gracefully.
    pub fn stop(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            debug!("Cycle daemon is not running");
            return;
        }

        info!("Stopping cycle daemon");
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.interval_handle.take() {
            handle.abort();
        }
    }

    /// Returns whether the daemon is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one cycle immediately, regardless of the daily boundary.
    pub async fn run_now(&self) -> Result<CycleReport> {
        info!("Force-running an evolution cycle");
        run_one_cycle(&self.orchestrator, self.foreground.as_ref()).await
    }
}

/// Execute one cycle while holding exclusive ownership of the
/// orchestrator.
async fn run_one_cycle(
    orchestrator: &Mutex<EvolutionOrchestrator>,
    foreground: &dyn ForegroundProbe,
) -> Result<CycleReport> {
    let mut guard = orchestrator.lock().await;
    guard.run_cycle(foreground).await
}
