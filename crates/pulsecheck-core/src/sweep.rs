//! Scheduler loop.
//!
//! Drives [`CheckinEngine::sweep_once`] on a fixed interval. The loop owns
//! no authoritative state: every tick re-reads persisted due times, so a
//! process restart simply resumes sweeping from storage.
//!
//! Shutdown is graceful by construction: the shutdown signal is only
//! observed between sweeps, and an in-flight sweep always runs to
//! completion before the loop exits. Per-user transactions inside the
//! engine guarantee no status is ever left mid-transition.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::engine::CheckinEngine;

/// Handle to stop a running [`SweepLoop`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Ask the loop to stop after the current sweep, if one is running.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Recurring sweep over all due users.
pub struct SweepLoop {
    engine: Arc<CheckinEngine>,
    interval: std::time::Duration,
    shutdown: watch::Receiver<bool>,
}

impl SweepLoop {
    /// Build a loop and its shutdown handle. The interval usually comes
    /// from `config.sweep.interval_secs`.
    pub fn new(engine: Arc<CheckinEngine>, interval: std::time::Duration) -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                engine,
                interval,
                shutdown: rx,
            },
            ShutdownHandle { tx },
        )
    }

    /// Run until shutdown. The first sweep fires immediately, resuming from
    /// persisted due times.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "sweep loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let engine = Arc::clone(&self.engine);
                    // Storage work is blocking; keep it off the async workers.
                    let result =
                        tokio::task::spawn_blocking(move || engine.sweep_once(Utc::now())).await;
                    match result {
                        Ok(Ok(outcome)) => {
                            if outcome.transitions > 0 || outcome.failures > 0 {
                                tracing::info!(
                                    scanned = outcome.scanned,
                                    transitions = outcome.transitions,
                                    failures = outcome.failures,
                                    "sweep finished"
                                );
                            } else {
                                tracing::debug!(scanned = outcome.scanned, "sweep finished");
                            }
                        }
                        Ok(Err(e)) => {
                            // The due scan itself failed; nothing was lost,
                            // the next tick retries from storage.
                            tracing::error!(error = %e, "sweep failed");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "sweep task panicked");
                        }
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("sweep loop stopped");
    }
}
