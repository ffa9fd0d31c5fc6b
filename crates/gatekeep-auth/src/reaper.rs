//! Background reaper for expired registry state.
//!
//! One reaper runs per registry instance. Each tick takes the registry's
//! write lock for one sweep, evicting blacklist entries, sessions and
//! refresh-token nodes that are past their expiry (plus the grace window),
//! and drops expired authorization codes.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{AuthorizationCodeCache, Registry, SweepStats};

/// Sweeps expired state out of a [`Registry`].
#[derive(Clone)]
pub struct Reaper {
    registry: Arc<dyn Registry>,
    codes: Option<Arc<dyn AuthorizationCodeCache>>,
    grace: time::Duration,
}

impl Reaper {
    /// Creates a reaper for `registry` with the given grace window.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>, grace: time::Duration) -> Self {
        Self {
            registry,
            codes: None,
            grace,
        }
    }

    /// Also drops expired entries from `codes` on every sweep.
    #[must_use]
    pub fn with_code_cache(mut self, codes: Arc<dyn AuthorizationCodeCache>) -> Self {
        self.codes = Some(codes);
        self
    }

    /// Runs one sweep against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns the registry's error if the sweep fails.
    pub async fn run_once(&self, now: OffsetDateTime) -> AuthResult<SweepStats> {
        let stats = self.registry.sweep_expired(now, self.grace).await?;
        let codes = self.codes.as_ref().map_or(0, |c| c.cleanup_expired());
        debug!(
            revoked_access_tokens = stats.revoked_access_tokens,
            sessions = stats.sessions,
            refresh_tokens = stats.refresh_tokens,
            authorization_codes = codes,
            "Reaper sweep finished"
        );
        Ok(stats)
    }

    /// Starts the reaper in a background task, ticking every `period`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a reaper is already running for this registry
    /// or `period` is zero.
    pub fn start(self, period: Duration) -> AuthResult<ReaperHandle> {
        if period.is_zero() {
            return Err(AuthError::internal("reaper interval must be non-zero"));
        }
        if !self.registry.claim_reaper() {
            return Err(AuthError::internal(
                "a reaper is already running for this registry",
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(&self.registry);

        let task = tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "Reaper started");

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once(OffsetDateTime::now_utc()).await {
                            error!(error = %e, "Reaper sweep failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped handle counts as a shutdown request.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Reaper shutting down");
                            break;
                        }
                    }
                }
            }

            registry.release_reaper();
        });

        Ok(ReaperHandle { shutdown_tx, task })
    }
}

/// Handle to a running reaper.
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signals the reaper to stop and waits for it to finish its current
    /// sweep.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Reaper task ended abnormally");
        }
    }

    /// Returns `true` once the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
