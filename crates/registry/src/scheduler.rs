//! Background sweep task for the context registry.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::ContextRegistry;

/// Handle to the periodic cleanup task.
///
/// The task holds only a weak reference, so dropping the last registry
/// handle ends it on the next tick.
#[derive(Debug)]
pub struct CleanupScheduler {
    interval: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CleanupScheduler {
    /// Spawns the sweep loop on the current Tokio runtime.
    ///
    /// Returns `None` for a zero interval or when called outside a runtime.
    pub fn start(registry: Weak<ContextRegistry>, interval: Duration) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No Tokio runtime, background cleanup disabled");
                return None;
            }
        };

        let token = CancellationToken::new();
        let handle = runtime.spawn(run_sweeps(registry, interval, token.clone()));

        info!(interval_secs = interval.as_secs(), "Cleanup scheduler started");
        Some(Self {
            interval,
            token,
            handle,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signals the loop to exit. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the loop and waits for the task to finish.
    pub async fn join(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                error!("Cleanup scheduler panicked: {}", e);
            }
        }
    }
}

async fn run_sweeps(registry: Weak<ContextRegistry>, period: Duration, token: CancellationToken) {
    // First sweep one full period after start
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.perform_global_cleanup();
            }
        }
    }

    debug!("Cleanup scheduler stopped");
}
