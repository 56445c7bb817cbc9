// Run guard and bounded whole-run restarts.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

/// Owned by the process entry point and passed by reference into the
/// pipeline. Only one run may hold it at a time.
#[derive(Debug, Default)]
pub struct RunHandle {
    active: AtomicBool,
}

impl RunHandle {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Fails with `AlreadyRunning` while another guard is alive
    pub fn try_acquire(&self) -> AppResult<RunGuard<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AppError::AlreadyRunning)?;
        Ok(RunGuard { handle: self })
    }
}

/// Releases the run handle on drop, including on early return and panic
#[derive(Debug)]
pub struct RunGuard<'a> {
    handle: &'a RunHandle,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.handle.active.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts after the first attempt; 0 disables restarting
    pub max_restarts: u32,
    pub initial_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

impl RestartPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_secs(300),
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

/// Run `run` and restart it after a restartable failure, at most
/// `policy.max_restarts` times, doubling the pause each time.
///
/// Non-restartable errors (roster validation, configuration, re-entry) are
/// returned immediately. Exhaustion yields `RestartsExhausted` carrying the
/// last failure.
pub async fn supervise<T, F, Fut>(policy: RestartPolicy, mut run: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut backoff = policy.backoff();
    let mut restarts = 0u32;

    loop {
        let err = match run().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_restartable() {
            error!("❌ Run failed with a non-restartable error: {}", err);
            return Err(err);
        }

        if restarts >= policy.max_restarts {
            error!(
                restarts,
                "❌ Run failed and the restart limit is reached: {}", err
            );
            return Err(AppError::RestartsExhausted {
                restarts,
                last_error: err.to_string(),
            });
        }

        let pause = backoff.next_backoff().unwrap_or(policy.initial_backoff);
        restarts += 1;
        warn!(
            restart = restarts,
            max_restarts = policy.max_restarts,
            pause_ms = pause.as_millis() as u64,
            "🔁 Run failed, restarting: {}",
            err
        );
        tokio::time::sleep(pause).await;
        info!("🔁 Restarting distribution run");
    }
}
