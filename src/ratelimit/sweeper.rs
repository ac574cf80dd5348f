//! Background eviction of idle rate limit state.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::RateLimiter;

/// Spawn a task that sweeps idle keys from `limiter` every `every`.
///
/// The task runs until the returned handle is aborted.
pub fn spawn_sweeper(limiter: Arc<dyn RateLimiter>, every: Duration) -> JoinHandle<()> {
    info!(interval = ?every, "Starting idle key sweeper");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let removed = limiter.sweep_idle();
            debug!(
                removed,
                remaining = limiter.tracked_keys(),
                algorithm = %limiter.algorithm(),
                "Swept idle keys"
            );
        }
    })
}
