//! Periodic driver for the expired-job reaper.
//!
//! Jobs stuck non-terminal past their time-to-live are force-failed
//! through the orchestrator's normal failure path, so side effects and
//! events fire exactly as for an API-driven failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::orchestrator::JobOrchestrator;

/// Ticks [`JobOrchestrator::reap_expired_jobs`] on a fixed interval.
///
/// Never returns; spawn it as a background task:
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # fn demo(orchestrator: Arc<skua_jobs::orchestrator::JobOrchestrator>, ttl: chrono::Duration) {
/// tokio::spawn(skua_jobs::reaper::run(
///     orchestrator,
///     Duration::from_secs(60),
///     ttl,
/// ));
/// # }
/// ```
pub async fn run(orchestrator: Arc<JobOrchestrator>, interval: Duration, ttl: chrono::Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let cutoff = Utc::now() - ttl;
        if let Err(err) = orchestrator.reap_expired_jobs(cutoff).await {
            tracing::warn!(error = %err, "reaper sweep failed");
        }
    }
}
