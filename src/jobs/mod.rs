//! Background jobs.
//!
//! A single cron-driven job sweeps expired session keys out of the store.
//! Expired keys are already refused on read, so the sweep is purely a memory
//! reclamation pass; heartbeats stay correct even if it never runs.

use std::sync::Arc;

use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, info};

use crate::session::SessionKeyStore;

/// Errors from the job scheduler.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// Job scheduling configuration.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Cron expression for the session key sweep.
    pub session_sweep_cron: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            // Every 5 minutes.
            session_sweep_cron: "0 */5 * * * *".to_string(),
        }
    }
}

/// Build and start the scheduler with the session sweep registered.
///
/// The returned scheduler must be kept alive for jobs to keep firing; call
/// [`shutdown_scheduler`] on graceful exit.
pub async fn start_scheduler(
    config: JobConfig,
    sessions: Arc<SessionKeyStore>,
) -> Result<JobScheduler, JobError> {
    let scheduler = JobScheduler::new().await?;

    let sweep = Job::new_async(config.session_sweep_cron.as_str(), move |_uuid, _lock| {
        let sessions = sessions.clone();
        Box::pin(async move {
            let evicted = sessions.sweep();
            if evicted > 0 {
                info!(evicted, remaining = sessions.len(), "Swept expired session keys");
            } else {
                debug!("Session sweep found nothing to evict");
            }
        })
    })?;

    scheduler.add(sweep).await?;
    scheduler.start().await?;

    Ok(scheduler)
}

/// Stop the scheduler and drop its jobs.
pub async fn shutdown_scheduler(mut scheduler: JobScheduler) -> Result<(), JobError> {
    scheduler.shutdown().await?;
    Ok(())
}
