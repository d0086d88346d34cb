//! Waiting on a group of submitted jobs.

use std::time::Instant;

use snowdrift_core::emit;
use snowdrift_core::metrics::events::JobsAwaited;
use snowdrift_core::{PollOutcome, PollPolicy, poll_until};
use tracing::{debug, info};

use super::{JobId, JobStatus, SqlEngine};
use crate::error::EngineError;

/// Block until every job in `jobs` has finished.
///
/// Jobs are awaited in submission order, each polled at the policy's
/// interval. The policy's bound covers the whole group, not each job. The
/// first failed job aborts the wait with [`EngineError::JobFailed`]; a group
/// outliving the bound yields [`EngineError::JobTimedOut`].
pub async fn wait_for_jobs(
    engine: &dyn SqlEngine,
    jobs: &[JobId],
    policy: &PollPolicy,
    group: &'static str,
) -> Result<(), EngineError> {
    if jobs.is_empty() {
        return Ok(());
    }

    let started = Instant::now();
    info!(group, count = jobs.len(), "Waiting for jobs");

    for job in jobs {
        let remaining = policy.remaining_since(started);
        poll_until::<_, EngineError, _, _>(&remaining, job.as_str(), move || async move {
            match engine.status(job).await? {
                JobStatus::Running => Ok(PollOutcome::Pending),
                JobStatus::Succeeded => Ok(PollOutcome::Ready(())),
                JobStatus::Failed { message } => Err(EngineError::JobFailed {
                    job: job.to_string(),
                    message,
                }),
            }
        })
        .await?;
        debug!(group, job = %job, "Job finished");
    }

    emit!(JobsAwaited {
        group,
        count: jobs.len() as u64,
        duration: started.elapsed(),
    });
    Ok(())
}
