//! The executor contract.
//!
//! An [`Executor`] hides everything scheduler-specific (argument syntax,
//! state-code vocabulary, output grammar) behind three operations:
//!
//! | Method | Effect on the job |
//! |--------|-------------------|
//! | `submit()` | assigns `id`, resolves `output`/`error` |
//! | `update()` | sets `active`, and `returncode` once terminal |
//! | `cancel()` | requests termination; completed or unknown jobs are a no-op |
//!
//! Job and JobArray logic never looks past this trait, so a new backend is
//! a new adapter crate and nothing else.

use async_trait::async_trait;

use crate::error::ExecResult;
use crate::job::Job;

/// Trait for batch scheduler backends.
///
/// # Contract
///
/// - `submit()` MUST assign the job identifier exactly once and fail with
///   `AlreadySubmitted` on a job that already has one.
/// - `update()` MUST NOT fail when the backend has forgotten the job; it
///   marks the job inactive with [`UNKNOWN_JOB_RETURNCODE`] instead.
/// - `cancel()` MUST treat "already completed" and "unknown job" as success.
/// - With `wait = true`, `update()` and `cancel()` block until the job is
///   inactive or the executor's timeout elapses.
///
/// [`UNKNOWN_JOB_RETURNCODE`]: crate::job::UNKNOWN_JOB_RETURNCODE
#[async_trait]
pub trait Executor: Send + Sync {
    /// Backend name (e.g. "torque").
    fn name(&self) -> &str;

    /// Submit a job and record its identifier.
    async fn submit(&self, job: &mut Job) -> ExecResult<()>;

    /// Refresh the job's activity and return code from the backend.
    async fn update(&self, job: &mut Job, wait: bool) -> ExecResult<()>;

    /// Refresh several jobs, one result per job.
    ///
    /// A failure on one job does not prevent updates to the others.
    async fn update_many(&self, jobs: &mut [Job], wait: bool) -> Vec<ExecResult<()>> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs.iter_mut() {
            results.push(self.update(job, wait).await);
        }
        results
    }

    /// Request termination of a job.
    async fn cancel(&self, job: &mut Job, wait: bool) -> ExecResult<()>;
}
