//! Job arrays: a group of jobs sharing one executor, an admission limit and
//! a failure policy.
//!
//! ```text
//!   Building ──submit──→ Submitting ──→ Running ──wait──→ Finished
//!                            │             │
//!                            └─────────────┴──(failure, cancel_on_fail)──→ Aborted
//! ```
//!
//! Cancellation is best-effort and per job: when one cancel request fails the
//! others are still attempted, and every failure is kept in
//! [`JobArray::failures`].
//!
//! Blocking waits are bounded by the array timeout; a job whose status can
//! never be read does not hold the array forever.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::{ExecError, ExecResult};
use crate::executor::Executor;
use crate::job::Job;

/// Default sleep between blocking poll passes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on a blocking wait or a wait for a free slot.
pub const DEFAULT_ARRAY_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle of a job array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayState {
    /// Jobs can still be added.
    Building,
    /// Jobs are being handed to the executor.
    Submitting,
    /// Every job has been submitted; some may still be active.
    Running,
    /// No job is active.
    Finished,
    /// A job failed and the remaining jobs were cancelled.
    Aborted,
}

impl ArrayState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArrayState::Finished | ArrayState::Aborted)
    }
}

impl fmt::Display for ArrayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayState::Building => write!(f, "building"),
            ArrayState::Submitting => write!(f, "submitting"),
            ArrayState::Running => write!(f, "running"),
            ArrayState::Finished => write!(f, "finished"),
            ArrayState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Executor operation that failed for one job of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Submit,
    Update,
    Cancel,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Submit => write!(f, "submit"),
            Operation::Update => write!(f, "update"),
            Operation::Cancel => write!(f, "cancel"),
        }
    }
}

/// A failed operation on one job, kept so the array can carry on.
///
/// Only the latest failure per job and operation is kept.
#[derive(Debug)]
pub struct JobFailure {
    /// Index of the job in insertion order.
    pub index: usize,
    /// Which operation failed.
    pub operation: Operation,
    /// The error returned by the executor.
    pub error: ExecError,
}

/// An ordered collection of jobs bound to one executor.
pub struct JobArray {
    executor: Arc<dyn Executor>,
    jobs: Vec<Job>,
    cancel_on_fail: bool,
    poll_interval: Duration,
    timeout: Duration,
    state: ArrayState,
    active: Vec<usize>,
    complete: Vec<usize>,
    failed: Vec<usize>,
    cancelled: FxHashSet<usize>,
    /// Jobs whose submission was attempted and rejected.
    rejected: FxHashSet<usize>,
    failures: Vec<JobFailure>,
}

impl JobArray {
    /// Create an empty array bound to `executor`.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            jobs: Vec::new(),
            cancel_on_fail: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_ARRAY_TIMEOUT,
            state: ArrayState::Building,
            active: Vec::new(),
            complete: Vec::new(),
            failed: Vec::new(),
            cancelled: FxHashSet::default(),
            rejected: FxHashSet::default(),
            failures: Vec::new(),
        }
    }

    /// Cancel every remaining job as soon as one job fails.
    pub fn with_cancel_on_fail(mut self, cancel_on_fail: bool) -> Self {
        self.cancel_on_fail = cancel_on_fail;
        self
    }

    /// Set the sleep between blocking poll passes.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound blocking waits and waits for a free slot.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append a job. Only valid before submission starts.
    pub fn add(&mut self, job: Job) -> ExecResult<()> {
        if self.state != ArrayState::Building {
            return Err(ExecError::ArraySubmitted);
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Submit every job in insertion order.
    ///
    /// With `limit`, no more than `limit` submitted jobs are active at once:
    /// when at capacity the array polls and sleeps until a slot frees. If no
    /// slot frees within the array timeout, submission stops with
    /// `ExecError::Timeout` and the remaining jobs stay unsubmitted.
    pub async fn submit(&mut self, limit: Option<usize>) -> ExecResult<()> {
        if self.state != ArrayState::Building {
            return Err(ExecError::ArraySubmitted);
        }
        self.transition(ArrayState::Submitting);
        let limit = limit.map(|l| l.max(1));

        for index in 0..self.jobs.len() {
            if let Some(limit) = limit {
                if !self.wait_for_slot(limit).await {
                    warn!(
                        "No job slot freed within {:?}, {} job(s) left unsubmitted",
                        self.timeout,
                        self.jobs.len() - index
                    );
                    self.transition(ArrayState::Running);
                    return Err(ExecError::Timeout(format!(
                        "job array waited {:?} for one of {} slots",
                        self.timeout, limit
                    )));
                }
            }
            if self.state == ArrayState::Aborted {
                info!(
                    "Job array aborted, {} job(s) left unsubmitted",
                    self.jobs.len() - index
                );
                return Ok(());
            }

            let job = &mut self.jobs[index];
            match self.executor.submit(job).await {
                Ok(()) => {
                    debug!("Submitted array job {} as {}", index, job.label());
                    self.active.push(index);
                }
                Err(error) => {
                    warn!("Failed to submit array job {}: {}", index, error);
                    self.rejected.insert(index);
                    self.record_failure(index, Operation::Submit, error);
                    if self.cancel_on_fail {
                        self.abort().await;
                    }
                }
            }
        }

        if self.state == ArrayState::Submitting {
            self.transition(ArrayState::Running);
        }
        Ok(())
    }

    /// Poll every tracked job.
    ///
    /// With `wait = false` this is a single pass. With `wait = true` passes
    /// repeat, `poll_interval` apart, until no job is active or the array
    /// timeout elapses. Returns the resulting array state.
    pub async fn wait(&mut self, wait: bool) -> ArrayState {
        let deadline = Instant::now() + self.timeout;
        loop {
            self.poll().await;
            if !wait || self.active.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} array job(s) still active after waiting {:?}",
                    self.active.len(),
                    self.timeout
                );
                break;
            }
            sleep(self.poll_interval).await;
        }
        if self.active.is_empty() && self.state == ArrayState::Running {
            self.transition(ArrayState::Finished);
        }
        self.state
    }

    /// Best-effort cancellation of every active job.
    ///
    /// Returns the number of cancel requests that succeeded; the rest are
    /// recorded in [`failures`](Self::failures).
    pub async fn cancel(&mut self) -> usize {
        let mut succeeded = 0;
        for index in 0..self.jobs.len() {
            if !self.is_active(index) || self.cancelled.contains(&index) {
                continue;
            }
            match self.executor.cancel(&mut self.jobs[index], false).await {
                Ok(()) => {
                    debug!("Cancelled array job {}", index);
                    self.cancelled.insert(index);
                    succeeded += 1;
                }
                Err(error) => {
                    warn!("Failed to cancel array job {}: {}", index, error);
                    self.record_failure(index, Operation::Cancel, error);
                }
            }
        }
        succeeded
    }

    /// One status pass over submitted, not yet inactive jobs.
    async fn poll(&mut self) {
        for index in 0..self.jobs.len() {
            let job = &mut self.jobs[index];
            if !job.is_submitted() || job.active() == Some(false) {
                continue;
            }
            if let Err(error) = self.executor.update(job, false).await {
                warn!("Failed to update array job {}: {}", index, error);
                self.record_failure(index, Operation::Update, error);
            }
        }
        self.recompute();

        if self.cancel_on_fail && !self.failed.is_empty() && self.state != ArrayState::Aborted {
            self.abort().await;
        }
    }

    /// Block until fewer than `limit` jobs are active or the array aborts.
    ///
    /// Returns `false` when the array timeout elapses first.
    async fn wait_for_slot(&mut self, limit: usize) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.active.len() < limit {
                return true;
            }
            self.poll().await;
            if self.state == ArrayState::Aborted || self.active.len() < limit {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            debug!(
                "{} of {} job slots in use, sleeping {:?}",
                self.active.len(),
                limit,
                self.poll_interval
            );
            sleep(self.poll_interval).await;
        }
    }

    /// Cancel everything still running and stop submitting.
    async fn abort(&mut self) {
        warn!("Job failure detected, cancelling remaining array jobs");
        let cancelled = self.cancel().await;
        self.transition(ArrayState::Aborted);
        info!(
            "Cancelled {} active job(s); {} job(s) will not be submitted",
            cancelled,
            self.skipped().len()
        );
    }

    fn record_failure(&mut self, index: usize, operation: Operation, error: ExecError) {
        match self
            .failures
            .iter_mut()
            .find(|f| f.index == index && f.operation == operation)
        {
            Some(existing) => existing.error = error,
            None => self.failures.push(JobFailure {
                index,
                operation,
                error,
            }),
        }
    }

    fn recompute(&mut self) {
        self.active.clear();
        self.complete.clear();
        self.failed.clear();
        for (index, job) in self.jobs.iter().enumerate() {
            if !job.is_submitted() {
                continue;
            }
            match (job.active(), job.returncode()) {
                (Some(false), Some(0)) => self.complete.push(index),
                (Some(false), Some(_)) => self.failed.push(index),
                _ => self.active.push(index),
            }
        }
    }

    /// Submitted and not known to be inactive.
    fn is_active(&self, index: usize) -> bool {
        let job = &self.jobs[index];
        job.is_submitted() && job.active() != Some(false)
    }

    fn transition(&mut self, next: ArrayState) {
        if self.state != next {
            info!("Job array {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ArrayState {
        self.state
    }

    /// Check if the array can make no further progress.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Bound on blocking waits.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a failure cancels the rest of the array.
    pub fn cancel_on_fail(&self) -> bool {
        self.cancel_on_fail
    }

    /// The executor jobs are submitted to.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// All jobs in insertion order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Job at `index` in insertion order.
    pub fn job(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs active at the last poll (submitted ones count until observed).
    pub fn active(&self) -> Vec<&Job> {
        self.active.iter().map(|&i| &self.jobs[i]).collect()
    }

    /// Jobs that finished with return code 0.
    pub fn complete(&self) -> Vec<&Job> {
        self.complete.iter().map(|&i| &self.jobs[i]).collect()
    }

    /// Jobs that finished with a non-zero return code.
    pub fn failed(&self) -> Vec<&Job> {
        self.failed.iter().map(|&i| &self.jobs[i]).collect()
    }

    /// Jobs whose cancel request was accepted, in insertion order.
    pub fn cancelled(&self) -> Vec<&Job> {
        let mut indices: Vec<_> = self.cancelled.iter().copied().collect();
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.jobs[i]).collect()
    }

    /// Jobs never submitted because the array aborted first.
    pub fn skipped(&self) -> Vec<&Job> {
        if self.state != ArrayState::Aborted {
            return Vec::new();
        }
        self.jobs
            .iter()
            .enumerate()
            .filter(|(i, job)| !job.is_submitted() && !self.rejected.contains(i))
            .map(|(_, job)| job)
            .collect()
    }

    /// Check whether the job at `index` was cancelled by this array.
    pub fn was_cancelled(&self, index: usize) -> bool {
        self.cancelled.contains(&index)
    }

    /// Per-job operations that failed.
    pub fn failures(&self) -> &[JobFailure] {
        &self.failures
    }
}

impl fmt::Debug for JobArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobArray")
            .field("executor", &self.executor.name())
            .field("jobs", &self.jobs.len())
            .field("cancel_on_fail", &self.cancel_on_fail)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .field("active", &self.active.len())
            .field("complete", &self.complete.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}
