//! Torque executor: job submission and tracking through qsub, qalter, qstat
//! and qdel.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use batchexec_core::{
    Activity, CommandRunner, ExecError, ExecResult, Executor, ID_PLACEHOLDER, Invocation, Job,
    JobId, RateLimiter, SystemRunner, UNKNOWN_JOB_RETURNCODE, resolve_placeholder,
};

use crate::config::TorqueConfig;
use crate::parser::{self, QdelOutcome, QstatResponse};
use crate::resources::{default_log_paths, expand_home, resource_list, sanitize_name};

/// Registry name of this backend.
pub const BACKEND_NAME: &str = "torque";

/// Executor for the Torque/PBS batch scheduler.
///
/// Status queries share one [`RateLimiter`], so every job and array driven
/// through the same executor stays within the configured query budget.
pub struct TorqueExecutor {
    config: TorqueConfig,
    runner: Arc<dyn CommandRunner>,
    limiter: RateLimiter,
    /// Arguments added to every qsub call.
    default_args: Vec<String>,
}

impl TorqueExecutor {
    /// Create an executor that runs the Torque tools installed on this host.
    pub fn new(config: TorqueConfig) -> ExecResult<Self> {
        let runner = Arc::new(SystemRunner::new(config.executor.command_timeout()));
        Self::with_runner(config, runner)
    }

    /// Create an executor on top of a custom command runner.
    ///
    /// Fails with `ExecutorNotFound` when `qsub` cannot be located.
    pub fn with_runner(config: TorqueConfig, runner: Arc<dyn CommandRunner>) -> ExecResult<Self> {
        config.validate()?;
        if !Self::available(runner.as_ref()) {
            return Err(ExecError::ExecutorNotFound {
                backend: BACKEND_NAME.to_string(),
                program: "qsub".to_string(),
            });
        }

        let limiter = RateLimiter::new(
            config.executor.status_calls,
            config.executor.status_period(),
        );
        let default_args = if config.hosts.is_empty() {
            Vec::new()
        } else {
            vec!["-l".to_string(), config.hosts.join("+")]
        };

        debug!(
            "Torque executor for queue {} ({} status queries per {:?})",
            config.queue,
            limiter.calls(),
            limiter.period()
        );

        Ok(Self {
            config,
            runner,
            limiter,
            default_args,
        })
    }

    /// Check whether `qsub` can be located through `runner`.
    pub fn available(runner: &dyn CommandRunner) -> bool {
        runner.which("qsub").is_some()
    }

    /// Get the configuration.
    pub fn config(&self) -> &TorqueConfig {
        &self.config
    }

    /// The limiter guarding status queries.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn work_dir(&self) -> ExecResult<String> {
        let dir = match &self.config.work_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(dir.display().to_string())
    }

    /// Build the qsub invocation, job script included.
    fn submit_invocation(
        &self,
        job: &Job,
        parent: Option<&JobId>,
        output: &str,
        error: &str,
    ) -> ExecResult<Invocation> {
        let work_dir = self.work_dir()?;
        let mut invocation = Invocation::new("qsub")
            .args(["-q", self.config.queue.as_str(), "-d", work_dir.as_str()])
            .args(self.default_args.iter().cloned())
            .args(["-o", output, "-e", error]);

        if let Some(parent) = parent {
            invocation = invocation
                .arg("-W")
                .arg(format!("depend=afterok:{parent}"));
        }
        if let Some(name) = job.name.as_deref().filter(|n| !n.trim().is_empty()) {
            invocation = invocation.arg("-N").arg(sanitize_name(name));
        }

        let resources = resource_list(job, &self.config)?;
        let script = format!("#!/bin/bash\n{}\n", job.command.to_shell_line());
        Ok(invocation.arg("-l").arg(resources).stdin(script))
    }

    /// Rewrite log paths that still carry the identifier placeholder.
    async fn alter_logs(&self, id: &JobId, output: &str, error: &str) -> ExecResult<()> {
        let mut args = Vec::new();
        if output.contains(ID_PLACEHOLDER) {
            args.push("-o".to_string());
            args.push(resolve_placeholder(output, id));
        }
        if error.contains(ID_PLACEHOLDER) {
            args.push("-e".to_string());
            args.push(resolve_placeholder(error, id));
        }
        if args.is_empty() {
            return Ok(());
        }

        self.runner.require("qalter")?;
        let invocation = Invocation::new("qalter").args(args).arg(id.as_str());
        self.runner.run(&invocation).await?.into_result("qalter")?;
        Ok(())
    }

    /// Rate-limited `qstat -f`.
    async fn qstat(&self, id: &JobId) -> ExecResult<QstatResponse> {
        self.runner.require("qstat")?;
        self.limiter.acquire().await;
        let invocation = Invocation::new("qstat").arg("-f").arg(id.as_str());
        let output = self.runner.run(&invocation).await?;
        parser::interpret_qstat(output)
    }

    /// One status query applied to the job.
    async fn refresh(&self, job: &mut Job, id: &JobId) -> ExecResult<()> {
        match self.qstat(id).await? {
            QstatResponse::UnknownJob => {
                debug!("Job {} is unknown to the scheduler", id);
                job.mark_finished(UNKNOWN_JOB_RETURNCODE);
            }
            QstatResponse::Known(record) => {
                debug!("Job {} is in {} state", id, record.state);
                match record.state.activity() {
                    Some(Activity::Active) => job.apply(Activity::Active, None),
                    Some(Activity::Inactive) => {
                        job.apply(Activity::Inactive, record.exit_status());
                    }
                    None => warn!(
                        "Job {} reported unrecognized state {}, leaving it unchanged",
                        id, record.state
                    ),
                }
            }
        }
        Ok(())
    }

    /// Re-query every polling interval until the job is inactive.
    ///
    /// Gives up with a warning once the configured timeout elapses.
    async fn wait_until_inactive(&self, job: &mut Job, id: &JobId) -> ExecResult<()> {
        let timeout = self.config.executor.timeout();
        let deadline = Instant::now() + timeout;
        while job.active() != Some(false) {
            if Instant::now() >= deadline {
                warn!("Job {} still active after waiting {:?}", id, timeout);
                return Ok(());
            }
            sleep(self.config.executor.polling_interval()).await;
            self.refresh(job, id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for TorqueExecutor {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn submit(&self, job: &mut Job) -> ExecResult<()> {
        if let Some(id) = job.id() {
            return Err(ExecError::AlreadySubmitted(id.clone()));
        }
        let parent = job.parent_id()?;

        let (default_output, default_error) = default_log_paths(job.name.as_deref());
        let output = job
            .output
            .as_deref()
            .map_or(default_output, expand_home);
        let error = job.error.as_deref().map_or(default_error, expand_home);

        self.runner.require("qsub")?;
        let invocation = self.submit_invocation(job, parent.as_ref(), &output, &error)?;
        let response = self.runner.run(&invocation).await?.into_result("qsub")?;
        let id = parser::parse_qsub_output(&response.stdout)?;
        debug!("Parsed job id {}", id);

        job.assign_id(id.clone())?;
        job.output = Some(resolve_placeholder(&output, &id));
        job.error = Some(resolve_placeholder(&error, &id));
        info!("Submitted {} to queue {} as {}", job.label(), self.config.queue, id);

        self.alter_logs(&id, &output, &error).await
    }

    async fn update(&self, job: &mut Job, wait: bool) -> ExecResult<()> {
        let id = job.require_id()?.clone();
        self.refresh(job, &id).await?;
        if wait {
            self.wait_until_inactive(job, &id).await?;
        }
        Ok(())
    }

    async fn cancel(&self, job: &mut Job, wait: bool) -> ExecResult<()> {
        let id = job.require_id()?.clone();
        self.runner.require("qdel")?;
        let output = self
            .runner
            .run(&Invocation::new("qdel").arg(id.as_str()))
            .await?;

        match parser::interpret_qdel(output)? {
            QdelOutcome::Deleted => info!("Cancelled job {}", id),
            QdelOutcome::AlreadyCompleted => {
                debug!("Job {} is in a completed state and cannot be cancelled", id);
            }
            QdelOutcome::UnknownJob => {
                debug!("Job {} is unknown and cannot be cancelled", id);
            }
        }

        if wait {
            self.refresh(job, &id).await?;
            self.wait_until_inactive(job, &id).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for TorqueExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TorqueExecutor")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .field("default_args", &self.default_args)
            .finish()
    }
}
