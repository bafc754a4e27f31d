//! batchexec core
//!
//! This crate provides one programming interface for submitting, polling and
//! cancelling batch jobs, whatever cluster scheduler is installed on the host.
//!
//! # Overview
//!
//! - [`Job`]: a unit of work with resource requests, log paths and an
//!   optional parent dependency.
//! - [`Executor`]: the contract every scheduler adapter implements
//!   (`submit`, `update`, `cancel`).
//! - [`JobArray`]: submits a group of jobs with admission control and
//!   cancel-on-failure.
//! - [`RateLimiter`]: keeps status polling polite towards a shared scheduler
//!   daemon.
//! - [`CommandRunner`]: the seam adapters use to run scheduler tools.
//! - [`ExecutorRegistry`]: maps backend names to adapter constructors and
//!   probes the host for an available one.
//!
//! # Supported Backends
//!
//! | Backend | Crate | Tools |
//! |---------|-------|-------|
//! | Torque / PBS | `batchexec-adapter-torque` | `qsub`, `qalter`, `qstat`, `qdel` |
//!
//! # Example: Submitting a Job
//!
//! ```ignore
//! use batchexec_core::{Executor, Job};
//! use batchexec_adapter_torque::{TorqueConfig, TorqueExecutor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let executor = TorqueExecutor::new(TorqueConfig::with_queue("batch"))?;
//!
//!     let mut job = Job::new(vec!["sleep", "30"])
//!         .with_name("nap")
//!         .with_memory("100M")
//!         .with_output("~/nap-%j.out");
//!
//!     executor.submit(&mut job).await?;
//!     executor.update(&mut job, true).await?;
//!     println!("{} finished: {:?}", job.label(), job.returncode());
//!     Ok(())
//! }
//! ```
//!
//! # Example: A Job Array
//!
//! ```ignore
//! use std::sync::Arc;
//! use batchexec_core::{Job, JobArray};
//!
//! let mut array = JobArray::new(Arc::new(executor)).with_cancel_on_fail(true);
//! array.add(Job::new(vec!["sleep", "30"]))?;
//! array.add(Job::new("false"))?;
//! array.submit(Some(3)).await?;
//! array.wait(true).await;
//! assert_eq!(array.failed().len(), 2);
//! ```

pub mod array;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod limiter;
pub mod registry;

pub use array::{
    ArrayState, DEFAULT_ARRAY_TIMEOUT, DEFAULT_POLL_INTERVAL, JobArray, JobFailure, Operation,
};
pub use command::{CommandOutput, CommandRunner, Invocation, SystemRunner, which};
pub use config::ExecutorConfig;
pub use error::{ExecError, ExecResult};
pub use executor::Executor;
pub use job::{
    Activity, ID_PLACEHOLDER, Job, JobCommand, JobId, JobState, UNKNOWN_JOB_RETURNCODE,
    resolve_placeholder, shell_quote,
};
pub use limiter::RateLimiter;
pub use registry::ExecutorRegistry;
