//! batchexec adapter for the Torque/PBS batch scheduler
//!
//! This crate implements [`Executor`] on top of the Torque command line
//! tools.
//!
//! # Tools
//!
//! | Operation | Invocation | Benign failures |
//! |-----------|------------|-----------------|
//! | submit | `qsub -q QUEUE -d DIR ... -l RESOURCES` (script on stdin) | none |
//! | log paths | `qalter -o OUT -e ERR ID` | none |
//! | status | `qstat -f ID` (rate limited) | 153: unknown job |
//! | cancel | `qdel ID` | 153: completed, 170: unknown job |
//!
//! # State Codes
//!
//! `Q`, `R`, `H` and `E` are active; `C` is inactive. A completed job without
//! an exit status reports return code -1, and a job the server has forgotten
//! reports return code 1.
//!
//! # Example
//!
//! ```ignore
//! use batchexec_adapter_torque::{TorqueConfig, TorqueExecutor};
//! use batchexec_core::{Executor, Job};
//!
//! let executor = TorqueExecutor::new(TorqueConfig::with_queue("batch"))?;
//! let mut job = Job::new("hostname").with_name("where").with_memory("100M");
//! executor.submit(&mut job).await?;
//! executor.update(&mut job, true).await?;
//! ```

mod adapter;
mod config;
pub mod parser;
pub mod resources;

use std::sync::Arc;

use batchexec_core::{Executor, ExecutorRegistry, which};

pub use adapter::{BACKEND_NAME, TorqueExecutor};
pub use config::TorqueConfig;

/// Register the Torque backend.
///
/// The factory targets the requested partition, falling back to the
/// configured queue when the partition is empty.
pub fn register(registry: &mut ExecutorRegistry, config: TorqueConfig) {
    registry.register(
        BACKEND_NAME,
        || which("qsub").is_some(),
        move |partition| {
            let mut config = config.clone();
            if !partition.trim().is_empty() {
                config.queue = partition.trim().to_string();
            }
            Ok(Arc::new(TorqueExecutor::new(config)?) as Arc<dyn Executor>)
        },
    );
}
