//! Torque executor configuration.

use std::path::{Path, PathBuf};

use batchexec_core::{ExecError, ExecResult, ExecutorConfig};
use serde::{Deserialize, Serialize};

/// Configuration for the Torque executor.
///
/// ```yaml
/// queue: batch
/// hosts: [node01, node02]
/// default_vmem: 2gb
/// executor:
///   polling_interval_secs: 10
///   status_calls: 5
///   status_period_secs: 20
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorqueConfig {
    /// Queue jobs are submitted to (`qsub -q`).
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Working directory for submitted jobs (`qsub -d`).
    ///
    /// Defaults to the current directory at submission time.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Hosts every job is restricted to unless it names its own.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Node count requested when a job names no hosts.
    #[serde(default = "default_nodes")]
    pub default_nodes: u32,

    /// Processors per node when a job sets none.
    #[serde(default = "default_ppn")]
    pub default_ppn: u32,

    /// Virtual memory requested when a job sets none.
    #[serde(default = "default_vmem")]
    pub default_vmem: String,

    /// Polling, timeout and rate-limit settings.
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_queue() -> String {
    "batch".to_string()
}

fn default_nodes() -> u32 {
    1
}

fn default_ppn() -> u32 {
    1
}

fn default_vmem() -> String {
    "1gb".to_string()
}

impl Default for TorqueConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            work_dir: None,
            hosts: Vec::new(),
            default_nodes: default_nodes(),
            default_ppn: default_ppn(),
            default_vmem: default_vmem(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl TorqueConfig {
    /// Default configuration targeting `queue`.
    pub fn with_queue(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    /// Restrict jobs to `hosts` by default.
    pub fn with_hosts(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Submit jobs from `dir`.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Replace the executor timing section.
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Load configuration from a YAML file.
    ///
    /// Validate after applying overrides; the executor rejects invalid
    /// settings at construction as well.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ExecResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_yaml_ng::from_str(&contents).map_err(|e| ExecError::Config(e.to_string()))
    }

    /// Defaults overridden by `BATCHEXEC_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a variable lookup, executor section included.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(queue) = lookup("BATCHEXEC_QUEUE").filter(|q| !q.trim().is_empty()) {
            self.queue = queue.trim().to_string();
        }
        if let Some(dir) = lookup("BATCHEXEC_WORK_DIR").filter(|d| !d.trim().is_empty()) {
            self.work_dir = Some(PathBuf::from(dir.trim()));
        }
        self.executor.apply_overrides(lookup);
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ExecResult<()> {
        if self.queue.trim().is_empty() {
            return Err(ExecError::Config("queue must not be empty".into()));
        }
        if self.default_nodes == 0 {
            return Err(ExecError::Config(
                "default_nodes must be greater than zero".into(),
            ));
        }
        if self.default_ppn == 0 {
            return Err(ExecError::Config(
                "default_ppn must be greater than zero".into(),
            ));
        }
        self.executor.validate()
    }
}
