//! Executor timing configuration.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with `BATCHEXEC_` prefix)
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};

/// Polling, timeout and rate-limit settings shared by all executors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Seconds between status queries while blocking on a job.
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,

    /// Seconds a blocking update or cancel waits before giving up.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Seconds a job array waits for its jobs, or for a free slot.
    #[serde(default = "default_array_timeout")]
    pub array_timeout_secs: u64,

    /// Seconds a single backend tool invocation may run.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Status queries admitted per rate-limit window.
    #[serde(default = "default_status_calls")]
    pub status_calls: u32,

    /// Rate-limit window length in seconds.
    #[serde(default = "default_status_period")]
    pub status_period_secs: u64,
}

fn default_polling_interval() -> u64 {
    5
}

fn default_timeout() -> u64 {
    60
}

fn default_array_timeout() -> u64 {
    24 * 60 * 60
}

fn default_command_timeout() -> u64 {
    30
}

fn default_status_calls() -> u32 {
    5
}

fn default_status_period() -> u64 {
    20
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: default_polling_interval(),
            timeout_secs: default_timeout(),
            array_timeout_secs: default_array_timeout(),
            command_timeout_secs: default_command_timeout(),
            status_calls: default_status_calls(),
            status_period_secs: default_status_period(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from a YAML file.
    ///
    /// Not validated here: environment overrides may still correct file
    /// values, so call [`validate`](Self::validate) once they are applied.
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

    /// Apply overrides from a variable lookup.
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(val) = parse_u64("BATCHEXEC_POLL_INTERVAL") {
            self.polling_interval_secs = val;
        }
        if let Some(val) = parse_u64("BATCHEXEC_TIMEOUT") {
            self.timeout_secs = val;
        }
        if let Some(val) = parse_u64("BATCHEXEC_ARRAY_TIMEOUT") {
            self.array_timeout_secs = val;
        }
        if let Some(val) = parse_u64("BATCHEXEC_COMMAND_TIMEOUT") {
            self.command_timeout_secs = val;
        }
        if let Some(val) = lookup("BATCHEXEC_STATUS_CALLS").and_then(|v| v.trim().parse().ok()) {
            self.status_calls = val;
        }
        if let Some(val) = parse_u64("BATCHEXEC_STATUS_PERIOD") {
            self.status_period_secs = val;
        }
    }

    /// Reject settings that would make polling spin or never admit a query.
    pub fn validate(&self) -> ExecResult<()> {
        if self.polling_interval_secs == 0 {
            return Err(ExecError::Config(
                "polling_interval_secs must be greater than zero".into(),
            ));
        }
        if self.array_timeout_secs == 0 {
            return Err(ExecError::Config(
                "array_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(ExecError::Config(
                "command_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.status_calls == 0 {
            return Err(ExecError::Config(
                "status_calls must be greater than zero".into(),
            ));
        }
        if self.status_period_secs == 0 {
            return Err(ExecError::Config(
                "status_period_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn array_timeout(&self) -> Duration {
        Duration::from_secs(self.array_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn status_period(&self) -> Duration {
        Duration::from_secs(self.status_period_secs)
    }
}
