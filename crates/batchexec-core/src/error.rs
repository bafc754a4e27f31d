//! Error handling for executors and job arrays.

use thiserror::Error;

use crate::job::JobId;

/// Result type for executor operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors that can occur while driving a batch scheduler.
///
/// Two backend outcomes never show up here: a status query for a job the
/// scheduler no longer knows about, and a cancel request for a job that has
/// already completed or been forgotten. Adapters absorb both.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExecError {
    /// The backend's primary tool is not installed on this host.
    #[error("Executor not found: {backend} requires `{program}`")]
    ExecutorNotFound { backend: String, program: String },

    /// A tool required by a single operation is missing.
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// Memory request does not match the accepted grammar.
    #[error("Indecipherable memory argument: {0}")]
    IndecipherableMemory(String),

    /// Walltime request does not match the accepted grammar.
    #[error("Indecipherable time argument: {0}")]
    IndecipherableTime(String),

    /// A backend tool exited with a non-zero status.
    #[error("{command} failed with exit status {}: {stderr}", display_code(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A backend tool produced output that could not be parsed.
    #[error("Unexpected {command} output: {output}")]
    UnexpectedOutput { command: String, output: String },

    /// A backend tool did not finish in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The job has no identifier yet.
    #[error("Job has not been submitted")]
    NotSubmitted,

    /// The job already carries an identifier.
    #[error("Job already submitted as {0}")]
    AlreadySubmitted(JobId),

    /// The job's parent has no identifier (or no longer exists).
    #[error("Parent of job {0} has not been submitted")]
    ParentNotSubmitted(String),

    /// Jobs can only be added to an array before submission starts.
    #[error("Job array has already been submitted")]
    ArraySubmitted,

    /// No executor registered under this name.
    #[error("No executor registered with name '{0}'")]
    UnknownBackend(String),

    /// Probing found no usable backend on this host.
    #[error("No executor backend detected on this host")]
    NoBackendDetected,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}
