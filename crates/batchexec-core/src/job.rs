//! Job types shared by every executor.
//!
//! A [`Job`] is built client-side, then mutated only through an
//! [`Executor`](crate::Executor): `submit` assigns the identifier and the
//! resolved log paths, `update` records activity and the return code.
//!
//! ```text
//!   Unsubmitted ──submit──→ Submitted ──update──→ Active ──update──→ Completed
//!                                │                   │
//!                                └───────────────────┴──→ Failed(rc)
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};

/// Token in output/error path templates replaced by the job identifier.
pub const ID_PLACEHOLDER: &str = "%j";

/// Return code given to jobs that vanished from the scheduler before their
/// exit status could be read.
pub const UNKNOWN_JOB_RETURNCODE: i32 = 1;

/// Backend-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Canonical two-valued classification of backend state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    /// Queued, running, held or exiting.
    Active,
    /// Completed (successfully or not).
    Inactive,
}

/// The body of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCommand {
    /// Ordered argv tokens, quoted when rendered.
    Argv(Vec<String>),
    /// A pre-joined shell line, used verbatim.
    Shell(String),
}

impl JobCommand {
    /// Build an argv command from any iterable of tokens.
    pub fn argv(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        JobCommand::Argv(tokens.into_iter().map(Into::into).collect())
    }

    /// Render the command as a single shell line.
    pub fn to_shell_line(&self) -> String {
        match self {
            JobCommand::Argv(tokens) => tokens
                .iter()
                .map(|t| shell_quote(t))
                .collect::<Vec<_>>()
                .join(" "),
            JobCommand::Shell(line) => line.clone(),
        }
    }
}

impl From<&str> for JobCommand {
    fn from(s: &str) -> Self {
        JobCommand::Shell(s.to_string())
    }
}

impl From<String> for JobCommand {
    fn from(s: String) -> Self {
        JobCommand::Shell(s)
    }
}

impl From<Vec<String>> for JobCommand {
    fn from(v: Vec<String>) -> Self {
        JobCommand::Argv(v)
    }
}

impl From<Vec<&str>> for JobCommand {
    fn from(v: Vec<&str>) -> Self {
        JobCommand::argv(v)
    }
}

/// Quote a token for a POSIX shell.
pub fn shell_quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

/// Replace every placeholder in `template` with `id`.
pub fn resolve_placeholder(template: &str, id: &JobId) -> String {
    template.replace(ID_PLACEHOLDER, id.as_str())
}

/// Observable lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// No identifier yet.
    Unsubmitted,
    /// Identifier known, no status observed yet.
    Submitted,
    /// Queued, running, held or exiting.
    Active,
    /// Finished with return code 0.
    Completed,
    /// Finished with a non-zero return code.
    Failed(i32),
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Unsubmitted => write!(f, "unsubmitted"),
            JobState::Submitted => write!(f, "submitted"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed(rc) => write!(f, "failed ({rc})"),
        }
    }
}

/// Weak link to a parent job's identifier.
#[derive(Debug, Clone)]
struct ParentLink {
    label: String,
    id: Weak<OnceLock<JobId>>,
}

/// A unit of work for a batch scheduler.
///
/// Jobs are deliberately not `Clone`: the identifier lives in a shared cell
/// so that child jobs can observe it once the parent is submitted.
#[derive(Debug)]
pub struct Job {
    /// Display label.
    pub name: Option<String>,

    /// Command executed by the job script.
    pub command: JobCommand,

    /// Memory request with unit suffix (e.g. "100M").
    pub memory: Option<String>,

    /// Walltime request (e.g. "60", "00:10:00").
    pub time: Option<String>,

    /// Processors per node.
    pub processors: Option<u32>,

    /// Host names for multi-node jobs; empty means unset.
    pub nodes: BTreeSet<String>,

    /// Standard output path template.
    pub output: Option<String>,

    /// Standard error path template.
    pub error: Option<String>,

    parent: Option<ParentLink>,
    id: Arc<OnceLock<JobId>>,
    active: Option<bool>,
    returncode: Option<i32>,
    submitted_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new job running `command`.
    pub fn new(command: impl Into<JobCommand>) -> Self {
        Self {
            name: None,
            command: command.into(),
            memory: None,
            time: None,
            processors: None,
            nodes: BTreeSet::new(),
            output: None,
            error: None,
            parent: None,
            id: Arc::new(OnceLock::new()),
            active: None,
            returncode: None,
            submitted_at: None,
            finished_at: None,
        }
    }

    /// Set the job name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the memory request.
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }

    /// Set the walltime request.
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// Set the processor count.
    pub fn with_processors(mut self, processors: u32) -> Self {
        self.processors = Some(processors);
        self
    }

    /// Request specific hosts.
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the standard output path template.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Set the standard error path template.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Make this job depend on the successful completion of `parent`.
    pub fn with_parent(mut self, parent: &Job) -> Self {
        self.set_parent(parent);
        self
    }

    /// Make this job depend on the successful completion of `parent`.
    ///
    /// Only a weak handle is kept; if the parent is dropped before this job
    /// is submitted, submission fails.
    pub fn set_parent(&mut self, parent: &Job) {
        self.parent = Some(ParentLink {
            label: parent.label(),
            id: Arc::downgrade(&parent.id),
        });
    }

    /// Check whether a parent link is set.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Identifier of the parent job, if one is linked.
    ///
    /// Fails when the parent has no identifier yet or has been dropped.
    pub fn parent_id(&self) -> ExecResult<Option<JobId>> {
        let Some(link) = &self.parent else {
            return Ok(None);
        };
        link.id
            .upgrade()
            .and_then(|cell| cell.get().cloned())
            .map(Some)
            .ok_or_else(|| ExecError::ParentNotSubmitted(self.label()))
    }

    /// Backend identifier, once submitted.
    pub fn id(&self) -> Option<&JobId> {
        self.id.get()
    }

    /// Backend identifier, or `NotSubmitted`.
    pub fn require_id(&self) -> ExecResult<&JobId> {
        self.id().ok_or(ExecError::NotSubmitted)
    }

    /// Check if the job has been submitted.
    pub fn is_submitted(&self) -> bool {
        self.id.get().is_some()
    }

    /// Tri-state readiness: `None` until the first status update.
    pub fn active(&self) -> Option<bool> {
        self.active
    }

    /// Exit status, set only once the job is observed terminal.
    pub fn returncode(&self) -> Option<i32> {
        self.returncode
    }

    /// Time the identifier was assigned.
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Time the job was first observed terminal.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Name if set, otherwise the identifier, otherwise the command line.
    pub fn label(&self) -> String {
        match (&self.name, self.id()) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => self.command.to_shell_line(),
        }
    }

    /// Derived lifecycle state.
    pub fn state(&self) -> JobState {
        match (self.is_submitted(), self.active, self.returncode) {
            (false, _, _) => JobState::Unsubmitted,
            (true, Some(false), Some(0)) => JobState::Completed,
            (true, Some(false), Some(rc)) => JobState::Failed(rc),
            (true, Some(true), _) => JobState::Active,
            _ => JobState::Submitted,
        }
    }

    /// Record the backend identifier. Executors call this exactly once.
    pub fn assign_id(&mut self, id: JobId) -> ExecResult<()> {
        if let Some(existing) = self.id.get() {
            return Err(ExecError::AlreadySubmitted(existing.clone()));
        }
        self.id
            .set(id)
            .map_err(ExecError::AlreadySubmitted)?;
        self.submitted_at = Some(Utc::now());
        Ok(())
    }

    /// Record that the backend reports the job as queued, running or held.
    pub fn mark_active(&mut self) {
        self.active = Some(true);
    }

    /// Record a terminal observation with its return code.
    pub fn mark_finished(&mut self, returncode: i32) {
        self.active = Some(false);
        self.returncode = Some(returncode);
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Apply a canonical activity classification.
    pub fn apply(&mut self, activity: Activity, returncode: Option<i32>) {
        match activity {
            Activity::Active => self.mark_active(),
            Activity::Inactive => self.mark_finished(returncode.unwrap_or(-1)),
        }
    }
}
