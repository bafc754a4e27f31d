//! Parsers for Torque command output.

use std::collections::BTreeMap;
use std::fmt;

use batchexec_core::{Activity, CommandOutput, ExecError, ExecResult, JobId};

/// qstat exit status for a job identifier the server does not know.
pub const QSTAT_UNKNOWN_JOB: i32 = 153;

/// qdel exit status for a job that already reached the `C` state.
pub const QDEL_ALREADY_COMPLETED: i32 = 153;

/// qdel exit status for a job identifier the server has forgotten.
pub const QDEL_UNKNOWN_JOB: i32 = 170;

/// Torque job state.
///
/// Torque reports single-letter state codes:
/// - Q: Queued
/// - R: Running
/// - H: Held
/// - E: Exiting after having run
/// - C: Completed
///
/// Anything else (W, S, T, B, ...) is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorqueState {
    Queued,
    Running,
    Held,
    Exiting,
    Completed,
    Other(String),
}

impl TorqueState {
    /// Parse a `job_state` value.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "Q" => TorqueState::Queued,
            "R" => TorqueState::Running,
            "H" => TorqueState::Held,
            "E" => TorqueState::Exiting,
            "C" => TorqueState::Completed,
            other => TorqueState::Other(other.to_string()),
        }
    }

    /// State code character.
    pub fn code(&self) -> &str {
        match self {
            TorqueState::Queued => "Q",
            TorqueState::Running => "R",
            TorqueState::Held => "H",
            TorqueState::Exiting => "E",
            TorqueState::Completed => "C",
            TorqueState::Other(code) => code.as_str(),
        }
    }

    /// Canonical activity, or `None` for codes outside the known tables.
    pub fn activity(&self) -> Option<Activity> {
        match self {
            TorqueState::Queued
            | TorqueState::Running
            | TorqueState::Held
            | TorqueState::Exiting => Some(Activity::Active),
            TorqueState::Completed => Some(Activity::Inactive),
            TorqueState::Other(_) => None,
        }
    }
}

impl fmt::Display for TorqueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One job as described by `qstat -f`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QstatRecord {
    /// Identifier from the `Job Id:` header, if present.
    pub job_id: Option<String>,
    /// Parsed state.
    pub state: TorqueState,
    /// Every `key = value` attribute, wrapped values joined.
    pub attributes: BTreeMap<String, String>,
}

impl QstatRecord {
    /// Raw attribute value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Exit status; servers spell the key either `exit_status` or `Exit_status`.
    pub fn exit_status(&self) -> Option<i32> {
        self.get("exit_status")
            .or_else(|| self.get("Exit_status"))
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn output_path(&self) -> Option<&str> {
        self.get("Output_Path")
    }

    pub fn error_path(&self) -> Option<&str> {
        self.get("Error_Path")
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Job_Name")
    }

    pub fn queue(&self) -> Option<&str> {
        self.get("queue")
    }
}

/// Outcome of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QstatResponse {
    /// The server described the job.
    Known(QstatRecord),
    /// The server no longer knows the identifier.
    UnknownJob,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QdelOutcome {
    /// The server accepted the request.
    Deleted,
    /// The job had already completed.
    AlreadyCompleted,
    /// The server no longer knows the identifier.
    UnknownJob,
}

/// Parse qsub output to extract the job ID.
///
/// Torque prints the identifier, typically `<sequence>.<server>`, as the
/// first token. Anything not starting with a digit is rejected.
pub fn parse_qsub_output(output: &str) -> ExecResult<JobId> {
    match output.split_whitespace().next() {
        Some(token) if token.starts_with(|c: char| c.is_ascii_digit()) => Ok(JobId::new(token)),
        _ => Err(ExecError::UnexpectedOutput {
            command: "qsub".to_string(),
            output: output.trim().to_string(),
        }),
    }
}

/// Parse qstat full output (`-f` flag).
///
/// ```text
/// Job Id: 12345.torque-server
///     Job_Name = my_job
///     job_state = C
///     queue = batch
///     Output_Path = login01:/home/user/my_job-12345.torque-server.ou
/// 	t
///     exit_status = 0
/// ```
///
/// Long values are wrapped onto tab-indented continuation lines.
pub fn parse_qstat_full_output(output: &str) -> ExecResult<QstatRecord> {
    let mut job_id = None;
    let mut attributes: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;

    for raw in output.lines() {
        if raw.trim().is_empty() {
            continue;
        }

        if raw.starts_with('\t') {
            if let Some(value) = current.as_ref().and_then(|key| attributes.get_mut(key)) {
                value.push_str(raw.trim());
            }
            continue;
        }

        let line = raw.trim();
        if let Some(id) = line.strip_prefix("Job Id:") {
            job_id = Some(id.trim().to_string());
            current = None;
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            attributes.insert(key.clone(), value.trim().to_string());
            current = Some(key);
        }
    }

    let state = attributes
        .get("job_state")
        .map(|code| TorqueState::from_code(code))
        .ok_or_else(|| ExecError::UnexpectedOutput {
            command: "qstat".to_string(),
            output: output.trim().to_string(),
        })?;

    Ok(QstatRecord {
        job_id,
        state,
        attributes,
    })
}

/// Interpret a finished `qstat -f` invocation.
pub fn interpret_qstat(output: CommandOutput) -> ExecResult<QstatResponse> {
    if output.code == Some(QSTAT_UNKNOWN_JOB) || output.stderr.contains("Unknown Job Id") {
        return Ok(QstatResponse::UnknownJob);
    }
    let output = output.into_result("qstat")?;
    parse_qstat_full_output(&output.stdout).map(QstatResponse::Known)
}

/// Interpret a finished `qdel` invocation.
pub fn interpret_qdel(output: CommandOutput) -> ExecResult<QdelOutcome> {
    match output.code {
        Some(0) => Ok(QdelOutcome::Deleted),
        Some(QDEL_ALREADY_COMPLETED) => Ok(QdelOutcome::AlreadyCompleted),
        Some(QDEL_UNKNOWN_JOB) => Ok(QdelOutcome::UnknownJob),
        _ => output.into_result("qdel").map(|_| QdelOutcome::Deleted),
    }
}
