//! Translation of job resource requests into qsub syntax.

use batchexec_core::{ExecError, ExecResult, Job};
use tracing::debug;

use crate::config::TorqueConfig;

/// Normalize a memory request such as `100M` into Torque's `100mb`.
///
/// Accepted suffixes are `K`, `KB`, `M`, `MB`, `G`, `GB`, `T` and `TB`,
/// upper case only, directly after at least one digit.
pub fn normalize_memory(memory: &str) -> ExecResult<String> {
    let split = memory
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ExecError::IndecipherableMemory(memory.to_string()))?;
    let (size, unit) = memory.split_at(split);
    if size.is_empty() {
        return Err(ExecError::IndecipherableMemory(memory.to_string()));
    }

    let unit = match unit {
        "K" | "KB" => "kb",
        "M" | "MB" => "mb",
        "G" | "GB" => "gb",
        "T" | "TB" => "tb",
        _ => return Err(ExecError::IndecipherableMemory(memory.to_string())),
    };

    let normalized = format!("{size}{unit}");
    debug!("Translated memory argument {} -> {}", memory, normalized);
    Ok(normalized)
}

/// Normalize a walltime request into `HH:MM:SS`.
///
/// | Input | Meaning |
/// |-------|---------|
/// | `M` | minutes |
/// | `M:S` | minutes and seconds |
/// | `H:M:S` | hours, minutes and seconds |
/// | `D-H`, `D-H:M`, `D-H:M:S` | days folded into hours |
///
/// Overflowing fields carry over, so `90` becomes `01:30:00`.
pub fn normalize_walltime(time: &str) -> ExecResult<String> {
    let invalid = || ExecError::IndecipherableTime(time.to_string());
    let field = |s: &str| -> ExecResult<u64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse::<u64>().map_err(|_| invalid())
    };

    let trimmed = time.trim();
    let (days, h, m, s) = match trimmed.split_once('-') {
        Some((days, rest)) => {
            let days = field(days)?;
            let parts: Vec<&str> = rest.split(':').collect();
            match parts.as_slice() {
                [h] => (days, field(h)?, 0, 0),
                [h, m] => (days, field(h)?, field(m)?, 0),
                [h, m, s] => (days, field(h)?, field(m)?, field(s)?),
                _ => return Err(invalid()),
            }
        }
        None => {
            let parts: Vec<&str> = trimmed.split(':').collect();
            match parts.as_slice() {
                [m] => (0, 0, field(m)?, 0),
                [m, s] => (0, 0, field(m)?, field(s)?),
                [h, m, s] => (0, field(h)?, field(m)?, field(s)?),
                _ => return Err(invalid()),
            }
        }
    };
    let seconds = days
        .checked_mul(24)
        .and_then(|v| v.checked_add(h))
        .and_then(|v| v.checked_mul(60))
        .and_then(|v| v.checked_add(m))
        .and_then(|v| v.checked_mul(60))
        .and_then(|v| v.checked_add(s))
        .ok_or_else(invalid)?;

    Ok(format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    ))
}

/// Build the `-l` resource list for a job.
///
/// `nodes=<count|host+host>:ppn=<P>,vmem=<mem>[,walltime=HH:MM:SS]`
pub fn resource_list(job: &Job, config: &TorqueConfig) -> ExecResult<String> {
    let nodes = if job.nodes.is_empty() {
        config.default_nodes.to_string()
    } else {
        job.nodes.iter().cloned().collect::<Vec<_>>().join("+")
    };
    let ppn = job.processors.unwrap_or(config.default_ppn);
    let vmem = match job.memory.as_deref() {
        Some(memory) => normalize_memory(memory)?,
        None => config.default_vmem.clone(),
    };

    let mut resources = format!("nodes={nodes}:ppn={ppn},vmem={vmem}");
    if let Some(time) = job.time.as_deref() {
        resources.push_str(",walltime=");
        resources.push_str(&normalize_walltime(time)?);
    }
    Ok(resources)
}

/// Job name safe for `qsub -N`.
pub fn sanitize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.display(), rest),
        None => path.to_string(),
    }
}

/// Log path templates used when a job sets none.
pub fn default_log_paths(name: Option<&str>) -> (String, String) {
    let prefix = match name {
        Some(name) if !name.trim().is_empty() => format!("{}-%j", sanitize_name(name)),
        _ => "%j".to_string(),
    };
    (
        expand_home(&format!("~/{prefix}.out")),
        expand_home(&format!("~/{prefix}.err")),
    )
}
