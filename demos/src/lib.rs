//! batchexec Demo Suite
//!
//! Small programs that drive a real batch scheduler through batchexec:
//!
//! - **simple**: submit one job, then poll it non-blocking, blocking and in a
//!   loop until it finishes
//! - **parent**: a child job that only starts once its parent succeeded
//! - **jobarray**: a failing job cancelling its sibling
//! - **limits**: admission control with a failure injected mid-array
//!
//! Every program takes `-p/--partition` and optionally `-s/--scheduler`;
//! without a scheduler the first backend available on the host is used.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use batchexec_adapter_torque::TorqueConfig;
use batchexec_core::{Executor, ExecutorRegistry, Job};
use clap::Args;
use console::style;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Arguments shared by every demo.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Scheduler backend to use (probed when omitted)
    #[arg(short, long)]
    pub scheduler: Option<String>,

    /// Partition/queue to submit to
    #[arg(short, long)]
    pub partition: String,

    /// YAML configuration file for the backend
    #[arg(short, long, env = "BATCHEXEC_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl CommonArgs {
    /// Install logging and build the requested executor.
    pub fn setup(&self) -> anyhow::Result<Arc<dyn Executor>> {
        self.setup_with_config().map(|(executor, _)| executor)
    }

    /// Like [`setup`](Self::setup), also returning the loaded configuration.
    pub fn setup_with_config(&self) -> anyhow::Result<(Arc<dyn Executor>, TorqueConfig)> {
        init_logging(self.verbose, self.debug);
        let config = load_config(self.config.as_deref())?;
        let registry = default_registry(config.clone());
        let executor = resolve_executor(&registry, self.scheduler.as_deref(), &self.partition)?;
        Ok((executor, config))
    }
}

/// Log filter for a `-v` count; `--debug` forces at least debug output.
pub fn log_filter(verbose: u8, debug: bool) -> &'static str {
    match (verbose, debug) {
        (0, false) => "warn",
        (1, false) => "info",
        (0..=2, _) => "debug",
        _ => "trace",
    }
}

/// Install the global tracing subscriber.
pub fn init_logging(verbose: u8, debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter(verbose, debug)))
        .with_target(false)
        .init();
}

/// Torque configuration from an optional file, overridden by `BATCHEXEC_*`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<TorqueConfig> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`], reading overrides through `lookup`.
///
/// Validation runs after the overrides, so a variable can correct a file.
pub fn load_config_with(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<TorqueConfig> {
    let mut config = match path {
        Some(path) => TorqueConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => TorqueConfig::default(),
    };
    config.apply_overrides(lookup);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Registry holding every backend this suite knows about.
pub fn default_registry(torque: TorqueConfig) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    batchexec_adapter_torque::register(&mut registry, torque);
    registry
}

/// Build the executor named `scheduler`, or probe for one.
pub fn resolve_executor(
    registry: &ExecutorRegistry,
    scheduler: Option<&str>,
    partition: &str,
) -> anyhow::Result<Arc<dyn Executor>> {
    let executor = match scheduler {
        Some(name) => registry
            .get(name, partition)
            .with_context(|| format!("cannot use scheduler '{name}'"))?,
        None => registry.probe(partition).with_context(|| {
            format!(
                "no scheduler found (known: {})",
                registry.available_executors().join(", ")
            )
        })?,
    };
    debug!("Using {} executor on partition {}", executor.name(), partition);
    Ok(executor)
}

/// Human-readable activity of a job.
pub fn describe_activity(job: &Job) -> &'static str {
    match job.active() {
        None => "unknown",
        Some(true) => "active",
        Some(false) => "inactive",
    }
}

/// Print a demo header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", style("═".repeat(60)).cyan());
    println!("{}", style(format!("  {title}")).cyan().bold());
    println!("{}", style("═".repeat(60)).cyan());
    println!();
}

/// Print a demo section.
pub fn print_section(title: &str) {
    println!();
    println!("{}", style(format!("▶ {title}")).green().bold());
    println!("{}", style("─".repeat(40)).dim());
}

/// Print a result line.
pub fn print_result(label: &str, value: impl std::fmt::Display) {
    println!("  {} {}", style(format!("{label}:")).dim(), value);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print a failure message.
pub fn print_failure(message: &str) {
    println!("{} {}", style("✗").red().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("ℹ").blue(), message);
}

/// Print the state of a job.
pub fn print_job(job: &Job) {
    let id = job
        .id()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    let rc = job
        .returncode()
        .map_or_else(|| "-".to_string(), |rc| rc.to_string());
    println!(
        "  {} {} [{}] {} rc={}",
        style(job.label()).bold(),
        style(id).dim(),
        job.state(),
        describe_activity(job),
        rc
    );
}
