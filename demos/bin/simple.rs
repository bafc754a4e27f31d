//! Single Job Demo
//!
//! Submits one command, then polls it three ways: a single status query, a
//! blocking update bounded by the executor timeout, and a loop until the job
//! has finished.

use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use tracing::info;

use batchexec_core::Job;
use batchexec_demos::{CommonArgs, print_header, print_job, print_section, print_success};

#[derive(Parser, Debug)]
#[command(name = "simple")]
#[command(about = "Submit a single job and follow it to completion")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Memory request
    #[arg(short, long, default_value = "100M")]
    mem: String,

    /// Walltime request
    #[arg(short, long, default_value = "10")]
    time: String,

    /// Job name
    #[arg(short, long, default_value = "example")]
    name: String,

    /// Command to run
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.command.is_empty() {
        bail!("did you forget to pass a command?");
    }
    let executor = args.common.setup()?;

    print_header("Single Job Demo");

    info!("building a job object");
    let mut job = Job::new(args.command)
        .with_name(args.name.as_str())
        .with_memory(args.mem)
        .with_time(args.time)
        .with_output(format!("{}-%j.stdout", args.name))
        .with_error(format!("{}-%j.stderr", args.name));

    print_section("Submit");
    executor.submit(&mut job).await?;
    print_job(&job);

    print_section("Non-blocking update");
    executor.update(&mut job, false).await?;
    print_job(&job);

    print_section("Blocking update");
    executor.update(&mut job, true).await?;
    print_job(&job);

    print_section("Waiting for completion");
    loop {
        executor.update(&mut job, false).await?;
        if job.active() == Some(false) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
    print_job(&job);

    if job.returncode() == Some(0) {
        print_success("job completed");
    } else {
        bail!("job {} failed with return code {:?}", job.label(), job.returncode());
    }
    Ok(())
}
