//! Admission Limit Demo
//!
//! Ten short sleeps with a broken command slipped in at position four,
//! submitted at most three at a time. Once the broken job fails the rest of
//! the array is cancelled and the remaining sleeps are never submitted.

use clap::Parser;
use tracing::info;

use batchexec_core::{Job, JobArray};
use batchexec_demos::{CommonArgs, print_header, print_result, print_section};

#[derive(Parser, Debug)]
#[command(name = "limits")]
#[command(about = "Submit a job array with an admission limit")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Maximum number of active jobs
    #[arg(short, long, default_value = "3")]
    limit: usize,
}

fn quiet(job: Job) -> Job {
    job.with_memory("10M")
        .with_time("00:00:12")
        .with_output("/dev/null")
        .with_error("/dev/null")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (executor, config) = args.common.setup_with_config()?;

    print_header("Admission Limit Demo");

    let mut array = JobArray::new(executor)
        .with_cancel_on_fail(true)
        .with_timeout(config.executor.array_timeout());
    for i in 1..=10 {
        if i == 4 {
            array.add(quiet(Job::new(vec!["asdf"]).with_name("chaos")))?;
        }
        array.add(quiet(
            Job::new(vec!["sleep", "10"]).with_name(format!("sleep {i}")),
        ))?;
    }

    print_section("Submit");
    array.submit(Some(args.limit)).await?;
    info!("job array is {}", array.state());

    print_section("Summary");
    print_result("State", array.state());
    print_result("Failed", array.failed().len());
    print_result("Complete", array.complete().len());
    print_result("Skipped", array.skipped().len());
    Ok(())
}
