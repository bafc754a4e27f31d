//! Job Array Demo
//!
//! Submits a long sleep next to a job that fails immediately. With
//! cancel-on-fail the failure takes the sleep down with it.

use clap::Parser;

use batchexec_core::{Job, JobArray};
use batchexec_demos::{
    CommonArgs, print_failure, print_header, print_job, print_result, print_section,
};

#[derive(Parser, Debug)]
#[command(name = "jobarray")]
#[command(about = "Cancel a job array when one of its jobs fails")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (executor, config) = args.common.setup_with_config()?;

    print_header("Job Array Demo");

    let mut array = JobArray::new(executor)
        .with_cancel_on_fail(true)
        .with_timeout(config.executor.array_timeout());
    array.add(
        Job::new(vec!["sleep", "30"])
            .with_name("job")
            .with_memory("100M")
            .with_time("60")
            .with_output("~/job-%j.stdout")
            .with_error("~/job-%j.stderr"),
    )?;
    array.add(
        Job::new(vec!["false"])
            .with_name("job")
            .with_memory("100M")
            .with_time("10")
            .with_output("~/job-%j.stdout")
            .with_error("~/job-%j.stderr"),
    )?;

    print_section("Submit");
    array.submit(None).await?;
    for job in array.jobs() {
        print_job(job);
    }

    print_section("Wait");
    let state = array.wait(true).await;
    for job in array.jobs() {
        print_job(job);
    }

    print_section("Summary");
    print_result("State", state);
    print_result("Complete", array.complete().len());
    print_result("Failed", array.failed().len());
    print_result("Cancelled", array.cancelled().len());
    for failure in array.failures() {
        print_failure(&format!(
            "{} of job {} failed: {}",
            failure.operation, failure.index, failure.error
        ));
    }
    Ok(())
}
