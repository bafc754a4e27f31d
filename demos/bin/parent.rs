//! Job Dependency Demo
//!
//! Submits a parent job, links a child to it and waits for both. The child
//! only starts after the parent finished successfully.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use batchexec_core::Job;
use batchexec_demos::{CommonArgs, print_header, print_info, print_job, print_section};

#[derive(Parser, Debug)]
#[command(name = "parent")]
#[command(about = "Run a child job after its parent")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

fn echo_job(name: &str) -> Job {
    Job::new(vec!["echo", name])
        .with_name(name)
        .with_memory("10M")
        .with_time("10")
        .with_output(format!("~/{name}-%j.out"))
        .with_error(format!("~/{name}-%j.err"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let executor = args.common.setup()?;

    print_header("Job Dependency Demo");

    let mut parent = echo_job("parent");
    let mut child = echo_job("child");

    print_section("Submit");
    info!("submitting the parent job");
    executor.submit(&mut parent).await?;
    print_job(&parent);

    child.set_parent(&parent);
    info!("submitting the child job");
    executor.submit(&mut child).await?;
    print_job(&child);

    print_section("Waiting");
    loop {
        executor.update(&mut parent, true).await?;
        executor.update(&mut child, true).await?;
        if child.active() == Some(false) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    print_job(&parent);
    print_job(&child);
    if let (Some(0), Some(rc)) = (parent.returncode(), child.returncode()) {
        print_info(&format!("child finished after parent with return code {rc}"));
    }
    Ok(())
}
