//! Job array orchestration tests.
//!
//! These drive [`JobArray`] against an in-memory executor whose jobs are
//! scripted by their command line: `sleep N` stays active for N polls and
//! then succeeds, `false` fails on the first poll, `true` succeeds on it,
//! and the status of `unreachable` can never be read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchexec_core::{
    ArrayState, ExecError, ExecResult, Executor, Job, JobArray, JobCommand, JobId, JobState,
    Operation,
};

/// Return code reported for jobs killed by a cancel request.
const CANCELLED_RC: i32 = 271;

#[derive(Debug)]
struct MockJob {
    polls_left: u32,
    exit: i32,
    cancelled: bool,
    finished: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    jobs: HashMap<String, MockJob>,
    /// Highest number of unfinished backend jobs seen at submission time.
    max_running: usize,
    /// Submission order with the dependency each job carried.
    submissions: Vec<(JobId, Option<JobId>)>,
    status_queries: usize,
}

#[derive(Debug, Default)]
struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    fn max_running(&self) -> usize {
        self.state.lock().unwrap().max_running
    }

    fn submissions(&self) -> Vec<(JobId, Option<JobId>)> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn status_queries(&self) -> usize {
        self.state.lock().unwrap().status_queries
    }
}

fn script(command: &JobCommand) -> (u32, i32) {
    let line = command.to_shell_line();
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("sleep"), Some(n)) => (n.parse().unwrap_or(1), 0),
        (Some("false"), _) => (0, 1),
        _ => (0, 0),
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, job: &mut Job) -> ExecResult<()> {
        if let Some(id) = job.id() {
            return Err(ExecError::AlreadySubmitted(id.clone()));
        }
        let parent = job.parent_id()?;
        if job.command.to_shell_line() == "reject" {
            return Err(ExecError::CommandFailed {
                command: "submit".into(),
                code: Some(1),
                stderr: "rejected".into(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = JobId::new(format!("{}.mock", state.next_id));
        let (polls_left, exit) = script(&job.command);
        state.jobs.insert(
            id.0.clone(),
            MockJob {
                polls_left,
                exit,
                cancelled: false,
                finished: false,
            },
        );
        let running = state.jobs.values().filter(|j| !j.finished).count();
        state.max_running = state.max_running.max(running);
        state.submissions.push((id.clone(), parent));
        drop(state);

        job.assign_id(id)
    }

    async fn update(&self, job: &mut Job, _wait: bool) -> ExecResult<()> {
        let id = job.require_id()?.0.clone();
        let mut state = self.state.lock().unwrap();
        state.status_queries += 1;
        if job.command.to_shell_line() == "unreachable" {
            return Err(ExecError::CommandFailed {
                command: "status".into(),
                code: Some(1),
                stderr: "connection refused".into(),
            });
        }
        let Some(mock) = state.jobs.get_mut(&id) else {
            job.mark_finished(batchexec_core::UNKNOWN_JOB_RETURNCODE);
            return Ok(());
        };

        if mock.cancelled {
            mock.finished = true;
            job.mark_finished(CANCELLED_RC);
        } else if mock.polls_left == 0 {
            mock.finished = true;
            job.mark_finished(mock.exit);
        } else {
            mock.polls_left -= 1;
            job.mark_active();
        }
        Ok(())
    }

    async fn cancel(&self, job: &mut Job, _wait: bool) -> ExecResult<()> {
        let id = job.require_id()?.0.clone();
        if job.name.as_deref() == Some("stubborn") {
            return Err(ExecError::CommandFailed {
                command: "cancel".into(),
                code: Some(1),
                stderr: "permission denied".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        if let Some(mock) = state.jobs.get_mut(&id) {
            if !mock.finished {
                mock.cancelled = true;
            }
        }
        Ok(())
    }
}

fn array(executor: &Arc<MockExecutor>) -> JobArray {
    JobArray::new(executor.clone() as Arc<dyn Executor>).with_poll_interval(Duration::from_secs(1))
}

fn sleeper(name: &str, polls: u32) -> Job {
    Job::new(vec!["sleep".to_string(), polls.to_string()]).with_name(name)
}

fn assert_returncode_iff_inactive(array: &JobArray) {
    for job in array.jobs() {
        assert_eq!(
            job.returncode().is_some(),
            job.active() == Some(false),
            "job {} violates returncode/active invariant",
            job.label()
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_on_fail_cancels_sleeper() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor).with_cancel_on_fail(true);
    array.add(sleeper("sleep-30", 30)).unwrap();
    array.add(Job::new("false").with_name("false")).unwrap();

    array.submit(None).await.unwrap();
    assert_eq!(array.state(), ArrayState::Running);

    let state = array.wait(true).await;
    assert_eq!(state, ArrayState::Aborted);
    assert!(array.is_terminal());

    let failed: Vec<_> = array.failed().iter().map(|j| j.label()).collect();
    assert!(failed.contains(&"false".to_string()));
    assert!(array.complete().is_empty());
    assert!(array.active().is_empty());

    assert!(array.was_cancelled(0));
    assert_eq!(array.job(0).unwrap().returncode(), Some(CANCELLED_RC));
    assert!(!array.was_cancelled(1));
    assert_returncode_iff_inactive(&array);
}

#[tokio::test(start_paused = true)]
async fn test_failures_ignored_without_cancel_on_fail() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor);
    array.add(sleeper("a", 2)).unwrap();
    array.add(Job::new("false")).unwrap();
    array.add(sleeper("b", 3)).unwrap();

    array.submit(None).await.unwrap();
    let state = array.wait(true).await;

    assert_eq!(state, ArrayState::Finished);
    assert!(array.skipped().is_empty());
    assert_eq!(array.complete().len(), 2);
    assert_eq!(array.failed().len(), 1);
    assert!(array.cancelled().is_empty());
    assert_returncode_iff_inactive(&array);
}

#[tokio::test(start_paused = true)]
async fn test_submit_limit_bounds_active_jobs() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor);
    for i in 0..10 {
        array.add(sleeper(&format!("sleep {i}"), 2)).unwrap();
    }

    array.submit(Some(3)).await.unwrap();
    assert!(array.active().len() <= 3);
    array.wait(true).await;

    assert!(executor.max_running() <= 3, "saw {}", executor.max_running());
    assert_eq!(array.complete().len(), 10);
    assert_eq!(array.state(), ArrayState::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_zero_limit_means_one_at_a_time() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor);
    for i in 0..3 {
        array.add(sleeper(&format!("s{i}"), 1)).unwrap();
    }

    array.submit(Some(0)).await.unwrap();
    array.wait(true).await;

    assert_eq!(executor.max_running(), 1);
    assert_eq!(array.complete().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_limit_with_chaos_job_aborts_remaining() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor).with_cancel_on_fail(true);
    for i in 1..=10 {
        if i == 4 {
            array.add(Job::new("false").with_name("chaos")).unwrap();
        }
        array.add(sleeper(&format!("sleep {i}"), 10)).unwrap();
    }

    array.submit(Some(3)).await.unwrap();
    assert_eq!(array.state(), ArrayState::Aborted);
    array.wait(true).await;

    assert!(executor.max_running() <= 3);
    let unsubmitted = array.jobs().iter().filter(|j| !j.is_submitted()).count();
    assert_eq!(unsubmitted, 5);
    assert_eq!(array.skipped().len(), 5);
    for job in array.jobs() {
        assert!(
            matches!(
                job.state(),
                JobState::Unsubmitted | JobState::Failed(_) | JobState::Completed
            ),
            "job {} left in state {}",
            job.label(),
            job.state()
        );
    }
    // The first three sleepers free the slots the chaos job needs.
    assert_eq!(array.complete().len(), 3);
    assert_eq!(array.failed().iter().filter(|j| j.label() == "chaos").count(), 1);
    assert_eq!(array.cancelled().len(), 2);
    assert_returncode_iff_inactive(&array);
}

#[tokio::test(start_paused = true)]
async fn test_add_after_submit_is_rejected() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor);
    array.add(Job::new("true")).unwrap();
    array.submit(None).await.unwrap();

    let err = array.add(Job::new("true")).unwrap_err();
    assert!(matches!(err, ExecError::ArraySubmitted));
    assert!(matches!(
        array.submit(None).await,
        Err(ExecError::ArraySubmitted)
    ));
    assert_eq!(array.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_blocking_wait_is_single_pass() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor);
    array.add(sleeper("long", 5)).unwrap();
    array.add(sleeper("longer", 8)).unwrap();
    array.submit(None).await.unwrap();

    let state = array.wait(false).await;
    assert_eq!(state, ArrayState::Running);
    assert_eq!(executor.status_queries(), 2);
    assert_eq!(array.active().len(), 2);
    assert!(array.jobs().iter().all(|j| j.active() == Some(true)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_best_effort() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor);
    array.add(sleeper("stubborn", 50)).unwrap();
    array.add(sleeper("polite", 50)).unwrap();
    array.submit(None).await.unwrap();

    let succeeded = array.cancel().await;
    assert_eq!(succeeded, 1);
    assert!(array.was_cancelled(1));
    assert!(!array.was_cancelled(0));

    let failures = array.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 0);
    assert_eq!(failures[0].operation, Operation::Cancel);

    // Retrying only refreshes the existing record.
    assert_eq!(array.cancel().await, 0);
    assert_eq!(array.failures().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submission_is_recorded() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor);
    array.add(Job::new("true")).unwrap();
    array.add(Job::new("reject")).unwrap();
    array.add(Job::new("true")).unwrap();

    array.submit(None).await.unwrap();
    array.wait(true).await;

    assert_eq!(array.complete().len(), 2);
    assert!(!array.job(1).unwrap().is_submitted());
    assert_eq!(array.failures().len(), 1);
    assert_eq!(array.failures()[0].operation, Operation::Submit);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submission_aborts_with_cancel_on_fail() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor).with_cancel_on_fail(true);
    array.add(sleeper("first", 20)).unwrap();
    array.add(Job::new("reject")).unwrap();
    array.add(Job::new("true")).unwrap();

    array.submit(None).await.unwrap();
    assert_eq!(array.state(), ArrayState::Aborted);
    assert!(array.was_cancelled(0));
    assert!(!array.job(2).unwrap().is_submitted());

    // The rejected job is a failure, not a skipped one.
    let skipped: Vec<_> = array.skipped().iter().map(|j| j.label()).collect();
    assert_eq!(skipped, vec!["true".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_child_dependency_references_parent_id() {
    let executor = Arc::new(MockExecutor::default());
    let mut parent = Job::new("echo parent").with_name("parent");

    let mut early = Job::new("echo child").with_parent(&parent);
    let err = executor.submit(&mut early).await.unwrap_err();
    assert!(matches!(err, ExecError::ParentNotSubmitted(_)));
    assert!(!early.is_submitted());

    executor.submit(&mut parent).await.unwrap();
    let mut child = Job::new("echo child").with_name("child");
    child.set_parent(&parent);
    executor.submit(&mut child).await.unwrap();

    let submissions = executor.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].0, parent.id().cloned().unwrap());
    assert_eq!(submissions[1].1, parent.id().cloned());
}

#[tokio::test(start_paused = true)]
async fn test_update_many_isolates_failures() {
    let executor = Arc::new(MockExecutor::default());
    let mut jobs = vec![Job::new("true"), Job::new("false"), Job::new("true")];
    executor.submit(&mut jobs[0]).await.unwrap();
    executor.submit(&mut jobs[2]).await.unwrap();

    let results = executor.update_many(&mut jobs, false).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(ExecError::NotSubmitted)));
    assert!(results[2].is_ok());
    assert_eq!(jobs[0].returncode(), Some(0));
    assert_eq!(jobs[2].returncode(), Some(0));
    assert!(jobs[1].returncode().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resubmission_is_rejected() {
    let executor = Arc::new(MockExecutor::default());
    let mut job = Job::new("true");
    executor.submit(&mut job).await.unwrap();
    let id = job.id().cloned().unwrap();
    assert!(!id.as_str().is_empty());

    let err = executor.submit(&mut job).await.unwrap_err();
    assert!(matches!(err, ExecError::AlreadySubmitted(_)));
    assert_eq!(job.id(), Some(&id));
}

#[tokio::test(start_paused = true)]
async fn test_blocking_wait_bounded_by_timeout() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor).with_timeout(Duration::from_secs(60));
    array.add(Job::new("unreachable")).unwrap();
    array.add(Job::new("true")).unwrap();
    array.submit(None).await.unwrap();

    let started = tokio::time::Instant::now();
    let state = tokio::time::timeout(Duration::from_secs(24 * 60 * 60), array.wait(true))
        .await
        .expect("wait(true) should give up at the array timeout");

    assert_eq!(state, ArrayState::Running);
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(started.elapsed() < Duration::from_secs(120));
    assert_eq!(array.complete().len(), 1);
    assert_eq!(array.active().len(), 1);
    assert!(executor.status_queries() > 60);

    // One record per job and operation, however many passes failed.
    assert_eq!(array.failures().len(), 1);
    assert_eq!(array.failures()[0].index, 0);
    assert_eq!(array.failures()[0].operation, Operation::Update);
}

#[tokio::test(start_paused = true)]
async fn test_limited_submit_gives_up_waiting_for_slot() {
    let executor = Arc::new(MockExecutor::default());
    let mut array = array(&executor).with_timeout(Duration::from_secs(30));
    array.add(Job::new("unreachable")).unwrap();
    array.add(Job::new("true")).unwrap();

    let started = tokio::time::Instant::now();
    let err = array.submit(Some(1)).await.unwrap_err();

    assert!(matches!(err, ExecError::Timeout(_)), "{err}");
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(array.state(), ArrayState::Running);
    assert_eq!(executor.submissions().len(), 1);
    assert!(!array.jobs()[1].is_submitted());
    assert_eq!(array.failures().len(), 1);
    assert!(matches!(array.add(Job::new("true")), Err(ExecError::ArraySubmitted)));
}

#[test]
fn test_default_timeout() {
    let executor = Arc::new(MockExecutor::default());
    let array = JobArray::new(executor as Arc<dyn Executor>);
    assert_eq!(array.timeout(), batchexec_core::DEFAULT_ARRAY_TIMEOUT);
    assert_eq!(array.timeout(), Duration::from_secs(24 * 60 * 60));
}
