use async_trait::async_trait;
use gpusched_core::{
    Device, GpuschedError, GpuschedResult, JobId, JobSpec, JobState, SchedulerConfig,
    SENTINEL_EXIT_CODE,
};
use gpusched_runtime::{ProcessHandle, Runtime};
use gpusched_scheduler::{QueueSummary, Scheduler};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(30);
const POLL: Duration = Duration::from_millis(50);

/// Create a started scheduler with a one second wake interval
async fn started(devices: &[&str]) -> Scheduler {
    let mut config = SchedulerConfig::with_devices(devices.iter().copied());
    config.wake_interval_secs = 1;
    let scheduler = Scheduler::new(config).unwrap();
    scheduler.start().await.unwrap();
    scheduler
}

/// Poll the queue summary until `done` holds
async fn wait_for<F>(scheduler: &Scheduler, mut done: F) -> QueueSummary
where
    F: FnMut(&QueueSummary) -> bool,
{
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let summary = scheduler.summary().await;
        if done(&summary) {
            return summary;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for scheduler, last summary: {:?}",
            summary
        );
        tokio::time::sleep(POLL).await;
    }
}

fn sorted(mut devices: Vec<Device>) -> Vec<Device> {
    devices.sort();
    devices
}

#[tokio::test]
async fn test_two_devices_three_jobs() {
    let scheduler = started(&["0", "1"]).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let spec = JobSpec::new(format!("sleep-{}", i), ["sleep", "1"]);
        ids.push(scheduler.submit(spec).await.unwrap());
    }

    wait_for(&scheduler, |s| s.running == 2 && s.pending == 1).await;
    let pending = scheduler.pending_jobs().await;
    assert_eq!(pending[0].id, ids[2]);
    let running_devices = scheduler
        .running_jobs()
        .await
        .into_iter()
        .filter_map(|j| j.device)
        .collect();
    assert_eq!(
        sorted(running_devices),
        vec![Device::new("0"), Device::new("1")]
    );

    wait_for(&scheduler, |s| s.succeeded == 3).await;
    let succeeded = scheduler.succeeded_jobs().await;
    for job in &succeeded {
        assert_eq!(job.status, JobState::Succeeded);
        assert_eq!(job.exit_code, Some(0));
        assert!(job.device.is_some());
    }
    assert!(scheduler.failed_jobs().await.is_empty());
    assert_eq!(
        sorted(scheduler.free_devices().await),
        sorted(scheduler.devices())
    );

    scheduler.stop().await;
}

#[tokio::test]
async fn test_dispatch_is_fifo() {
    let scheduler = started(&["0"]).await;

    for name in ["a", "b", "c"] {
        scheduler.submit(JobSpec::new(name, ["true"])).await.unwrap();
    }

    wait_for(&scheduler, |s| s.succeeded == 3).await;
    let succeeded = scheduler.succeeded_jobs().await;
    let names: Vec<&str> = succeeded.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(succeeded
        .windows(2)
        .all(|w| w[0].started_at <= w[1].started_at));

    scheduler.stop().await;
}

#[tokio::test]
async fn test_spawn_failure_goes_to_failed() {
    let scheduler = started(&["0"]).await;

    let id = scheduler
        .submit(JobSpec::new("doomed", ["this-does-not-exist"]))
        .await
        .unwrap();

    wait_for(&scheduler, |s| s.failed == 1).await;
    let job = scheduler.find_job(id).await.unwrap();
    assert_eq!(job.status, JobState::Failed);
    assert_eq!(job.status.label(), "Failed");
    assert_eq!(job.exit_code, Some(SENTINEL_EXIT_CODE));
    assert_eq!(job.device, Some(Device::new("0")));
    assert!(job.spawn_error.is_some());
    assert_eq!(scheduler.free_devices().await, vec![Device::new("0")]);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_nonzero_exit_goes_to_failed() {
    let scheduler = started(&["0"]).await;

    let id = scheduler
        .submit(JobSpec::new("exit7", ["sh", "-c", "exit 7"]))
        .await
        .unwrap();

    wait_for(&scheduler, |s| s.failed == 1).await;
    let job = scheduler.find_job(id).await.unwrap();
    assert_eq!(job.exit_code, Some(7));
    assert!(job.spawn_error.is_none());
    assert!(job.started_at.is_some());
    assert!(scheduler.succeeded_jobs().await.is_empty());

    scheduler.stop().await;
}

#[tokio::test]
async fn test_submission_past_capacity() {
    let scheduler = started(&["0"]).await;
    scheduler.set_pending_capacity(2).unwrap();

    let blocker = scheduler
        .submit(JobSpec::new("blocker", ["sleep", "3"]))
        .await
        .unwrap();
    assert_eq!(blocker, JobId(1));
    wait_for(&scheduler, |s| s.running == 1).await;

    scheduler.submit(JobSpec::new("q1", ["true"])).await.unwrap();
    scheduler.submit(JobSpec::new("q2", ["true"])).await.unwrap();

    let result = scheduler.submit(JobSpec::new("q3", ["true"])).await;
    assert!(matches!(result, Err(GpuschedError::QueueFull { capacity: 2 })));
    assert_eq!(scheduler.pending_jobs().await.len(), 2);

    // The rejected submission did not consume an id
    scheduler.set_pending_capacity(3).unwrap();
    let id = scheduler.submit(JobSpec::new("q4", ["true"])).await.unwrap();
    assert_eq!(id, JobId(4));

    scheduler.stop().await;
}

#[tokio::test]
async fn test_find_job_through_lifecycle() {
    let scheduler = started(&["0"]).await;

    let first = scheduler
        .submit(JobSpec::new("first", ["sleep", "2"]))
        .await
        .unwrap();
    wait_for(&scheduler, |s| s.running == 1).await;
    let second = scheduler
        .submit(JobSpec::new("second", ["true"]))
        .await
        .unwrap();

    let running = scheduler.find_job(first).await.unwrap();
    assert_eq!(running.status, JobState::Running);
    assert_eq!(running.device, Some(Device::new("0")));
    assert!(running.exit_code.is_none());

    let pending = scheduler.find_job(second).await.unwrap();
    assert_eq!(pending.status.label(), "Scheduled");
    assert!(pending.device.is_none());
    assert!(pending.exit_code.is_none());

    wait_for(&scheduler, |s| s.succeeded == 2).await;
    let done = scheduler.find_job(second).await.unwrap();
    assert_eq!(done.status, JobState::Succeeded);
    assert_eq!(done.exit_code, Some(0));
    assert!(done.finished_at.is_some());

    scheduler.stop().await;
}

#[tokio::test]
async fn test_job_sees_leased_device() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("device.out");
    let scheduler = started(&["5"]).await;

    let spec = JobSpec::new("env", ["sh", "-c", "echo \"$CUDA_VISIBLE_DEVICES\""]).with_output(&out);
    scheduler.submit(spec).await.unwrap();

    wait_for(&scheduler, |s| s.succeeded == 1).await;
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "5\n");

    scheduler.stop().await;
}

#[tokio::test]
async fn test_every_job_lands_in_exactly_one_queue() {
    let scheduler = started(&["0", "1", ""]).await;

    let commands: [&[&str]; 4] = [
        &["true"],
        &["false"],
        &["this-does-not-exist"],
        &["sh", "-c", "exit 2"],
    ];
    for i in 0..8 {
        let command = commands[i % commands.len()];
        scheduler
            .submit(JobSpec::new(format!("job-{}", i), command.iter().copied()))
            .await
            .unwrap();
    }

    let summary = wait_for(&scheduler, |s| s.succeeded + s.failed == 8).await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 6);

    let mut ids: Vec<u64> = Vec::new();
    ids.extend(scheduler.pending_jobs().await.iter().map(|j| j.id.0));
    ids.extend(scheduler.running_jobs().await.iter().map(|j| j.id.0));
    ids.extend(scheduler.succeeded_jobs().await.iter().map(|j| j.id.0));
    ids.extend(scheduler.failed_jobs().await.iter().map(|j| j.id.0));
    ids.sort_unstable();
    assert_eq!(ids, (1..=8).collect::<Vec<_>>());

    for job in scheduler.failed_jobs().await {
        assert!(job.exit_code.is_some_and(|code| code != 0));
    }
    assert_eq!(
        sorted(scheduler.free_devices().await),
        sorted(scheduler.devices())
    );

    scheduler.stop().await;
}

#[tokio::test]
async fn test_stop_leaves_running_jobs_detached() {
    let scheduler = started(&["0"]).await;

    scheduler
        .submit(JobSpec::new("long", ["sleep", "3"]))
        .await
        .unwrap();
    wait_for(&scheduler, |s| s.running == 1).await;

    scheduler.stop().await;

    let summary = scheduler.summary().await;
    assert!(!summary.daemon_running);
    assert_eq!(summary.running, 1);
    assert_eq!(summary.devices_free, 0);

    let result = scheduler.submit(JobSpec::new("late", ["true"])).await;
    assert!(matches!(result, Err(GpuschedError::DaemonNotRunning)));
}

#[tokio::test]
async fn test_stop_before_start_returns() {
    let mut config = SchedulerConfig::with_devices(["0"]);
    config.wake_interval_secs = 60;
    let scheduler = Scheduler::new(config).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), async {
        scheduler.stop().await;
        scheduler.stop().await;
    })
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_stop_interrupts_idle_sleep() {
    let mut config = SchedulerConfig::with_devices(["0"]);
    config.wake_interval_secs = 60;
    let scheduler = Scheduler::new(config).unwrap();
    scheduler.start().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), scheduler.stop()).await;
    assert!(result.is_ok());
    assert!(!scheduler.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions() {
    let scheduler = Arc::new(started(&["0", "1", "2", "3", "4", "5", "6", "7"]).await);

    let mut tasks = Vec::new();
    for i in 0..40 {
        let scheduler = scheduler.clone();
        tasks.push(tokio::spawn(async move {
            scheduler
                .submit(JobSpec::new(format!("job-{}", i), ["true"]))
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().0);
    }
    ids.sort_unstable();
    assert_eq!(ids, (1..=40).collect::<Vec<_>>());

    wait_for(&scheduler, |s| s.succeeded == 40).await;
    assert!(scheduler.failed_jobs().await.is_empty());
    assert_eq!(
        sorted(scheduler.free_devices().await),
        sorted(scheduler.devices())
    );

    scheduler.stop().await;
}

struct PanickingRuntime;

#[async_trait]
impl Runtime for PanickingRuntime {
    async fn spawn(&self, _spec: &JobSpec, _device: &Device) -> GpuschedResult<ProcessHandle> {
        panic!("runtime failed hard");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

#[tokio::test]
async fn test_daemon_panic_clears_running_state() {
    let mut config = SchedulerConfig::with_devices(["0"]);
    config.wake_interval_secs = 1;
    let scheduler = Scheduler::with_runtime(config, Arc::new(PanickingRuntime)).unwrap();
    scheduler.start().await.unwrap();

    scheduler.submit(JobSpec::new("boom", ["true"])).await.unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while scheduler.is_running() {
        assert!(Instant::now() < deadline, "daemon still running after panic");
        tokio::time::sleep(POLL).await;
    }

    let result = scheduler.submit(JobSpec::new("late", ["true"])).await;
    assert!(matches!(result, Err(GpuschedError::DaemonNotRunning)));

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(!scheduler.summary().await.daemon_running);

    let restart = scheduler.start().await;
    assert!(matches!(restart, Err(GpuschedError::Scheduler(_))));
}
