// tests/strategy_control.rs

//! Poll-loop behaviour: schedule backoff, round-robin polling, queue
//! blockage narration, the fleet-wide stop latch and abort handling.
//!
//! These tests use `start_paused` so the loop's sleeps advance virtual time
//! instead of wall-clock time.

use std::sync::Arc;
use std::time::Duration;

use healmatrix::errors::HealmatrixError;
use healmatrix::healing::SelfHealingStrategy;
use healmatrix::matrix::{BuildListener, MatrixConfiguration, MatrixExecution};
use healmatrix::outcome::BuildOutcome;
use healmatrix_test_utils::builders::SettingsBuilder;
use healmatrix_test_utils::fake_matrix::{CollectingListener, FakeConfiguration, ScriptedRun};
use healmatrix_test_utils::init_tracing;
use tokio::sync::watch;

fn execution(
    configurations: &[Arc<FakeConfiguration>],
    listener: &Arc<CollectingListener>,
) -> MatrixExecution {
    let configurations = configurations
        .iter()
        .map(|c| Arc::clone(c) as Arc<dyn MatrixConfiguration>)
        .collect();
    MatrixExecution::new(1, configurations, Arc::clone(listener) as Arc<dyn BuildListener>)
}

#[tokio::test(start_paused = true)]
async fn refused_schedule_is_retried_until_accepted() {
    init_tracing();

    let throttled = Arc::new(
        FakeConfiguration::new("linux")
            .refuse_schedules(2)
            .with_run(ScriptedRun::new(BuildOutcome::Success, "ok")),
    );
    let listener = Arc::new(CollectingListener::new());
    let configurations = [Arc::clone(&throttled)];
    let mut execution = execution(&configurations, &listener);

    let strategy = SelfHealingStrategy::new(SettingsBuilder::new().build());
    let combined = strategy.run(&mut execution).await.unwrap();

    // The configuration is never lost: refused schedules are retried with
    // backoff until the queue accepts.
    assert_eq!(combined, BuildOutcome::Success);
    assert_eq!(throttled.refused_schedules(), 2);
    assert_eq!(throttled.scheduled_causes().len(), 1);
    assert_eq!(
        listener
            .errors()
            .iter()
            .filter(|line| line.contains("Unable to schedule build linux. Retrying."))
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn slow_configurations_are_polled_round_robin() {
    init_tracing();

    let slow = Arc::new(
        FakeConfiguration::new("slow")
            .with_run(ScriptedRun::new(BuildOutcome::Success, "ok").building_polls(5)),
    );
    let medium = Arc::new(
        FakeConfiguration::new("medium")
            .with_run(ScriptedRun::new(BuildOutcome::Success, "ok").building_polls(2)),
    );
    let fast = Arc::new(
        FakeConfiguration::new("fast").with_run(ScriptedRun::new(BuildOutcome::Success, "ok")),
    );

    let listener = Arc::new(CollectingListener::new());
    let configurations = [
        Arc::clone(&slow),
        Arc::clone(&medium),
        Arc::clone(&fast),
    ];
    let mut execution = execution(&configurations, &listener);

    let strategy = SelfHealingStrategy::new(SettingsBuilder::new().build());
    let combined = strategy.run(&mut execution).await.unwrap();

    // The fast configurations are accepted while the slow one still builds;
    // nobody is lost and nobody is double-scheduled.
    assert_eq!(combined, BuildOutcome::Success);
    for configuration in [&slow, &medium, &fast] {
        assert_eq!(configuration.scheduled_causes().len(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn queue_blockage_is_narrated_once_per_reason() {
    init_tracing();

    let queued = Arc::new(
        FakeConfiguration::new("linux")
            .queued(vec![
                Some("Waiting for next available executor slot"),
                Some("Waiting for next available executor slot"),
                Some("Blocked by resource lock on deploy-db"),
                Some("Blocked by resource lock on deploy-db"),
            ])
            .with_run(ScriptedRun::new(BuildOutcome::Success, "ok")),
    );
    let listener = Arc::new(CollectingListener::new());
    let configurations = [Arc::clone(&queued)];
    let mut execution = execution(&configurations, &listener);

    let strategy = SelfHealingStrategy::new(SettingsBuilder::new().build());
    let combined = strategy.run(&mut execution).await.unwrap();
    assert_eq!(combined, BuildOutcome::Success);

    let blockage_lines: Vec<_> = listener
        .lines()
        .into_iter()
        .filter(|line| line.contains("is still in the queue"))
        .collect();
    assert_eq!(
        blockage_lines,
        vec![
            "Configuration linux is still in the queue: \
             Waiting for next available executor slot"
                .to_string(),
            "Configuration linux is still in the queue: \
             Blocked by resource lock on deploy-db"
                .to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cleared_queue_reason_is_narrated_again_when_it_returns() {
    init_tracing();

    let queued = Arc::new(
        FakeConfiguration::new("linux")
            .queued(vec![
                Some("Waiting for next available executor slot"),
                None,
                Some("Waiting for next available executor slot"),
            ])
            .with_run(ScriptedRun::new(BuildOutcome::Success, "ok")),
    );
    let listener = Arc::new(CollectingListener::new());
    let configurations = [Arc::clone(&queued)];
    let mut execution = execution(&configurations, &listener);

    let strategy = SelfHealingStrategy::new(SettingsBuilder::new().build());
    strategy.run(&mut execution).await.unwrap();

    // The `None` reason invalidates the dedup entry, so the same reason is
    // printed again when it reappears.
    assert_eq!(
        listener
            .lines()
            .iter()
            .filter(|line| line.contains("is still in the queue"))
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn stop_after_one_fails_accepts_later_failures_without_retry() {
    init_tracing();

    // `exhausts` burns through its budget quickly; `latecomer` is still
    // building when the latch flips and must not be retried afterwards,
    // even though its own counter has budget left.
    let exhausts = Arc::new(
        FakeConfiguration::new("exhausts")
            .with_run(ScriptedRun::new(BuildOutcome::Failure, "flaky"))
            .with_run(ScriptedRun::new(BuildOutcome::Failure, "flaky")),
    );
    let latecomer = Arc::new(
        FakeConfiguration::new("latecomer")
            .with_run(ScriptedRun::new(BuildOutcome::Failure, "flaky").building_polls(6)),
    );

    let listener = Arc::new(CollectingListener::new());
    let configurations = [Arc::clone(&exhausts), Arc::clone(&latecomer)];
    let mut execution = execution(&configurations, &listener);

    let strategy = SelfHealingStrategy::new(
        SettingsBuilder::new()
            .max_retries(1)
            .stop_after_one_fails(true)
            .build(),
    );
    let combined = strategy.run(&mut execution).await.unwrap();

    assert_eq!(combined, BuildOutcome::Failure);
    // Initial + one retry for the exhausting configuration.
    assert_eq!(exhausts.scheduled_causes().len(), 2);
    // The latecomer was never retried: the latch was already down.
    assert_eq!(latecomer.scheduled_causes().len(), 1);
    assert!(listener
        .errors()
        .iter()
        .any(|line| line == "Not retrying any more builds."));

    // Only the exhausting configuration's first run was healed.
    let healed = execution.healed().unwrap().healed_runs();
    assert_eq!(healed.len(), 1);
    assert_eq!(healed[0].configuration, "exhausts");
}

#[tokio::test(start_paused = true)]
async fn abort_interrupts_a_running_poll_loop() {
    init_tracing();

    let endless = Arc::new(
        FakeConfiguration::new("linux")
            .with_run(ScriptedRun::new(BuildOutcome::Success, "ok").building_polls(1_000_000)),
    );
    let listener = Arc::new(CollectingListener::new());
    let configurations = [Arc::clone(&endless)];

    let (abort_tx, abort_rx) = watch::channel(false);
    let mut execution = execution(&configurations, &listener).with_abort(abort_rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let _ = abort_tx.send(true);
    });

    let strategy = SelfHealingStrategy::new(SettingsBuilder::new().build());
    let err = strategy.run(&mut execution).await.unwrap_err();
    assert!(matches!(err, HealmatrixError::Interrupted));
}
