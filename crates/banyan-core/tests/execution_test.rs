//! Integration tests for the claim/report execution lifecycle against a
//! real PostgreSQL instance.

use banyan_core::execution::{self, Report, ReportOutcome};
use banyan_db::models::{ExitStatus, RequestedResources, TaskState};
use banyan_db::queries::tasks as task_db;
use sqlx::PgPool;
use uuid::Uuid;

async fn new_task(pool: &PgPool, max_attempt_count: i32) -> Uuid {
    let new = task_db::NewTask {
        name: None,
        command: Some("echo hi"),
        state: TaskState::Available,
        requested_resources: &RequestedResources::default(),
        estimated_runtime_ms: None,
        max_shutdown_time_ms: None,
        max_attempt_count,
    };
    task_db::insert_task(pool, &new).await.unwrap().id
}

fn report_with(token: String, exit_status: ExitStatus) -> Report {
    Report {
        token,
        exit_status,
        time_terminated: chrono::Utc::now(),
        memory_usage: None,
        cpu_usage: None,
        gpu_usage: None,
    }
}

#[tokio::test]
async fn claim_transitions_to_running_and_mints_a_token() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task_id = new_task(&pool, 3).await;
    let worker_id = Uuid::new_v4();

    let outcome = execution::claim(&pool, task_id, worker_id).await.unwrap();
    assert!(!outcome.token.is_empty());

    let task = task_db::get_task(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Running);
    assert_eq!(task.attempt_count, 1);
    assert_eq!(task.execution_data_id, Some(outcome.record.id));

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn claim_rejects_a_task_that_already_exhausted_its_attempts() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task_id = new_task(&pool, 1).await;
    let worker_id = Uuid::new_v4();
    let outcome = execution::claim(&pool, task_id, worker_id).await.unwrap();
    execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with(outcome.token, ExitStatus::Failure),
    )
    .await
    .unwrap();

    // max_attempt_count was 1, so the failure above already exhausted the
    // task; it is now terminated, and a further claim must fail both
    // because the state is wrong and because attempts are exhausted.
    let err = execution::claim(&pool, task_id, worker_id).await.unwrap_err();
    assert!(err.to_string().contains("exhausted"));

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn report_rejects_a_mismatched_token() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task_id = new_task(&pool, 3).await;
    execution::claim(&pool, task_id, Uuid::new_v4()).await.unwrap();

    let err = execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with("not-the-real-token".into(), ExitStatus::Success),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("token"));

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn successful_report_terminates_and_releases_continuations() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let child = task_db::insert_task(
        &pool,
        &task_db::NewTask {
            name: None,
            command: Some("echo child"),
            state: TaskState::Inactive,
            requested_resources: &RequestedResources::default(),
            estimated_runtime_ms: None,
            max_shutdown_time_ms: None,
            max_attempt_count: 3,
        },
    )
    .await
    .unwrap()
    .id;
    let task_id = new_task(&pool, 3).await;
    task_db::set_continuations(&pool, task_id, &[child]).await.unwrap();
    banyan_core::continuation::acquire(&pool, child).await.unwrap();

    let outcome = execution::claim(&pool, task_id, Uuid::new_v4()).await.unwrap();
    let result = execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with(outcome.token, ExitStatus::Success),
    )
    .await
    .unwrap();
    assert_eq!(result, ReportOutcome::Succeeded);

    let task = task_db::get_task(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Terminated);
    let child_after = task_db::get_task(&pool, child).await.unwrap().unwrap();
    assert_eq!(child_after.state, TaskState::Available);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_report_retries_while_attempts_remain() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task_id = new_task(&pool, 3).await;
    let outcome = execution::claim(&pool, task_id, Uuid::new_v4()).await.unwrap();

    let result = execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with(outcome.token, ExitStatus::Failure),
    )
    .await
    .unwrap();
    assert_eq!(result, ReportOutcome::Retried);

    let task = task_db::get_task(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Available);
    assert_eq!(task.attempt_count, 2);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reclaiming_a_retried_task_reuses_its_minted_record_and_rebinds_the_worker() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task_id = new_task(&pool, 3).await;
    let first_worker = Uuid::new_v4();
    let first = execution::claim(&pool, task_id, first_worker).await.unwrap();
    execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with(first.token, ExitStatus::Failure),
    )
    .await
    .unwrap();

    let task = task_db::get_task(&pool, task_id).await.unwrap().unwrap();
    let retry_record_id = task.execution_data_id.unwrap();

    let second_worker = Uuid::new_v4();
    let second = execution::claim(&pool, task_id, second_worker).await.unwrap();

    // Same record the retry minted, no third one, and the worker on it is
    // now the one that actually claimed it.
    assert_eq!(second.record.id, retry_record_id);
    assert_eq!(second.record.worker_id, second_worker);

    let task = task_db::get_task(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.attempt_count, 2);
    assert_eq!(task.execution_data_id, Some(retry_record_id));

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_report_at_last_attempt_terminates_and_cancels_continuations() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let child = task_db::insert_task(
        &pool,
        &task_db::NewTask {
            name: None,
            command: Some("echo child"),
            state: TaskState::Inactive,
            requested_resources: &RequestedResources::default(),
            estimated_runtime_ms: None,
            max_shutdown_time_ms: None,
            max_attempt_count: 3,
        },
    )
    .await
    .unwrap()
    .id;
    let task_id = new_task(&pool, 1).await;
    task_db::set_continuations(&pool, task_id, &[child]).await.unwrap();
    banyan_core::continuation::acquire(&pool, child).await.unwrap();

    let outcome = execution::claim(&pool, task_id, Uuid::new_v4()).await.unwrap();
    let result = execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with(outcome.token, ExitStatus::Failure),
    )
    .await
    .unwrap();
    assert_eq!(result, ReportOutcome::Exhausted);

    let task = task_db::get_task(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Terminated);
    let child_after = task_db::get_task(&pool, child).await.unwrap().unwrap();
    assert_eq!(child_after.state, TaskState::Cancelled);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn worker_cancel_report_cancels_task_and_continuations() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let child = task_db::insert_task(
        &pool,
        &task_db::NewTask {
            name: None,
            command: Some("echo child"),
            state: TaskState::Inactive,
            requested_resources: &RequestedResources::default(),
            estimated_runtime_ms: None,
            max_shutdown_time_ms: None,
            max_attempt_count: 3,
        },
    )
    .await
    .unwrap()
    .id;
    let task_id = new_task(&pool, 3).await;
    task_db::set_continuations(&pool, task_id, &[child]).await.unwrap();
    banyan_core::continuation::acquire(&pool, child).await.unwrap();

    let outcome = execution::claim(&pool, task_id, Uuid::new_v4()).await.unwrap();
    // The worker acknowledges a pending cancellation by reporting Cancelled.
    task_db::transition_state(&pool, task_id, TaskState::Running, TaskState::PendingCancellation)
        .await
        .unwrap();

    let result = execution::report(
        &pool,
        task_id,
        TaskState::Cancelled,
        report_with(outcome.token, ExitStatus::Failure),
    )
    .await
    .unwrap();
    assert_eq!(result, ReportOutcome::Exhausted);

    let task = task_db::get_task(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Cancelled);
    let child_after = task_db::get_task(&pool, child).await.unwrap().unwrap();
    assert_eq!(child_after.state, TaskState::Cancelled);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_usage_rejects_a_stale_token_after_a_retry_mints_a_new_one() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task_id = new_task(&pool, 3).await;
    let first = execution::claim(&pool, task_id, Uuid::new_v4()).await.unwrap();
    execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with(first.token.clone(), ExitStatus::Failure),
    )
    .await
    .unwrap();

    let err = execution::update_usage(
        &pool,
        task_id,
        &first.token,
        chrono::Utc::now(),
        None,
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("token"));

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_usage_rejects_a_task_that_has_already_terminated() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task_id = new_task(&pool, 3).await;
    let outcome = execution::claim(&pool, task_id, Uuid::new_v4()).await.unwrap();
    execution::report(
        &pool,
        task_id,
        TaskState::Terminated,
        report_with(outcome.token.clone(), ExitStatus::Success),
    )
    .await
    .unwrap();

    let err = execution::update_usage(
        &pool,
        task_id,
        &outcome.token,
        chrono::Utc::now(),
        None,
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("terminated"));

    banyan_test_utils::drop_test_db(&db_name).await;
}
