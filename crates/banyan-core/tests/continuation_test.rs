//! Integration tests for the dependency-graph engine against a real
//! PostgreSQL instance.

use banyan_core::continuation::{self, ContinuationUpdate};
use banyan_db::models::{RequestedResources, TaskState};
use banyan_db::queries::tasks as task_db;
use sqlx::PgPool;

async fn new_task(pool: &PgPool, command: Option<&str>, state: TaskState) -> uuid::Uuid {
    let new = task_db::NewTask {
        name: None,
        command,
        state,
        requested_resources: &RequestedResources::default(),
        estimated_runtime_ms: None,
        max_shutdown_time_ms: None,
        max_attempt_count: 3,
    };
    task_db::insert_task(pool, &new).await.unwrap().id
}

#[tokio::test]
async fn acquiring_a_continuation_blocks_it_until_released() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let child = new_task(&pool, Some("echo child"), TaskState::Inactive).await;
    let parent = new_task(&pool, Some("echo parent"), TaskState::Available).await;
    task_db::set_continuations(&pool, parent, &[child]).await.unwrap();
    continuation::acquire(&pool, child).await.unwrap();

    let before = task_db::get_task(&pool, child).await.unwrap().unwrap();
    assert_eq!(before.pending_dependency_count, 1);
    assert_eq!(before.state, TaskState::Inactive);

    continuation::release(&pool, child).await.unwrap();
    let after = task_db::get_task(&pool, child).await.unwrap().unwrap();
    assert_eq!(after.pending_dependency_count, 0);
    assert_eq!(after.state, TaskState::Available);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn commandless_task_short_circuits_to_terminated_and_releases_its_own_children() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let grandchild = new_task(&pool, Some("echo grandchild"), TaskState::Inactive).await;
    let group = new_task(&pool, None, TaskState::Inactive).await;
    task_db::set_continuations(&pool, group, &[grandchild]).await.unwrap();
    continuation::acquire(&pool, grandchild).await.unwrap();

    // Group task has no pending dependency of its own: a single release
    // attempt (simulating its sole parent finishing) should flip it straight
    // to terminated and release its grandchild in turn.
    continuation::try_make_available(&pool, group).await.unwrap();
    let group_after = task_db::get_task(&pool, group).await.unwrap().unwrap();
    assert_eq!(group_after.state, TaskState::Terminated);

    let grandchild_after = task_db::get_task(&pool, grandchild).await.unwrap().unwrap();
    assert_eq!(grandchild_after.pending_dependency_count, 0);
    assert_eq!(grandchild_after.state, TaskState::Available);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn cancel_recurses_through_continuations_and_unlinks_from_parents() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let leaf = new_task(&pool, Some("echo leaf"), TaskState::Inactive).await;
    let root = new_task(&pool, Some("echo root"), TaskState::Available).await;
    task_db::set_continuations(&pool, root, &[leaf]).await.unwrap();

    continuation::cancel(&pool, root, false).await.unwrap();

    let root_after = task_db::get_task(&pool, root).await.unwrap().unwrap();
    let leaf_after = task_db::get_task(&pool, leaf).await.unwrap().unwrap();
    assert_eq!(root_after.state, TaskState::Cancelled);
    assert_eq!(leaf_after.state, TaskState::Cancelled);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn cancel_is_idempotent_on_an_already_cancelled_descendant() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let leaf = new_task(&pool, Some("echo leaf"), TaskState::Inactive).await;
    let root = new_task(&pool, Some("echo root"), TaskState::Available).await;
    task_db::set_continuations(&pool, root, &[leaf]).await.unwrap();

    continuation::cancel(&pool, leaf, true).await.unwrap();
    // Cancelling the root afterward must not error even though its
    // continuation is already terminal.
    continuation::cancel(&pool, root, false).await.unwrap();

    let leaf_after = task_db::get_task(&pool, leaf).await.unwrap().unwrap();
    assert_eq!(leaf_after.state, TaskState::Cancelled);

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn make_additions_rejects_a_self_loop() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let task = new_task(&pool, Some("echo self"), TaskState::Inactive).await;
    let updates = vec![ContinuationUpdate {
        targets: vec![task],
        values: vec![task],
    }];

    let err = continuation::make_additions(&pool, &updates).await.unwrap_err();
    assert!(err.to_string().contains("own continuation"));

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn make_additions_rejects_a_non_inactive_target() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let target = new_task(&pool, Some("echo target"), TaskState::Available).await;
    let child = new_task(&pool, Some("echo child"), TaskState::Inactive).await;
    let updates = vec![ContinuationUpdate {
        targets: vec![target],
        values: vec![child],
    }];

    let err = continuation::make_additions(&pool, &updates).await.unwrap_err();
    assert!(err.to_string().contains("not inactive"));

    banyan_test_utils::drop_test_db(&db_name).await;
}

#[tokio::test]
async fn make_removals_drops_an_edge_without_activating_the_child() {
    let (pool, db_name) = banyan_test_utils::create_test_db().await;

    let child = new_task(&pool, Some("echo child"), TaskState::Inactive).await;
    let target = new_task(&pool, Some("echo target"), TaskState::Inactive).await;
    let add = vec![ContinuationUpdate {
        targets: vec![target],
        values: vec![child],
    }];
    continuation::make_additions(&pool, &add).await.unwrap();

    let mid = task_db::get_task(&pool, child).await.unwrap().unwrap();
    assert_eq!(mid.pending_dependency_count, 1);

    continuation::make_removals(&pool, &add).await.unwrap();
    let after = task_db::get_task(&pool, child).await.unwrap().unwrap();
    assert_eq!(after.pending_dependency_count, 0);
    // Dropping the edge released the count but must not activate the child.
    assert_eq!(after.state, TaskState::Inactive);

    banyan_test_utils::drop_test_db(&db_name).await;
}
