//! Database query functions for the `tasks` table.
//!
//! These are deliberately low-level: optimistic locking, array membership,
//! and counter arithmetic are all expressed directly in SQL so that a single
//! round trip is atomic at the storage layer. Higher-level sequencing
//! (acquiring `task_lock`, deciding which of these to call in what order) is
//! `banyan-core`'s job.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{RequestedResources, Task, TaskState};

/// Fields needed to insert a new task. `state` must be `Inactive` or
/// `Available` per the data model's I2 invariant; callers are expected to
/// have already checked that.
pub struct NewTask<'a> {
    pub name: Option<&'a str>,
    pub command: Option<&'a str>,
    pub state: TaskState,
    pub requested_resources: &'a RequestedResources,
    pub estimated_runtime_ms: Option<i64>,
    pub max_shutdown_time_ms: Option<i64>,
    pub max_attempt_count: i32,
}

/// Insert a new task row with no continuations yet. Returns the inserted
/// row with server-generated defaults (id, created_at, attempt_count).
pub async fn insert_task(pool: &PgPool, new: &NewTask<'_>) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks \
            (name, command, state, requested_resources, estimated_runtime_ms, \
             max_shutdown_time_ms, max_attempt_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(new.name)
    .bind(new.command)
    .bind(new.state)
    .bind(sqlx::types::Json(new.requested_resources))
    .bind(new.estimated_runtime_ms)
    .bind(new.max_shutdown_time_ms)
    .bind(new.max_attempt_count)
    .fetch_one(pool)
    .await
    .context("failed to insert task")?;

    Ok(task)
}

/// Fetch a single task by id.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")
}

/// Fetch a single task by its unique name.
pub async fn get_task_by_name(pool: &PgPool, name: &str) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task by name")
}

/// List every task, most recently created first.
pub async fn list_tasks(pool: &PgPool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list tasks")
}

/// Set a task's continuations and execution linkage directly, used only for
/// the initial insert-time `acquire_continuations` hook where no concurrent
/// writer can yet observe the row.
pub async fn set_continuations(pool: &PgPool, id: Uuid, continuations: &[Uuid]) -> Result<()> {
    sqlx::query("UPDATE tasks SET continuations = $1 WHERE id = $2")
        .bind(continuations)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set task continuations")?;
    Ok(())
}

/// Atomically transition a task's state, the way every lifecycle edge in the
/// coordinator is applied.
///
/// Uses optimistic locking: the `UPDATE`'s `WHERE` clause includes
/// `state = $from`, so the row changes only if the current state matches.
/// Returns the number of rows affected (0 means not-found or stale state;
/// the caller distinguishes the two by re-fetching).
pub async fn transition_state(
    pool: &PgPool,
    task_id: Uuid,
    from: TaskState,
    to: TaskState,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET state = $1, last_updated = now() WHERE id = $2 AND state = $3",
    )
    .bind(to)
    .bind(task_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to transition task state")?;

    Ok(result.rows_affected())
}

/// Increment `pending_dependency_count` for a child being given a new
/// parent edge (continuation engine's `acquire`).
///
/// Precondition (I1/I4, checked by the caller under `task_lock`): the child
/// is `inactive`.
pub async fn increment_pending_dependency_count(pool: &PgPool, task_id: Uuid) -> Result<i32> {
    let (count,): (i32,) = sqlx::query_as(
        "UPDATE tasks SET pending_dependency_count = pending_dependency_count + 1 \
         WHERE id = $1 \
         RETURNING pending_dependency_count",
    )
    .bind(task_id)
    .fetch_one(pool)
    .await
    .context("failed to increment pending_dependency_count")?;
    Ok(count)
}

/// Decrement `pending_dependency_count`, clamped so it is never observed
/// negative even under a caller bug (an assertion in `banyan-core` still
/// treats going negative as a logic error).
pub async fn decrement_pending_dependency_count(pool: &PgPool, task_id: Uuid) -> Result<i32> {
    let (count,): (i32,) = sqlx::query_as(
        "UPDATE tasks SET pending_dependency_count = GREATEST(pending_dependency_count - 1, 0) \
         WHERE id = $1 \
         RETURNING pending_dependency_count",
    )
    .bind(task_id)
    .fetch_one(pool)
    .await
    .context("failed to decrement pending_dependency_count")?;
    Ok(count)
}

/// Add `children` to `parent`'s continuations, skipping any already present
/// (set semantics, I3). Returns only the ids that were newly added, which
/// is exactly the set the continuation engine needs to call `acquire` on.
pub async fn add_continuations(pool: &PgPool, parent: Uuid, children: &[Uuid]) -> Result<Vec<Uuid>> {
    let row: (Vec<Uuid>, Vec<Uuid>) = sqlx::query_as(
        "WITH prior AS (SELECT continuations FROM tasks WHERE id = $1) \
         UPDATE tasks \
         SET continuations = ( \
             SELECT array_agg(DISTINCT c) FROM unnest(tasks.continuations || $2::uuid[]) AS c \
         ) \
         FROM prior \
         WHERE tasks.id = $1 \
         RETURNING prior.continuations, tasks.continuations",
    )
    .bind(parent)
    .bind(children)
    .fetch_one(pool)
    .await
    .context("failed to add continuations")?;

    let (before, _after) = row;
    let added: Vec<Uuid> = children
        .iter()
        .copied()
        .filter(|c| !before.contains(c))
        .collect();
    Ok(added)
}

/// Remove `children` from `parent`'s continuations. Returns only the ids
/// that were actually present and removed, which is exactly the set the
/// continuation engine needs to call `release_keep_inactive` on.
pub async fn remove_continuations(
    pool: &PgPool,
    parent: Uuid,
    children: &[Uuid],
) -> Result<Vec<Uuid>> {
    let before = get_task(pool, parent)
        .await?
        .context("task not found while removing continuations")?
        .continuations;

    sqlx::query(
        "UPDATE tasks SET continuations = ( \
             SELECT COALESCE(array_agg(c), '{}') FROM unnest(continuations) AS c \
             WHERE NOT (c = ANY($2::uuid[])) \
         ) \
         WHERE id = $1",
    )
    .bind(parent)
    .bind(children)
    .execute(pool)
    .await
    .context("failed to remove continuations")?;

    let removed: Vec<Uuid> = children
        .iter()
        .copied()
        .filter(|c| before.contains(c))
        .collect();
    Ok(removed)
}

/// Pull `task_id` out of every other task's continuations list. Used by
/// `cancel` once a task has been fully cancelled: no parent should keep a
/// reference to a cancelled child.
pub async fn remove_from_all_continuations(pool: &PgPool, task_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE tasks SET continuations = array_remove(continuations, $1) \
         WHERE $1 = ANY(continuations)",
    )
    .bind(task_id)
    .execute(pool)
    .await
    .context("failed to remove task from parents' continuations")?;
    Ok(())
}

/// Point a task at its current execution record and bump its attempt
/// counter to match, in one statement (keeps I6 atomic).
pub async fn set_execution_attempt(
    pool: &PgPool,
    task_id: Uuid,
    execution_data_id: Uuid,
    attempt_count: i32,
) -> Result<()> {
    sqlx::query(
        "UPDATE tasks SET execution_data_id = $1, attempt_count = $2, last_updated = now() \
         WHERE id = $3",
    )
    .bind(execution_data_id)
    .bind(attempt_count)
    .bind(task_id)
    .execute(pool)
    .await
    .context("failed to set execution attempt on task")?;
    Ok(())
}

/// Count tasks by state, used by the availability checker and by
/// operator-facing summaries.
pub async fn count_by_state(pool: &PgPool) -> Result<Vec<(TaskState, i64)>> {
    let rows: Vec<(TaskState, i64)> =
        sqlx::query_as("SELECT state, COUNT(*) FROM tasks GROUP BY state")
            .fetch_all(pool)
            .await
            .context("failed to count tasks by state")?;
    Ok(rows)
}

/// All tasks whose current execution attempt belongs to `worker_id` and are
/// still `running` or `pending_cancellation` -- the set the availability
/// checker cancels when a worker goes missing.
pub async fn running_tasks_for_worker(pool: &PgPool, worker_id: Uuid) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT t.* FROM tasks t \
         JOIN execution_info e ON e.id = t.execution_data_id \
         WHERE e.worker_id = $1 AND t.state IN ('running', 'pending_cancellation')",
    )
    .bind(worker_id)
    .fetch_all(pool)
    .await
    .context("failed to list running tasks for worker")
}
