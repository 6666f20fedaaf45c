//! Database query functions for the `execution_info` table: one row per
//! claim/execute/report attempt against a task.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExecutionRecord, ExitStatus};

/// Insert a new execution attempt in progress (no `time_terminated` or
/// `exit_status` yet). Returns the full row, including the freshly minted
/// token the worker needs to authenticate its eventual report.
pub async fn insert_execution_record(
    pool: &PgPool,
    task_id: Uuid,
    attempt_count: i32,
    worker_id: Uuid,
    token: &str,
    time_started: DateTime<Utc>,
) -> Result<ExecutionRecord> {
    sqlx::query_as::<_, ExecutionRecord>(
        "INSERT INTO execution_info (task_id, attempt_count, worker_id, token, time_started) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(task_id)
    .bind(attempt_count)
    .bind(worker_id)
    .bind(token)
    .bind(time_started)
    .fetch_one(pool)
    .await
    .context("failed to insert execution record")
}

/// Fetch an execution record by id.
pub async fn get_execution_record(pool: &PgPool, id: Uuid) -> Result<Option<ExecutionRecord>> {
    sqlx::query_as::<_, ExecutionRecord>("SELECT * FROM execution_info WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch execution record")
}

/// List every execution record across every task, most recent first.
pub async fn list_all(pool: &PgPool) -> Result<Vec<ExecutionRecord>> {
    sqlx::query_as::<_, ExecutionRecord>(
        "SELECT * FROM execution_info ORDER BY time_started DESC NULLS LAST",
    )
    .fetch_all(pool)
    .await
    .context("failed to list execution records")
}

/// List every attempt recorded for a task, oldest first.
pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<ExecutionRecord>> {
    sqlx::query_as::<_, ExecutionRecord>(
        "SELECT * FROM execution_info WHERE task_id = $1 ORDER BY attempt_count ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to list execution records for task")
}

/// Record the worker's final report: exit status and termination time.
/// Does not touch usage fields; callers apply those via [`update_usage`] in
/// the same request when present.
pub async fn finalize(
    pool: &PgPool,
    id: Uuid,
    exit_status: ExitStatus,
    time_terminated: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE execution_info SET exit_status = $1, time_terminated = $2 WHERE id = $3",
    )
    .bind(exit_status)
    .bind(time_terminated)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to finalize execution record")?;
    Ok(())
}

/// Idempotently apply a resource-usage snapshot reported by a worker mid-run.
pub async fn update_usage(
    pool: &PgPool,
    id: Uuid,
    last_update: DateTime<Utc>,
    memory_usage: Option<serde_json::Value>,
    cpu_usage: Option<serde_json::Value>,
    gpu_usage: Option<serde_json::Value>,
) -> Result<()> {
    sqlx::query(
        "UPDATE execution_info \
         SET last_update = $1, \
             memory_usage = COALESCE($2, memory_usage), \
             cpu_usage = COALESCE($3, cpu_usage), \
             gpu_usage = COALESCE($4, gpu_usage) \
         WHERE id = $5",
    )
    .bind(last_update)
    .bind(memory_usage)
    .bind(cpu_usage)
    .bind(gpu_usage)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update execution record usage")?;
    Ok(())
}

/// Rebind a record to the worker that just claimed it. Used when a task's
/// second-or-later claim reuses the record `report`'s retry branch already
/// minted against the failed attempt's worker, so the liveness join in
/// `tasks::running_tasks_for_worker` tracks the worker actually holding the
/// task rather than the one that gave up on it.
pub async fn rebind_worker(pool: &PgPool, id: Uuid, worker_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE execution_info SET worker_id = $1 WHERE id = $2")
        .bind(worker_id)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to rebind execution record to claiming worker")?;
    Ok(())
}

/// Most recent `last_update` timestamp across every attempt currently
/// claimed by `worker_id`. `None` means the worker has never reported usage
/// for any in-flight attempt, which the availability checker treats the
/// same as a stale worker.
pub async fn latest_update_for_worker(
    pool: &PgPool,
    worker_id: Uuid,
) -> Result<Option<DateTime<Utc>>> {
    let row: (Option<DateTime<Utc>>,) = sqlx::query_as(
        "SELECT MAX(last_update) FROM execution_info \
         WHERE worker_id = $1 AND exit_status IS NULL",
    )
    .bind(worker_id)
    .fetch_one(pool)
    .await
    .context("failed to fetch latest update for worker")?;
    Ok(row.0)
}
