//! The execution-record engine: per-attempt claim and report lifecycle.
//! Only a task's very first claim mints an execution record here; every
//! later attempt reuses the record `report`'s retry branch already opened
//! against the previous failure, rebinding it to whichever worker claims it
//! next. Minting is therefore split across two call sites by design, one
//! per direction a task can enter `running` from: `available` with no prior
//! attempt, or `available` again after a retry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use banyan_db::models::{ExecutionRecord, ExitStatus, Role, TaskState};
use banyan_db::queries::{execution as execution_db, tasks as db};

use crate::continuation;
use crate::error::CoordinatorError;
use crate::identity::make_token;
use crate::state::TaskStateMachine;

/// Result of a successful claim: the token the worker must echo back in its
/// termination report, and the record it was issued against.
#[derive(Debug)]
pub struct ClaimOutcome {
    pub token: String,
    pub record: ExecutionRecord,
}

/// A worker's termination report.
pub struct Report {
    pub token: String,
    pub exit_status: ExitStatus,
    pub time_terminated: DateTime<Utc>,
    pub memory_usage: Option<serde_json::Value>,
    pub cpu_usage: Option<serde_json::Value>,
    pub gpu_usage: Option<serde_json::Value>,
}

/// What happened to the task after a report was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Terminated successfully; continuations were released.
    Succeeded,
    /// Failed but retried: the task is `available` again under a new token.
    Retried,
    /// Failed at its last attempt: terminated, continuations cancelled.
    Exhausted,
}

/// Claim an `available` task on behalf of `worker_id` and transition it to
/// `running`. On a task's first claim (`attempt_count == 0`) this mints a
/// fresh execution record; on a claim following a retry, the record was
/// already minted by the failed attempt's [`report`] and is simply rebound
/// to `worker_id` here, so a stale `worker_id` never lingers on the record
/// the availability checker's `running_tasks_for_worker` join relies on.
///
/// Returns [`CoordinatorError::BadTransition`] if the task is not currently
/// `available`, wrapped by [`TaskStateMachine::transition`]'s own check.
pub async fn claim(pool: &PgPool, task_id: Uuid, worker_id: Uuid) -> Result<ClaimOutcome> {
    let task = db::get_task(pool, task_id)
        .await?
        .ok_or(CoordinatorError::TaskNotFound(task_id))?;

    if task.attempt_count >= task.max_attempt_count {
        return Err(CoordinatorError::single_issue(
            "attempt_count",
            "task has exhausted its maximum attempt count",
        )
        .into());
    }

    TaskStateMachine::transition(
        pool,
        task_id,
        Role::Worker,
        TaskState::Available,
        TaskState::Running,
    )
    .await?;

    let record = if task.attempt_count == 0 {
        let token = make_token();
        let record = execution_db::insert_execution_record(pool, task_id, 1, worker_id, &token, Utc::now())
            .await
            .context("failed to open execution record")?;
        db::set_execution_attempt(pool, task_id, record.id, 1).await?;
        record
    } else {
        let record_id = task
            .execution_data_id
            .ok_or(CoordinatorError::MissingExecutionData)?;
        let mut record = execution_db::get_execution_record(pool, record_id)
            .await?
            .ok_or(CoordinatorError::ExecutionRecordNotFound(record_id))?;
        execution_db::rebind_worker(pool, record.id, worker_id).await?;
        record.worker_id = worker_id;
        record
    };

    Ok(ClaimOutcome {
        token: record.token.clone(),
        record,
    })
}

/// Apply a worker's termination report: verify the token, finalize the
/// current record, and route to success, retry, or subtree cancellation per
/// `target`.
///
/// `target` must be `TaskState::Terminated` or `TaskState::Cancelled`,
/// matching the two edges a worker may request out of `running` /
/// `pending_cancellation`.
pub async fn report(
    pool: &PgPool,
    task_id: Uuid,
    target: TaskState,
    report: Report,
) -> Result<ReportOutcome> {
    let task = db::get_task(pool, task_id)
        .await?
        .ok_or(CoordinatorError::TaskNotFound(task_id))?;

    let record_id = task
        .execution_data_id
        .ok_or(CoordinatorError::MissingExecutionData)?;
    let record = execution_db::get_execution_record(pool, record_id)
        .await?
        .ok_or(CoordinatorError::ExecutionRecordNotFound(record_id))?;

    if record.token != report.token {
        return Err(CoordinatorError::TokenMismatch.into());
    }

    execution_db::finalize(pool, record.id, report.exit_status, report.time_terminated).await?;
    execution_db::update_usage(
        pool,
        record.id,
        report.time_terminated,
        report.memory_usage,
        report.cpu_usage,
        report.gpu_usage,
    )
    .await?;

    let from = task.state;

    if target == TaskState::Cancelled {
        TaskStateMachine::transition(pool, task_id, Role::Worker, from, TaskState::Cancelled)
            .await?;
        for child in &task.continuations {
            continuation::cancel(pool, *child, false).await?;
        }
        return Ok(ReportOutcome::Exhausted);
    }

    if !report.exit_status.is_success() && task.attempt_count < task.max_attempt_count {
        let next_token = make_token();
        let next_attempt = task.attempt_count + 1;
        let next_record = execution_db::insert_execution_record(
            pool,
            task_id,
            next_attempt,
            record.worker_id,
            &next_token,
            Utc::now(),
        )
        .await
        .context("failed to mint retry execution record")?;

        TaskStateMachine::transition(pool, task_id, Role::Worker, from, TaskState::Available)
            .await?;
        db::set_execution_attempt(pool, task_id, next_record.id, next_attempt).await?;
        return Ok(ReportOutcome::Retried);
    }

    TaskStateMachine::transition(pool, task_id, Role::Worker, from, TaskState::Terminated)
        .await?;

    if report.exit_status.is_success() {
        for child in &task.continuations {
            continuation::release(pool, *child).await?;
        }
        Ok(ReportOutcome::Succeeded)
    } else {
        for child in &task.continuations {
            continuation::cancel(pool, *child, true).await?;
        }
        Ok(ReportOutcome::Exhausted)
    }
}

/// Apply an idempotent resource-usage snapshot against the task's current
/// execution record, without touching state. Still token-gated (I7), and
/// refuses a task that has left the states an execution record can be live
/// under (`inactive`, `cancelled`, `terminated`).
pub async fn update_usage(
    pool: &PgPool,
    task_id: Uuid,
    token: &str,
    last_update: DateTime<Utc>,
    memory_usage: Option<serde_json::Value>,
    cpu_usage: Option<serde_json::Value>,
    gpu_usage: Option<serde_json::Value>,
) -> Result<()> {
    let task = db::get_task(pool, task_id)
        .await?
        .ok_or(CoordinatorError::TaskNotFound(task_id))?;

    if matches!(
        task.state,
        TaskState::Inactive | TaskState::Cancelled | TaskState::Terminated
    ) {
        return Err(CoordinatorError::ExecutionDataLocked {
            state: task.state.to_string(),
        }
        .into());
    }

    let record_id = task
        .execution_data_id
        .ok_or(CoordinatorError::MissingExecutionData)?;
    let record = execution_db::get_execution_record(pool, record_id)
        .await?
        .ok_or(CoordinatorError::ExecutionRecordNotFound(record_id))?;

    if record.token != token {
        return Err(CoordinatorError::TokenMismatch.into());
    }

    execution_db::update_usage(pool, record.id, last_update, memory_usage, cpu_usage, gpu_usage)
        .await?;
    Ok(())
}
