//! The task-lifecycle coordinator: pre/post mutation sequencing around a
//! task insert or patch, collapsed into two entry points the route handlers
//! call directly under the appropriate lock.

use anyhow::Context;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use banyan_core::error::CoordinatorError;
use banyan_core::identity::Identity;
use banyan_core::lock::LockRegistry;
use banyan_core::state::TaskStateMachine;
use banyan_core::{continuation, execution};
use banyan_db::models::{ExitStatus, Role, Task, TaskState};
use banyan_db::queries::tasks as db;

use crate::auth::{require_provider, require_worker};
use crate::dto::{ContinuationUpdateEntry, TaskCreateRequest, TaskPatchRequest};
use crate::error::AppError;

/// `POST /tasks`: validate creation-only invariants, insert the row, then
/// run the insert hook (empty-task short-circuit, or acquire on every
/// continuation supplied at creation time).
pub async fn insert_task(
    pool: &PgPool,
    locks: &LockRegistry,
    req: TaskCreateRequest,
) -> Result<Task, AppError> {
    let _guard = locks.task_lock().await;

    if !matches!(req.state, TaskState::Inactive | TaskState::Available) {
        return Err(CoordinatorError::single_issue(
            "state",
            "tasks may only be created inactive or available",
        )
        .into());
    }

    for child in &req.continuations {
        let child_task = db::get_task(pool, *child)
            .await?
            .ok_or(CoordinatorError::TaskNotFound(*child))?;
        if child_task.state != TaskState::Inactive {
            return Err(CoordinatorError::ContinuationNotInactive(*child).into());
        }
    }

    let new = db::NewTask {
        name: req.name.as_deref(),
        command: req.command.as_deref(),
        state: req.state,
        requested_resources: &req.requested_resources,
        estimated_runtime_ms: req.estimated_runtime_ms,
        max_shutdown_time_ms: req.max_shutdown_time_ms,
        max_attempt_count: req.max_attempt_count,
    };
    let mut task = db::insert_task(pool, &new).await.context("failed to insert task")?;

    if !req.continuations.is_empty() {
        db::set_continuations(pool, task.id, &req.continuations).await?;
        task.continuations = req.continuations;
    }

    if task.is_commandless() && task.state == TaskState::Available {
        db::transition_state(pool, task.id, TaskState::Available, TaskState::Terminated).await?;
        task.state = TaskState::Terminated;
        for child in task.continuations.clone() {
            continuation::try_make_available(pool, child).await?;
        }
    } else {
        for child in task.continuations.clone() {
            continuation::acquire(pool, child).await?;
        }
    }

    Ok(task)
}

/// `PATCH /tasks/{id}`: apply the requested state transition (claim/report
/// routed through `banyan_core::execution`, everything else through the
/// state machine directly), then the embedded virtual-resource keys, under
/// one `task_lock` acquisition. Returns the refreshed task plus the minted
/// attempt token when the caller just claimed it.
pub async fn patch_task(
    pool: &PgPool,
    locks: &LockRegistry,
    task_id: Uuid,
    identity: &Identity,
    req: TaskPatchRequest,
) -> Result<(Task, Option<String>), AppError> {
    let touches_graph =
        req.state.is_some() || req.add_continuations.is_some() || req.remove_continuations.is_some();
    let _guard = if touches_graph {
        Some(locks.task_lock().await)
    } else {
        None
    };
    let had_state = req.state.is_some();
    let had_add_continuations = req.add_continuations.is_some();
    let had_remove_continuations = req.remove_continuations.is_some();

    let current = db::get_task(pool, task_id)
        .await?
        .ok_or(CoordinatorError::TaskNotFound(task_id))?;

    let mut minted_token = None;

    if let Some(requested_state) = req.state {
        match requested_state {
            TaskState::Running => {
                require_worker(identity)?;
                let worker_id = req
                    .update_execution_data
                    .as_ref()
                    .and_then(|d| d.worker_id)
                    .ok_or(CoordinatorError::MissingExecutionData)?;
                let outcome = execution::claim(pool, task_id, worker_id).await?;
                minted_token = Some(outcome.token);
            }
            TaskState::Terminated => {
                require_worker(identity)?;
                let data = req
                    .update_execution_data
                    .clone()
                    .ok_or(CoordinatorError::MissingExecutionData)?;
                let report = execution::Report {
                    token: data.token.ok_or(CoordinatorError::MissingExecutionData)?,
                    exit_status: data.exit_status.unwrap_or(ExitStatus::Failure),
                    time_terminated: data.time_terminated.unwrap_or_else(Utc::now),
                    memory_usage: data.memory_usage,
                    cpu_usage: data.cpu_usage,
                    gpu_usage: data.gpu_usage,
                };
                execution::report(pool, task_id, requested_state, report).await?;
            }
            TaskState::Cancelled if identity.is_worker() => {
                let data = req
                    .update_execution_data
                    .clone()
                    .ok_or(CoordinatorError::MissingExecutionData)?;
                let report = execution::Report {
                    token: data.token.ok_or(CoordinatorError::MissingExecutionData)?,
                    exit_status: data.exit_status.unwrap_or(ExitStatus::Failure),
                    time_terminated: data.time_terminated.unwrap_or_else(Utc::now),
                    memory_usage: data.memory_usage,
                    cpu_usage: data.cpu_usage,
                    gpu_usage: data.gpu_usage,
                };
                execution::report(pool, task_id, TaskState::Cancelled, report).await?;
            }
            TaskState::Cancelled => {
                // A provider's cancel request: `inactive`/`available` cancel
                // outright (and must cascade through `continuation::cancel`,
                // since no execution report is coming to do it for us); a
                // `running` task instead rewrites to `pending_cancellation`
                // and waits for the worker's own report to finish the job.
                require_provider(identity)?;
                let rewritten =
                    TaskStateMachine::rewrite_provider_request(current.state, TaskState::Cancelled);
                if rewritten == TaskState::PendingCancellation {
                    TaskStateMachine::transition(
                        pool,
                        task_id,
                        Role::Provider,
                        current.state,
                        TaskState::Cancelled,
                    )
                    .await?;
                } else if TaskStateMachine::is_valid_for_role(
                    Role::Provider,
                    current.state,
                    TaskState::Cancelled,
                ) {
                    continuation::cancel(pool, task_id, false).await?;
                } else {
                    return Err(CoordinatorError::BadTransition {
                        from: current.state.to_string(),
                        to: TaskState::Cancelled.to_string(),
                    }
                    .into());
                }
            }
            other => {
                TaskStateMachine::transition(pool, task_id, identity.role(), current.state, other)
                    .await?;
            }
        }
    }

    if let Some(add) = req.add_continuations {
        require_provider(identity)?;
        continuation::make_additions(
            pool,
            &[ContinuationUpdateEntry { targets: vec![task_id], values: add }.into()],
        )
        .await?;
    }

    if let Some(remove) = req.remove_continuations {
        require_provider(identity)?;
        continuation::make_removals(
            pool,
            &[ContinuationUpdateEntry { targets: vec![task_id], values: remove }.into()],
        )
        .await?;
    }

    if !had_state && !had_add_continuations && !had_remove_continuations {
        if let Some(data) = req.update_execution_data {
            require_worker(identity)?;
            let token = data.token.ok_or(CoordinatorError::MissingExecutionData)?;
            execution::update_usage(
                pool,
                task_id,
                &token,
                data.time_terminated.unwrap_or_else(Utc::now),
                data.memory_usage,
                data.cpu_usage,
                data.gpu_usage,
            )
            .await?;
        }
    }

    let task = db::get_task(pool, task_id)
        .await?
        .ok_or(CoordinatorError::TaskNotFound(task_id))?;
    Ok((task, minted_token))
}

impl From<ContinuationUpdateEntry> for continuation::ContinuationUpdate {
    fn from(entry: ContinuationUpdateEntry) -> Self {
        continuation::ContinuationUpdate { targets: entry.targets, values: entry.values }
    }
}
