//! Task state transitions.
//!
//! Two role-scoped edge tables (`provider_edge`, `worker_edge`) describe
//! what each caller may request directly; [`TaskStateMachine::is_valid_transition`]
//! is their union, used by call sites that only need to know whether an
//! edge exists topologically at all. A provider's request to cancel a
//! `running` task is rewritten to `running -> pending_cancellation` before
//! the role table is consulted, since a task is only truly cancelled once
//! its worker acknowledges.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use banyan_db::models::{Role, TaskState};
use banyan_db::queries::tasks as db;

use crate::error::CoordinatorError;

/// Legal `from -> to` edges a provider may request directly.
fn provider_edge(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    matches!(
        (from, to),
        (Inactive, Available)
            | (Inactive, Cancelled)
            | (Available, Cancelled)
            | (Running, PendingCancellation)
    )
}

/// Legal `from -> to` edges a worker may request.
fn worker_edge(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    matches!(
        (from, to),
        (Available, Running)
            | (Running, Terminated)
            | (PendingCancellation, Cancelled)
            | (PendingCancellation, Terminated)
    )
}

pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Whether `from -> to` is legal for some role, or is the one edge the
    /// coordinator drives internally (a commandless task short-circuiting
    /// straight to `terminated` once its dependencies resolve).
    pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
        use TaskState::*;
        provider_edge(from, to)
            || worker_edge(from, to)
            || matches!((from, to), (Inactive, Terminated))
    }

    /// Whether `role` may request `from -> to` directly, before any rewrite.
    pub fn is_valid_for_role(role: Role, from: TaskState, to: TaskState) -> bool {
        match role {
            Role::Provider => provider_edge(from, to),
            Role::Worker => worker_edge(from, to),
        }
    }

    /// Rewrite a provider's requested target the way the coordinator's
    /// pre-transition hook does: cancelling a `running` task becomes a
    /// request for `pending_cancellation` instead. Any other request passes
    /// through unchanged.
    pub fn rewrite_provider_request(from: TaskState, to: TaskState) -> TaskState {
        if from == TaskState::Running && to == TaskState::Cancelled {
            TaskState::PendingCancellation
        } else {
            to
        }
    }

    /// Apply a role-scoped transition with optimistic locking against the
    /// store. Returns the state actually written (which may differ from
    /// `to` after the provider cancel-rewrite).
    pub async fn transition(
        pool: &PgPool,
        task_id: Uuid,
        role: Role,
        from: TaskState,
        to: TaskState,
    ) -> Result<TaskState> {
        let to = if role == Role::Provider {
            Self::rewrite_provider_request(from, to)
        } else {
            to
        };

        if !Self::is_valid_for_role(role, from, to) {
            return Err(CoordinatorError::BadTransition {
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        let rows = db::transition_state(pool, task_id, from, to)
            .await
            .with_context(|| format!("failed to transition task {task_id} to {to}"))?;

        if rows == 0 {
            return match db::get_task(pool, task_id).await? {
                None => Err(CoordinatorError::TaskNotFound(task_id).into()),
                Some(current) => Err(CoordinatorError::BadTransition {
                    from: current.state.to_string(),
                    to: to.to_string(),
                }
                .into()),
            };
        }

        Ok(to)
    }
}
