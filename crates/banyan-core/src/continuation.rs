//! The dependency-graph engine: acquiring and releasing continuation
//! edges, activating children whose dependencies have all resolved, and
//! recursively cancelling subtrees.
//!
//! Every function here assumes the caller already holds
//! `LockRegistry::task_lock` for the duration of the whole operation --
//! these are not individually serializing, since a bulk update touches many
//! rows in sequence.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use banyan_db::models::TaskState;
use banyan_db::queries::tasks as db;

use crate::error::CoordinatorError;

/// A single `{targets, values}` entry in a bulk `add_continuations` or
/// `remove_continuations` request.
#[derive(Debug, Clone)]
pub struct ContinuationUpdate {
    pub targets: Vec<Uuid>,
    pub values: Vec<Uuid>,
}

/// Maximum number of continuations a single task may hold (`MaxContSize`).
pub const MAX_CONT_SIZE: usize = 1024;

/// Maximum number of `{targets, values}` entries in one bulk request
/// (`MaxUpdates`).
pub const MAX_UPDATES: usize = 128;

/// A task is inactive with no pending dependency, i.e. eligible to
/// transition to `available`/`terminated` the moment its count hits zero.
fn is_inactive(state: TaskState) -> bool {
    state == TaskState::Inactive
}

/// Record one parent -> child edge: increments the child's
/// `pending_dependency_count`.
///
/// Precondition: `child` is `inactive` (I1/I4). The caller (insert hook or
/// `make_additions`) is expected to have checked this already; this
/// function trusts it rather than re-fetching, since it always runs right
/// after a state check under the same lock acquisition.
pub async fn acquire(pool: &PgPool, child: Uuid) -> Result<()> {
    db::increment_pending_dependency_count(pool, child).await?;
    Ok(())
}

/// Remove one parent -> child edge and, if the child's dependency count has
/// reached zero, activate it: `available` for a commandful task or
/// `terminated` (recursing into its own continuations) for a grouping task.
pub async fn release(pool: &PgPool, child: Uuid) -> Result<()> {
    let task = db::get_task(pool, child)
        .await?
        .with_context(|| format!("continuation {child} not found"))?;

    if !is_inactive(task.state) || task.pending_dependency_count < 1 {
        anyhow::bail!(
            "release precondition violated for task {child}: state={:?} count={}",
            task.state,
            task.pending_dependency_count
        );
    }

    let remaining = db::decrement_pending_dependency_count(pool, child).await?;
    if remaining == 0 {
        try_make_available(pool, child).await?;
    }
    Ok(())
}

/// Like [`release`], but never activates the child even if its count
/// reaches zero. Used by `remove_continuations`: dropping an edge is not
/// the same as satisfying it.
pub async fn release_keep_inactive(pool: &PgPool, child: Uuid) -> Result<()> {
    db::decrement_pending_dependency_count(pool, child).await?;
    Ok(())
}

/// Activate `child` if it is inactive with no pending dependencies left.
/// A commandful task becomes `available`; a commandless (grouping) task
/// becomes `terminated` directly, and its own continuations are recursively
/// offered the same check.
pub async fn try_make_available(pool: &PgPool, child: Uuid) -> Result<()> {
    let task = db::get_task(pool, child)
        .await?
        .with_context(|| format!("continuation {child} not found"))?;

    if task.state != TaskState::Inactive || task.pending_dependency_count != 0 {
        return Ok(());
    }

    if task.is_commandless() {
        let rows =
            db::transition_state(pool, child, TaskState::Inactive, TaskState::Terminated).await?;
        if rows == 1 {
            for grandchild in task.continuations {
                Box::pin(try_make_available(pool, grandchild)).await?;
            }
        }
    } else {
        db::transition_state(pool, child, TaskState::Inactive, TaskState::Available).await?;
    }
    Ok(())
}

/// Cancel `task` and every descendant reachable through its continuations,
/// then remove `task`'s id from any other task's continuation list.
///
/// `assert_inactive` is set from the terminated-with-failure-at-max-attempts
/// path: continuations there must already be inactive (I4), so a state
/// other than inactive or already cancelled indicates a logic error rather
/// than a race to tolerate.
pub async fn cancel(pool: &PgPool, task: Uuid, assert_inactive: bool) -> Result<()> {
    // `assert_inactive` binds only to the root of this call: a provider may
    // cancel a task from `available`, but every continuation reached by
    // recursing into it must already be `inactive` (I4), so the frontier
    // enforces the check unconditionally past depth zero.
    let mut frontier = VecDeque::new();
    frontier.push_back((task, assert_inactive));

    while let Some((id, require_inactive)) = frontier.pop_front() {
        let current = db::get_task(pool, id)
            .await?
            .with_context(|| format!("task {id} not found while cancelling"))?;

        if current.state == TaskState::Cancelled {
            continue;
        }

        if require_inactive && current.state != TaskState::Inactive {
            anyhow::bail!(
                "cancel precondition violated for task {id}: expected inactive, found {:?}",
                current.state
            );
        }

        db::transition_state(pool, id, current.state, TaskState::Cancelled).await?;
        frontier.extend(current.continuations.into_iter().map(|c| (c, true)));
    }

    db::remove_from_all_continuations(pool, task).await?;
    Ok(())
}

/// Validate then apply a batch of `add_continuations` updates: for every
/// target, diff against its current continuations, append the new ids, and
/// `acquire` each newly added child.
pub async fn make_additions(pool: &PgPool, updates: &[ContinuationUpdate]) -> Result<()> {
    validate_updates(updates)?;

    for update in updates {
        for &target in &update.targets {
            for &value in &update.values {
                if value == target {
                    return Err(CoordinatorError::SelfLoop(target).into());
                }
            }

            let parent = db::get_task(pool, target)
                .await?
                .with_context(|| format!("task {target} not found"))?;
            if parent.state != TaskState::Inactive {
                return Err(CoordinatorError::ContinuationNotInactive(target).into());
            }

            for &value in &update.values {
                let child = db::get_task(pool, value)
                    .await?
                    .with_context(|| format!("task {value} not found"))?;
                if child.state != TaskState::Inactive {
                    return Err(CoordinatorError::ContinuationNotInactive(value).into());
                }
            }

            let added = db::add_continuations(pool, target, &update.values).await?;
            for child in added {
                acquire(pool, child).await?;
            }
        }
    }
    Ok(())
}

/// Validate then apply a batch of `remove_continuations` updates: for every
/// target, intersect against its current continuations and
/// `release_keep_inactive` each removed child.
pub async fn make_removals(pool: &PgPool, updates: &[ContinuationUpdate]) -> Result<()> {
    validate_updates(updates)?;

    for update in updates {
        for &target in &update.targets {
            let parent = db::get_task(pool, target)
                .await?
                .with_context(|| format!("task {target} not found"))?;
            if parent.state != TaskState::Inactive {
                return Err(CoordinatorError::ContinuationNotInactive(target).into());
            }

            let removed = db::remove_continuations(pool, target, &update.values).await?;
            for child in removed {
                release_keep_inactive(pool, child).await?;
            }
        }
    }
    Ok(())
}

fn validate_updates(updates: &[ContinuationUpdate]) -> Result<(), CoordinatorError> {
    if updates.len() > MAX_UPDATES {
        return Err(CoordinatorError::SizeLimit);
    }
    for update in updates {
        if update.values.len() > MAX_CONT_SIZE {
            return Err(CoordinatorError::SizeLimit);
        }
    }
    Ok(())
}
