//! The structured error type the HTTP boundary maps to status codes.
//!
//! Internal plumbing inside this crate mostly returns `anyhow::Result` for
//! context-chaining convenience; `CoordinatorError` exists for the cases
//! `banyan-server` needs to distinguish (see `SPEC_FULL.md` section 7).

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

/// A single field-level validation complaint, as returned in the `issues`
/// map of an error response.
pub type Issues = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("role {role} is not permitted to perform this operation")]
    Forbidden { role: String },

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("execution record {0} not found")]
    ExecutionRecordNotFound(Uuid),

    #[error("worker {0} not found")]
    WorkerNotFound(Uuid),

    #[error("validation failed")]
    ValidationFailed(Issues),

    #[error("illegal transition from {from} to {to}")]
    BadTransition { from: String, to: String },

    #[error("state transition requires an execution-data payload")]
    MissingExecutionData,

    #[error("continuation {0} is not inactive")]
    ContinuationNotInactive(Uuid),

    #[error("{0} cannot be its own continuation")]
    SelfLoop(Uuid),

    #[error("field {field} cannot be changed once the task has left inactive")]
    MutateAfterInactive { field: String },

    #[error("update exceeds the maximum allowed size")]
    SizeLimit,

    #[error("execution token did not match")]
    TokenMismatch,

    #[error("cannot update execution data of a task in '{state}' state")]
    ExecutionDataLocked { state: String },

    #[error("a name or token is already in use")]
    Conflict,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoordinatorError {
    pub fn single_issue(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut issues = Issues::new();
        issues.insert(field.into(), message.into());
        Self::ValidationFailed(issues)
    }
}
