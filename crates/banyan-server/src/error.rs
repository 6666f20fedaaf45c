//! Maps `CoordinatorError` to the `{status, issues}` HTTP envelope, using a
//! structured per-field issue map rather than a single free-text message so
//! providers and workers can act on a validation failure programmatically.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use banyan_core::CoordinatorError;
use banyan_core::error::Issues;

pub struct AppError {
    status: StatusCode,
    issues: Issues,
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    issues: Issues,
}

impl AppError {
    pub fn not_found(field: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            issues: [(field.to_string(), message.into())].into_iter().collect(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            issues: [("authorization".to_string(), "missing or unknown token".to_string())]
                .into_iter()
                .collect(),
        }
    }
}

impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Unauthorized | CoordinatorError::TokenMismatch => Self {
                status: StatusCode::UNAUTHORIZED,
                issues: [("authorization".to_string(), err.to_string())].into_iter().collect(),
            },
            CoordinatorError::Forbidden { .. } => Self {
                status: StatusCode::UNAUTHORIZED,
                issues: [("role".to_string(), err.to_string())].into_iter().collect(),
            },
            CoordinatorError::TaskNotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                issues: [("id".to_string(), format!("task {id} not found"))].into_iter().collect(),
            },
            CoordinatorError::ExecutionRecordNotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                issues: [("id".to_string(), format!("execution record {id} not found"))]
                    .into_iter()
                    .collect(),
            },
            CoordinatorError::WorkerNotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                issues: [("id".to_string(), format!("worker {id} not found"))].into_iter().collect(),
            },
            CoordinatorError::ValidationFailed(issues) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues,
            },
            CoordinatorError::BadTransition { from, to } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [("state".to_string(), format!("cannot transition from {from} to {to}"))]
                    .into_iter()
                    .collect(),
            },
            CoordinatorError::MissingExecutionData => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [(
                    "update_execution_data".to_string(),
                    "this transition requires an execution-data payload".to_string(),
                )]
                .into_iter()
                .collect(),
            },
            CoordinatorError::ContinuationNotInactive(id) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [("values".to_string(), format!("task {id} is not inactive"))]
                    .into_iter()
                    .collect(),
            },
            CoordinatorError::SelfLoop(id) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [("values".to_string(), format!("{id} cannot be its own continuation"))]
                    .into_iter()
                    .collect(),
            },
            CoordinatorError::MutateAfterInactive { field } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [(field.clone(), "cannot be changed once the task has left inactive".to_string())]
                    .into_iter()
                    .collect(),
            },
            CoordinatorError::SizeLimit => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [("values".to_string(), "update exceeds the maximum allowed size".to_string())]
                    .into_iter()
                    .collect(),
            },
            CoordinatorError::Conflict => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [("name".to_string(), "already in use".to_string())].into_iter().collect(),
            },
            CoordinatorError::ExecutionDataLocked { state } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                issues: [(
                    "update_execution_data".to_string(),
                    format!("cannot update execution data of a task in '{state}' state"),
                )]
                .into_iter()
                .collect(),
            },
            CoordinatorError::Internal(e) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                issues: [("internal".to_string(), format!("{e:#}"))].into_iter().collect(),
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CoordinatorError>() {
            Ok(coordinator_err) => coordinator_err.into(),
            Err(err) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                issues: [("internal".to_string(), format!("{err:#}"))].into_iter().collect(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { status: "error", issues: self.issues })).into_response()
    }
}
