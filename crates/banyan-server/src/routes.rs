//! The HTTP API: every coordinator endpoint wired into one `axum::Router`,
//! via the usual `Router::new().route(...).layer(...).with_state(...)`
//! builder chain.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use banyan_core::{continuation, execution, virtual_resource};
use banyan_db::queries::{execution as execution_db, tasks as task_db, workers as worker_db};

use crate::auth::{AuthedUser, require_provider, require_worker};
use crate::dto::{
    ContinuationUpdateEntry, EnvelopeOk, RegisterWorkerRequest, TaskCreateRequest,
    TaskPatchRequest, UpdateExecutionData, task_response,
};
use crate::error::AppError;
use crate::hooks;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/add_continuations", post(add_continuations_resource))
        .route("/tasks/remove_continuations", post(remove_continuations_resource))
        .route("/tasks/{id}", get(get_task).patch(patch_task))
        .route("/tasks/{id}/add_continuations", post(add_continuations_item))
        .route("/tasks/{id}/remove_continuations", post(remove_continuations_item))
        .route("/tasks/{id}/update_execution_data", post(update_execution_data_item))
        .route("/execution_info", get(list_execution_info))
        .route("/execution_info/{id}", get(get_execution_info))
        .route("/registered_workers", post(register_worker))
        .route("/registered_workers/{id}", delete(deregister_worker))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn list_tasks(
    State(state): State<AppState>,
    AuthedUser(_identity): AuthedUser,
) -> Result<Response, AppError> {
    let tasks = task_db::list_tasks(&state.pool).await?;
    Ok(Json(tasks).into_response())
}

async fn get_task(
    State(state): State<AppState>,
    AuthedUser(_identity): AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let task = task_db::get_task(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("id", format!("task {id} not found")))?;
    Ok(Json(task).into_response())
}

async fn create_task(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Json(req): Json<TaskCreateRequest>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let task = hooks::insert_task(&state.pool, &state.locks, req).await?;
    Ok((StatusCode::CREATED, Json(task_response(&task, None))).into_response())
}

async fn patch_task(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<TaskPatchRequest>,
) -> Result<Response, AppError> {
    let (task, token) = hooks::patch_task(&state.pool, &state.locks, id, &identity, req).await?;
    Ok(Json(task_response(&task, token.as_deref())).into_response())
}

// ---------------------------------------------------------------------------
// Virtual resources: add_continuations / remove_continuations
// ---------------------------------------------------------------------------

async fn add_continuations_resource(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Json(entries): Json<Vec<ContinuationUpdateEntry>>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let updates: Vec<_> = entries.into_iter().map(Into::into).collect();
    let _guard = state.locks.task_lock().await;
    virtual_resource::validate_shape(&updates)?;
    continuation::make_additions(&state.pool, &updates).await?;
    Ok(Json(EnvelopeOk::default()).into_response())
}

async fn remove_continuations_resource(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Json(entries): Json<Vec<ContinuationUpdateEntry>>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let updates: Vec<_> = entries.into_iter().map(Into::into).collect();
    let _guard = state.locks.task_lock().await;
    virtual_resource::validate_shape(&updates)?;
    continuation::make_removals(&state.pool, &updates).await?;
    Ok(Json(EnvelopeOk::default()).into_response())
}

async fn add_continuations_item(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Path(id): Path<Uuid>,
    Json(values): Json<Vec<Uuid>>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let updates = virtual_resource::wrap_item_level(id, values);
    let _guard = state.locks.task_lock().await;
    virtual_resource::validate_shape(&updates)?;
    continuation::make_additions(&state.pool, &updates).await?;
    Ok(Json(EnvelopeOk::default()).into_response())
}

async fn remove_continuations_item(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Path(id): Path<Uuid>,
    Json(values): Json<Vec<Uuid>>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let updates = virtual_resource::wrap_item_level(id, values);
    let _guard = state.locks.task_lock().await;
    virtual_resource::validate_shape(&updates)?;
    continuation::make_removals(&state.pool, &updates).await?;
    Ok(Json(EnvelopeOk::default()).into_response())
}

async fn update_execution_data_item(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateExecutionData>,
) -> Result<Response, AppError> {
    require_worker(&identity)?;
    let token = data
        .token
        .ok_or(banyan_core::CoordinatorError::MissingExecutionData)?;
    execution::update_usage(
        &state.pool,
        id,
        &token,
        data.time_terminated.unwrap_or_else(chrono::Utc::now),
        data.memory_usage,
        data.cpu_usage,
        data.gpu_usage,
    )
    .await?;
    Ok(Json(EnvelopeOk::default()).into_response())
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

async fn list_execution_info(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let records = execution_db::list_all(&state.pool).await?;
    Ok(Json(records).into_response())
}

async fn get_execution_info(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let record = execution_db::get_execution_record(&state.pool, id)
        .await?
        .ok_or(banyan_core::CoordinatorError::ExecutionRecordNotFound(id))?;
    Ok(Json(record).into_response())
}

// ---------------------------------------------------------------------------
// Registered workers
// ---------------------------------------------------------------------------

async fn register_worker(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Json(req): Json<RegisterWorkerRequest>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let _guard = state.locks.worker_registry_lock().await;

    let addr: SocketAddr = format!("{}:{}", req.ip, req.port)
        .parse()
        .map_err(|_| {
            banyan_core::CoordinatorError::single_issue("ip", "not a valid host:port pair")
        })?;

    let worker =
        worker_db::insert_worker(&state.pool, &req.name, &req.ip, req.port, &req.permissions)
            .await?;
    state.notifier.register(worker.name.clone(), addr).await;

    Ok((StatusCode::CREATED, Json(worker)).into_response())
}

async fn deregister_worker(
    State(state): State<AppState>,
    AuthedUser(identity): AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require_provider(&identity)?;
    let _guard = state.locks.worker_registry_lock().await;

    let worker = worker_db::get_worker(&state.pool, id)
        .await?
        .ok_or(banyan_core::CoordinatorError::WorkerNotFound(id))?;

    state
        .notifier
        .unregister(&worker.name, *id.as_bytes())
        .await;
    worker_db::delete_worker(&state.pool, id).await?;

    Ok(Json(EnvelopeOk::default()).into_response())
}
