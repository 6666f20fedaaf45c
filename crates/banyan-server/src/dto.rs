//! Request/response JSON shapes for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use banyan_db::models::{ExitStatus, RequestedResources, Task, TaskState};

#[derive(Debug, Deserialize)]
pub struct TaskCreateRequest {
    pub name: Option<String>,
    pub command: Option<String>,
    #[serde(default = "default_creation_state")]
    pub state: TaskState,
    #[serde(default)]
    pub continuations: Vec<Uuid>,
    #[serde(default)]
    pub requested_resources: RequestedResources,
    pub estimated_runtime_ms: Option<i64>,
    pub max_shutdown_time_ms: Option<i64>,
    #[serde(default = "default_max_attempt_count")]
    pub max_attempt_count: i32,
}

fn default_creation_state() -> TaskState {
    TaskState::Inactive
}

fn default_max_attempt_count() -> i32 {
    1
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskPatchRequest {
    pub state: Option<TaskState>,
    pub add_continuations: Option<Vec<Uuid>>,
    pub remove_continuations: Option<Vec<Uuid>>,
    pub update_execution_data: Option<UpdateExecutionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateExecutionData {
    /// Present only on the claim (`state: running`) request.
    pub worker_id: Option<Uuid>,
    /// Present only on a termination report; verified against the current
    /// execution record (I7).
    pub token: Option<String>,
    pub exit_status: Option<ExitStatus>,
    pub time_terminated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub memory_usage: Option<serde_json::Value>,
    #[serde(default)]
    pub cpu_usage: Option<serde_json::Value>,
    #[serde(default)]
    pub gpu_usage: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeOk {
    pub status: &'static str,
}

impl Default for EnvelopeOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContinuationUpdateEntry {
    pub targets: Vec<Uuid>,
    pub values: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
    pub ip: String,
    pub port: i32,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Serialize a task, injecting the current execution record's token when
/// the caller just claimed it -- the one case where the response body
/// carries information beyond the physical row, mirroring
/// `append_execution_data_token`'s post-response rewrite.
pub fn task_response(task: &Task, token: Option<&str>) -> serde_json::Value {
    let mut value = serde_json::to_value(task).expect("Task always serializes");
    if let Some(token) = token {
        value["token"] = serde_json::Value::String(token.to_string());
    }
    value
}
