use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
///
/// See the transition tables in `banyan_core::state` for which edges are
/// legal for a provider versus a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Inactive,
    Available,
    Running,
    PendingCancellation,
    Cancelled,
    Terminated,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inactive => "inactive",
            Self::Available => "available",
            Self::Running => "running",
            Self::PendingCancellation => "pending_cancellation",
            Self::Cancelled => "cancelled",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskState {
    type Err = TaskStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "available" => Ok(Self::Available),
            "running" => Ok(Self::Running),
            "pending_cancellation" => Ok(Self::PendingCancellation),
            "cancelled" => Ok(Self::Cancelled),
            "terminated" => Ok(Self::Terminated),
            other => Err(TaskStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskState`] string.
#[derive(Debug, Clone)]
pub struct TaskStateParseError(pub String);

impl fmt::Display for TaskStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task state: {:?}", self.0)
    }
}

impl std::error::Error for TaskStateParseError {}

// ---------------------------------------------------------------------------

/// The two identities recognized by the coordinator.
///
/// A provider submits and manages tasks; a worker claims and executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Provider,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provider => "provider",
            Self::Worker => "worker",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider" => Ok(Self::Provider),
            "worker" => Ok(Self::Worker),
            other => Err(RoleParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Role`] string.
#[derive(Debug, Clone)]
pub struct RoleParseError(pub String);

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid role: {:?}", self.0)
    }
}

impl std::error::Error for RoleParseError {}

// ---------------------------------------------------------------------------

/// Outcome a worker reports for a terminated execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
        };
        f.write_str(s)
    }
}

impl FromStr for ExitStatus {
    type Err = ExitStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(ExitStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ExitStatus`] string.
#[derive(Debug, Clone)]
pub struct ExitStatusParseError(pub String);

impl fmt::Display for ExitStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid exit status: {:?}", self.0)
    }
}

impl std::error::Error for ExitStatusParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// Resource requirements a provider attaches to a task.
///
/// Stored as the `requested_resources` JSONB column; all fields are
/// optional because a task may under-specify what it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_memory_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_compute_capability_major: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_compute_capability_minor: Option<i32>,
}

/// A unit of work in the dependency graph.
///
/// `command` is absent for a *grouping* task: one whose only purpose is to
/// gate a set of continuations on its parents completing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub name: Option<String>,
    pub command: Option<String>,
    pub state: TaskState,
    pub continuations: Vec<Uuid>,
    pub pending_dependency_count: i32,
    #[sqlx(json)]
    pub requested_resources: sqlx::types::Json<RequestedResources>,
    pub estimated_runtime_ms: Option<i64>,
    pub max_shutdown_time_ms: Option<i64>,
    pub max_attempt_count: i32,
    pub attempt_count: i32,
    pub execution_data_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Task {
    /// A grouping task carries no command; it exists only to wait on its
    /// dependencies and then release its continuations.
    pub fn is_commandless(&self) -> bool {
        self.command.is_none()
    }
}

/// A single claim/execute/report attempt against a task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub task_id: Uuid,
    pub attempt_count: i32,
    pub worker_id: Uuid,
    pub token: String,
    pub time_started: Option<DateTime<Utc>>,
    pub time_terminated: Option<DateTime<Utc>>,
    pub exit_status: Option<ExitStatus>,
    pub last_update: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub memory_usage: sqlx::types::Json<Option<serde_json::Value>>,
    #[sqlx(json)]
    pub cpu_usage: sqlx::types::Json<Option<serde_json::Value>>,
    #[sqlx(json)]
    pub gpu_usage: sqlx::types::Json<Option<serde_json::Value>>,
}

/// A provider or worker identity, authenticated by `request_token`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub request_token: String,
    pub response_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A worker's registered control-channel endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegisteredWorker {
    pub id: Uuid,
    pub name: String,
    pub ip: String,
    pub port: i32,
    pub permissions: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
