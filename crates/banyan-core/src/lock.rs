//! Process-wide locks serializing multi-row task-graph and worker-registry
//! mutations: `tokio::sync::Mutex`s held in a `LockRegistry` constructed
//! once at startup and threaded through axum's `State`, so there is no
//! ambient global state to reason about.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

/// Owns the two coordination-wide locks.
///
/// Cloning a `LockRegistry` clones the `Arc`s, so every handler shares the
/// same underlying mutexes.
#[derive(Clone)]
pub struct LockRegistry {
    task_lock: Arc<Mutex<()>>,
    worker_registry_lock: Arc<Mutex<()>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            task_lock: Arc::new(Mutex::new(())),
            worker_registry_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Acquire the lock serializing task-graph mutations. Held across an
    /// entire POST/PATCH on `/tasks` that touches state, continuations, or
    /// execution data.
    pub async fn task_lock(&self) -> MutexGuard<'_, ()> {
        self.task_lock.lock().await
    }

    /// Acquire the lock serializing worker-registry mutations.
    pub async fn worker_registry_lock(&self) -> MutexGuard<'_, ()> {
        self.worker_registry_lock.lock().await
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
