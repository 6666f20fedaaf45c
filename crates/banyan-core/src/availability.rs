//! Periodic worker-liveness poll: every `poll_interval`, workers seen for
//! the first time get a usage-request probe; workers seen on the previous
//! tick are judged by whether any of their in-flight execution records
//! reported usage since that tick began. A worker that goes quiet has every
//! task it currently claims cancelled (subtree rules apply, since a claimed
//! task may itself have continuations).

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use banyan_db::queries::{execution as execution_db, tasks as db, workers as worker_db};

use crate::continuation;
use crate::lock::LockRegistry;
use crate::notifier::protocol::Frame;
use crate::notifier::Notifier;

/// Default poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// The 16-byte value a frame's `request_token` carries for a given worker.
/// A `Uuid` is exactly 16 bytes, so the worker's own id doubles as the
/// value both sides already agree on without a separate provisioning step.
fn worker_request_token(worker_id: Uuid) -> [u8; 16] {
    *worker_id.as_bytes()
}

/// Run the availability checker until the process is asked to shut down.
/// Intended to be spawned as its own long-lived task alongside the HTTP
/// server and the notifier.
pub async fn run(pool: PgPool, notifier: Notifier, locks: LockRegistry, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut last_tick_at: DateTime<Utc> = Utc::now();

    loop {
        ticker.tick().await;
        let tick_started = Utc::now();

        if let Err(err) = tick(&pool, &notifier, &locks, &mut seen, last_tick_at).await {
            warn!(%err, "availability check tick failed");
        }

        last_tick_at = tick_started;
    }
}

async fn tick(
    pool: &PgPool,
    notifier: &Notifier,
    locks: &LockRegistry,
    seen: &mut HashSet<Uuid>,
    last_tick_at: DateTime<Utc>,
) -> Result<()> {
    let _guard = locks.worker_registry_lock().await;

    let workers = worker_db::list_workers(pool).await?;
    let mut current = HashSet::with_capacity(workers.len());

    for worker in &workers {
        current.insert(worker.id);
        let token = worker_request_token(worker.id);

        if !seen.contains(&worker.id) {
            notifier
                .notify(&worker.name, Frame::resource_usage_request(token))
                .await;
            continue;
        }

        let last_update = execution_db::latest_update_for_worker(pool, worker.id).await?;
        let advanced = last_update.is_some_and(|t| t > last_tick_at);

        if advanced {
            notifier
                .notify(&worker.name, Frame::resource_usage_request(token))
                .await;
        } else {
            info!(worker = worker.name, "worker missed its liveness window, cancelling its tasks");
            for task in db::running_tasks_for_worker(pool, worker.id).await? {
                continuation::cancel(pool, task.id, false).await?;
            }
        }
    }

    *seen = current;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_request_token_is_stable_for_the_same_id() {
        let id = Uuid::new_v4();
        assert_eq!(worker_request_token(id), worker_request_token(id));
    }

    #[test]
    fn worker_request_token_differs_across_ids() {
        assert_ne!(worker_request_token(Uuid::new_v4()), worker_request_token(Uuid::new_v4()));
    }
}
