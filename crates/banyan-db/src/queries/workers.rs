//! Database query functions for the `registered_workers` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::RegisteredWorker;

/// Register a worker's control-channel endpoint.
pub async fn insert_worker(
    pool: &PgPool,
    name: &str,
    ip: &str,
    port: i32,
    permissions: &[String],
) -> Result<RegisteredWorker> {
    sqlx::query_as::<_, RegisteredWorker>(
        "INSERT INTO registered_workers (name, ip, port, permissions) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(name)
    .bind(ip)
    .bind(port)
    .bind(permissions)
    .fetch_one(pool)
    .await
    .context("failed to insert registered worker")
}

/// Fetch a registered worker by id.
pub async fn get_worker(pool: &PgPool, id: Uuid) -> Result<Option<RegisteredWorker>> {
    sqlx::query_as::<_, RegisteredWorker>("SELECT * FROM registered_workers WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch registered worker")
}

/// Fetch a registered worker by its unique name.
pub async fn get_worker_by_name(pool: &PgPool, name: &str) -> Result<Option<RegisteredWorker>> {
    sqlx::query_as::<_, RegisteredWorker>("SELECT * FROM registered_workers WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("failed to fetch registered worker by name")
}

/// List every registered worker.
pub async fn list_workers(pool: &PgPool) -> Result<Vec<RegisteredWorker>> {
    sqlx::query_as::<_, RegisteredWorker>(
        "SELECT * FROM registered_workers ORDER BY registered_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list registered workers")
}

/// Deregister a worker. Returns the number of rows removed (0 or 1).
pub async fn delete_worker(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM registered_workers WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete registered worker")?;
    Ok(result.rows_affected())
}
