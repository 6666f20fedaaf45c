//! Database query functions for the `users` table: the identity store that
//! backs request-token authentication.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{Role, User};

/// Insert a new user. Fails with a unique-violation error if `name` is
/// already taken, which callers surface as a conflict.
pub async fn insert_user(
    pool: &PgPool,
    name: &str,
    role: Role,
    request_token: &str,
    response_token: Option<&str>,
) -> Result<User> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (name, role, request_token, response_token) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(name)
    .bind(role)
    .bind(request_token)
    .bind(response_token)
    .fetch_one(pool)
    .await
    .context("failed to insert user")
}

/// Look up the identity behind a request token, as presented via HTTP Basic
/// auth on every API call.
pub async fn get_user_by_token(pool: &PgPool, request_token: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE request_token = $1")
        .bind(request_token)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user by token")
}

/// Look up a user by its unique name, for operator tooling.
pub async fn get_user_by_name(pool: &PgPool, name: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user by name")
}

/// Remove a user by name. Returns the number of rows removed (0 or 1).
pub async fn delete_user(pool: &PgPool, name: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM users WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await
        .context("failed to delete user")?;
    Ok(result.rows_affected())
}

/// List every user, ordered by name.
pub async fn list_users(pool: &PgPool) -> Result<Vec<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name ASC")
        .fetch_all(pool)
        .await
        .context("failed to list users")
}
