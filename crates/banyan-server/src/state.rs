//! Shared axum application state: the pool and the two coordination-wide
//! collaborators every handler needs.

use axum::extract::FromRef;
use sqlx::PgPool;

use banyan_core::lock::LockRegistry;
use banyan_core::notifier::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub locks: LockRegistry,
    pub notifier: Notifier,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
