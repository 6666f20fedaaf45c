//! HTTP Basic-auth extraction: turns an `Authorization` header into an
//! authenticated [`Identity`].

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use sqlx::PgPool;

use banyan_core::CoordinatorError;
use banyan_core::identity::{Identity, decode_basic_auth};
use banyan_db::queries::users;

use crate::error::AppError;

pub struct AuthedUser(pub Identity);

impl<S> FromRequestParts<S> for AuthedUser
where
    PgPool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pool = PgPool::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(AppError::unauthorized)?;

        let token = decode_basic_auth(header).ok_or_else(AppError::unauthorized)?;

        let user = users::get_user_by_token(&pool, &token)
            .await
            .map_err(AppError::from)?
            .ok_or(CoordinatorError::Unauthorized)?;

        Ok(AuthedUser(Identity { user }))
    }
}

/// Reject the request unless the authenticated caller is a provider.
pub fn require_provider(identity: &Identity) -> Result<(), AppError> {
    if identity.is_provider() {
        Ok(())
    } else {
        Err(CoordinatorError::Forbidden { role: identity.role().to_string() }.into())
    }
}

/// Reject the request unless the authenticated caller is a worker.
pub fn require_worker(identity: &Identity) -> Result<(), AppError> {
    if identity.is_worker() {
        Ok(())
    } else {
        Err(CoordinatorError::Forbidden { role: identity.role().to_string() }.into())
    }
}
