use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

use crate::api_errors::AppError;
use crate::story::UserSession;

/// Header carrying the authenticated user id, set by the fronting auth proxy.
pub const USER_HEADER: &str = "x-user-id";

fn session_from_parts(parts: &Parts) -> Option<UserSession> {
    parts
        .headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(UserSession::new)
}

/// Requires a signed-in user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserSession);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_from_parts(parts)
            .map(CurrentUser)
            .ok_or_else(|| AppError::unauthorized("missing user"))
    }
}

/// The signed-in user if there is one; anonymous readers get `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserSession>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_from_parts(parts)))
    }
}
