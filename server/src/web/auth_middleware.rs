use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::error::AccessError;

use super::app_state::AppState;

/// Header carrying the caller's user id, set by the upstream authenticator.
pub const USER_HEADER: &str = "x-user-id";

/// Extractor for the authenticated caller. Use this in any handler that
/// acts on behalf of a user.
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Not authenticated").into_response())?;

        match state.engine.get_user(user_id).await {
            Ok(user) => Ok(AuthUser { user_id: user.id }),
            Err(AccessError::NotFound { .. }) => {
                Err((StatusCode::UNAUTHORIZED, "Unknown user").into_response())
            }
            Err(e) => Err(e.into_response()),
        }
    }
}
