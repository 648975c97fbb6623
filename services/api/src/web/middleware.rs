//! services/api/src/web/middleware.rs
//!
//! Session middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use classroom_agent_core::domain::Session;
use classroom_agent_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::web::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that resolves the caller's `Session`.
///
/// The user comes from the `x-user-id` header and must exist; the bearer token is
/// optional and is forwarded to the agent platform when present. The resolved session
/// is inserted into request extensions for handlers to use.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let session = session_from_headers(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    state
        .profiles
        .profile(session.user_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => {
                warn!(user_id = %session.user_id, "Request from unknown user.");
                StatusCode::UNAUTHORIZED
            }
            other => {
                error!("Failed to load user profile: {:?}", other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Reads the session identity from request headers. A malformed or missing user id
/// yields `None`; a missing bearer token does not.
pub fn session_from_headers(headers: &HeaderMap) -> Option<Session> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())?;

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    Some(Session::new(user_id, bearer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_reads_user_and_optional_bearer() {
        let user_id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&user_id.to_string()).unwrap(),
        );

        let session = session_from_headers(&headers).unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.bearer(), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        let session = session_from_headers(&headers).unwrap();
        assert_eq!(session.bearer(), Some("abc123"));
    }

    #[test]
    fn malformed_user_id_is_rejected() {
        let mut headers = HeaderMap::new();
        assert!(session_from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("42"));
        assert!(session_from_headers(&headers).is_none());
    }
}
