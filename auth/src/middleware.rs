use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;

use crate::session::SessionData;
use crate::SsoState;

/// Read and validate the session stored in the private cookie
pub fn session_from_jar(state: &SsoState, jar: &PrivateCookieJar) -> Option<SessionData> {
    let cookie = jar.get(&state.config.session.cookie_name)?;
    let session: SessionData = serde_json::from_str(cookie.value()).ok()?;

    match state.validate_session(&session) {
        Ok(()) => Some(session),
        Err(e) => {
            tracing::debug!("Session validation failed: {}", e);
            None
        }
    }
}

/// Middleware to require a signed-in user; the session is placed in request extensions
pub async fn require_user(
    State(state): State<SsoState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match session_from_jar(&state, &jar) {
        Some(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        None => Redirect::to(&state.config.relative_url("/auth/login")).into_response(),
    }
}

/// Middleware to optionally extract the session without requiring it
pub async fn optional_user(
    State(state): State<SsoState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(session) = session_from_jar(&state, &jar) {
        request.extensions_mut().insert(session);
    }
    next.run(request).await
}

/// Middleware to restrict a route to the configured admin uids
pub async fn require_admin(
    State(state): State<SsoState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(session) = session_from_jar(&state, &jar) else {
        return Redirect::to(&state.config.relative_url("/auth/login")).into_response();
    };

    if !state.is_admin(session.uid) {
        tracing::warn!(uid = session.uid, "Non-admin user denied access to admin page");
        return StatusCode::FORBIDDEN.into_response();
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}
