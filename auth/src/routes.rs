use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde::Deserialize;

use crate::error::AuthError;
use crate::middleware::{require_admin, require_user, session_from_jar};
use crate::session::{ProviderKind, SessionData, OAUTH_STATE_TTL_SECONDS};
use crate::views::{admin_page_html, deauth_page_html, error_page_html, login_page_html};
use crate::SsoState;

/// Cookie name for storing OAuth temp state ID during OAuth flow
const OAUTH_STATE_COOKIE: &str = "oauth_state_id";

#[derive(Deserialize)]
struct AuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct LoginQuery {
    error: Option<String>,
}

/// Create the single sign-on routes
pub fn sso_routes(state: SsoState) -> Router {
    let public = Router::new()
        .route("/auth/login", get(login_page))
        .route("/auth/logout", post(logout))
        .route("/auth/{provider}", get(start_login))
        .route("/auth/{provider}/callback", get(login_callback))
        .route("/api/auth/strategies", get(list_strategies))
        .route("/api/auth/user-fields", get(list_user_fields));

    let user = Router::new()
        .route("/deauth/{provider}", get(deauth_page).post(deauthorize))
        .route("/api/user/associations", get(list_associations))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin = Router::new()
        .route("/api/admin/plugins", get(admin_menu))
        .route("/admin/plugins/{plugin}", get(admin_page))
        .route("/api/admin/plugins/{plugin}", get(admin_api))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public)
        .merge(user)
        .merge(admin)
        .with_state(state)
}

fn parse_provider(state: &SsoState, raw: &str) -> Result<ProviderKind, StatusCode> {
    let kind = raw.parse::<ProviderKind>().map_err(|_| StatusCode::NOT_FOUND)?;
    if state.strategies().get(kind).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(kind)
}

/// Map a failed login to a response; refused registrations get an explanation page
fn login_error_response(error: AuthError) -> Response {
    match error {
        AuthError::RegistrationDisabled(_) => {
            (StatusCode::FORBIDDEN, Html(error_page_html(&error.to_string()))).into_response()
        }
        other => StatusCode::from(other).into_response(),
    }
}

/// Helper to create session cookie
fn create_session_cookie(state: &SsoState, session_data: &SessionData) -> Cookie<'static> {
    let session_json = serde_json::to_string(session_data).unwrap_or_default();
    let cookie_name = state.config.session.cookie_name.clone();
    let mut cookie = Cookie::new(cookie_name, session_json);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    if state.config.session.secure {
        cookie.set_secure(true);
    }
    // Set max age based on session timeout
    cookie.set_max_age(time::Duration::seconds(state.config.session.timeout_seconds as i64));
    cookie
}

/// Helper to create OAuth state cookie (temporary, for OAuth flow)
fn create_oauth_state_cookie(state_id: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(OAUTH_STATE_COOKIE.to_string(), state_id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    if secure {
        cookie.set_secure(true);
    }
    cookie.set_max_age(time::Duration::seconds(OAUTH_STATE_TTL_SECONDS as i64));
    cookie
}

async fn login_page(
    State(state): State<SsoState>,
    Query(query): Query<LoginQuery>,
) -> Html<String> {
    Html(login_page_html(
        &state.strategies().descriptors(),
        query.error.as_deref(),
    ))
}

async fn list_strategies(State(state): State<SsoState>) -> Response {
    Json(state.strategies().descriptors()).into_response()
}

/// Provider id fields the forum may expose on public user objects
async fn list_user_fields(State(state): State<SsoState>) -> Response {
    Json(state.strategies().user_hash_whitelist()).into_response()
}

async fn start_login(
    State(state): State<SsoState>,
    jar: PrivateCookieJar,
    Path(provider): Path<String>,
) -> Result<(PrivateCookieJar, Redirect), StatusCode> {
    let kind = parse_provider(&state, &provider)?;

    // A signed-in user visiting the login route is linking the provider to their account
    let link_uid = session_from_jar(&state, &jar).map(|session| session.uid);

    let (auth_url, state_id) = state.start_auth(kind, link_uid).await.map_err(|e| {
        tracing::error!("{} auth start failed: {}", kind, e);
        StatusCode::from(e)
    })?;

    let state_cookie = create_oauth_state_cookie(&state_id, state.config.session.secure);
    Ok((jar.add(state_cookie), Redirect::to(&auth_url)))
}

async fn login_callback(
    State(state): State<SsoState>,
    jar: PrivateCookieJar,
    Path(provider): Path<String>,
    Query(query): Query<AuthCallback>,
) -> Response {
    let kind = match parse_provider(&state, &provider) {
        Ok(kind) => kind,
        Err(status) => return status.into_response(),
    };

    if let Some(error) = &query.error {
        let error_msg = query.error_description.as_deref().unwrap_or("Unknown error");
        tracing::error!("{} OAuth error: {} - {}", kind, error, error_msg);
        let target = state
            .config
            .relative_url(&format!("/auth/login?error={}_auth_failed", kind.slug()));
        return (jar, Redirect::to(&target)).into_response();
    }

    let Some(code) = query.code.as_deref() else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    // Get OAuth state ID from cookie
    let Some(state_id) = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string()) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let Some(temp_state) = state.take_oauth_temp_state(&state_id).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let session_data = match state
        .complete_auth(kind, code, query.state.as_deref(), &temp_state)
        .await
    {
        Ok(session_data) => session_data,
        Err(e) => {
            tracing::error!("{} auth completion failed: {}", kind, e);
            return login_error_response(e);
        }
    };

    tracing::info!(uid = session_data.uid, "Signed in with {}", kind);
    let session_cookie = create_session_cookie(&state, &session_data);
    let updated_jar = jar.remove(Cookie::from(OAUTH_STATE_COOKIE)).add(session_cookie);

    (updated_jar, Redirect::to(&state.config.relative_url("/"))).into_response()
}

async fn logout(
    State(state): State<SsoState>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    let cookie_name = state.config.session.cookie_name.clone();
    let target = state.config.relative_url("/auth/login");
    (jar.remove(Cookie::from(cookie_name)), Redirect::to(&target))
}

async fn deauth_page(
    State(state): State<SsoState>,
    Path(provider): Path<String>,
) -> Result<Html<String>, StatusCode> {
    let kind = parse_provider(&state, &provider)?;
    let action = state.config.relative_url(&format!("/deauth/{}", kind.slug()));
    Ok(Html(deauth_page_html(kind.display_name(), &action)))
}

async fn deauthorize(
    State(state): State<SsoState>,
    Extension(session): Extension<SessionData>,
    Path(provider): Path<String>,
) -> Result<Redirect, StatusCode> {
    let kind = parse_provider(&state, &provider)?;

    state
        .deauthorize(kind, session.uid)
        .await
        .map_err(StatusCode::from)?;

    Ok(Redirect::to(&state.config.relative_url("/me/edit")))
}

async fn list_associations(
    State(state): State<SsoState>,
    Extension(session): Extension<SessionData>,
) -> Result<Response, StatusCode> {
    let associations = state
        .associations(session.uid)
        .await
        .map_err(StatusCode::from)?;
    Ok(Json(associations).into_response())
}

/// Admin plugin pages are named `sso-<provider>`
fn parse_plugin(state: &SsoState, plugin: &str) -> Result<ProviderKind, StatusCode> {
    let provider = plugin.strip_prefix("sso-").ok_or(StatusCode::NOT_FOUND)?;
    parse_provider(state, provider)
}

async fn admin_menu(State(state): State<SsoState>) -> Response {
    Json(state.strategies().admin_menu()).into_response()
}

async fn admin_page(
    State(state): State<SsoState>,
    Path(plugin): Path<String>,
) -> Result<Html<String>, StatusCode> {
    let kind = parse_plugin(&state, &plugin)?;
    let view = state.admin_view(kind).await.map_err(StatusCode::from)?;
    Ok(Html(admin_page_html(&view)))
}

async fn admin_api(
    State(state): State<SsoState>,
    Path(plugin): Path<String>,
) -> Result<Response, StatusCode> {
    let kind = parse_plugin(&state, &plugin)?;
    let view = state.admin_view(kind).await.map_err(StatusCode::from)?;
    Ok(Json(view).into_response())
}
