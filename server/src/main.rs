mod config;
mod database;
mod sqlite_host;

use axum::{
    extract::Request,
    middleware,
    response::Html,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use forum_sso_auth::{optional_user, sso_routes, SessionData, SsoService, SsoState};
use sqlite_host::SqliteHost;

fn build_router(service: Arc<SsoService>) -> Router {
    let state = SsoState::new(service);

    // Landing page after login; shows who is signed in when there is a session
    let home = Router::new()
        .route("/", get(home_page))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_user));

    Router::new()
        .route("/health", get(health_check))
        .merge(home)
        .merge(sso_routes(state))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn home_page(request: Request) -> Html<String> {
    let body = match request.extensions().get::<SessionData>() {
        Some(session) => format!(
            r#"<p>Signed in as user {} with {}.</p>
<p><a href="/api/user/associations">Linked accounts</a></p>
<form method="post" action="/auth/logout"><button type="submit">Sign out</button></form>"#,
            session.uid,
            session.provider.display_name()
        ),
        None => r#"<p><a href="/auth/login">Sign in</a></p>"#.to_string(),
    };
    Html(format!(
        "<!DOCTYPE html><html><head><title>Forum</title></head><body>{}</body></html>",
        body
    ))
}

/// Periodically drop OAuth login attempts that were never completed
fn spawn_state_cleanup(service: Arc<SsoService>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            service.cleanup_expired_states().await;
            tracing::trace!("Pruned expired OAuth states");
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = config::Config::load_or_default();

    tracing_subscriber::fmt()
        .with_max_level(config.logging.max_level())
        .init();

    tracing::info!("Starting forum SSO server");
    tracing::info!("Configuration loaded:");
    tracing::info!("  Listen: {}:{}", config.server.host, config.server.port);
    tracing::info!("  Forum URL: {}", config.sso.base_url());
    tracing::info!("  Database: {}", config.server.database_path);
    tracing::info!("  Log level: {}", config.logging.level);
    tracing::info!("  Auth0: {}", config.sso.auth0.has_login_credentials());
    tracing::info!("  GitHub: {}", config.sso.github.has_login_credentials());

    let db = database::init_database(Path::new(&config.server.database_path))?;
    let host = Arc::new(SqliteHost::new(db));

    let service = Arc::new(SsoService::new(config.sso.clone(), host)?);
    if !service.has_enabled_providers() {
        tracing::warn!("No single sign-on providers are configured; only the login page will be served");
    }

    spawn_state_cleanup(
        service.clone(),
        Duration::from_secs(config.server.cleanup_interval_seconds.max(1)),
    );

    let ip_addr = config.server.host.parse::<std::net::IpAddr>().unwrap_or_else(|e| {
        tracing::warn!("Failed to parse host '{}': {}. Using 0.0.0.0", config.server.host, e);
        [0, 0, 0, 0].into()
    });
    let addr = SocketAddr::from((ip_addr, config.server.port));

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .serve(build_router(service).into_make_service())
        .await?;

    Ok(())
}
