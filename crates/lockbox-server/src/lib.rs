//! Lockbox HTTP server.
//!
//! Wires the vault service from `lockbox-core` into an Axum router. The JSON
//! API lives under `/api/*`; every route except registration requires a
//! bearer token.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let authenticated_routes = Router::new()
        .nest("/api/accounts", routes::accounts::router())
        .nest("/api/ciphers", routes::ciphers::router())
        .nest("/api/folders", routes::folders::router())
        .nest("/api", routes::sync::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    // Registration is unauthenticated; cap concurrent signups.
    let register_routes = Router::new()
        .nest("/api/accounts", routes::accounts::register_router())
        .layer(tower::limit::ConcurrencyLimitLayer::new(10));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    Router::new()
        .route("/alive", get(alive))
        .merge(register_routes)
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Liveness probe: the current time as an RFC 3339 string.
async fn alive() -> axum::Json<String> {
    axum::Json(chrono::Utc::now().to_rfc3339())
}
