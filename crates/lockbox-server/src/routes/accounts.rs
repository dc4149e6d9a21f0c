//! Account routes: `/api/accounts/*`
//!
//! Profile read and key-pair upload for the caller, plus the unauthenticated
//! registration endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use lockbox_core::Owner;
use lockbox_core::view::Profile;

use crate::error::AppError;
use crate::state::AppState;

/// Build the authenticated `/api/accounts` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(profile))
        .route("/keys", post(update_keys))
}

/// Build the unauthenticated registration router.
pub fn register_router() -> Router<Arc<AppState>> {
    Router::new().route("/register", post(register))
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Return the caller's profile.
async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.vault.profile(&owner).await?))
}

/// Overwrite the caller's key pair.
async fn update_keys(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    body: Bytes,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.vault.update_keys(&owner, &body).await?))
}

/// Provision a new account.
async fn register(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Profile>, AppError> {
    if !state.signups_allowed {
        return Err(AppError::Forbidden(
            "registration is disabled on this server".to_owned(),
        ));
    }
    Ok(Json(state.vault.register(&body).await?))
}
