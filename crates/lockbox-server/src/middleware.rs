//! Authentication middleware for Lockbox.
//!
//! Extracts the `Authorization: Bearer` token, resolves it to an [`Owner`]
//! through the vault service, and injects the owner into the request
//! extensions for downstream handlers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use lockbox_core::{IdentityError, Owner};

use crate::error::AppError;
use crate::state::AppState;

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that resolves the bearer token to an [`Owner`].
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req).map(str::to_owned) else {
        return AppError::from(IdentityError::MissingCredential).into_response();
    };

    match state.vault.authenticate(&token).await {
        Ok(owner) => {
            req.extensions_mut().insert::<Owner>(owner);
            next.run(req).await
        }
        Err(e) => AppError::from(e).into_response(),
    }
}
