//! Cipher routes: `/api/ciphers/*`
//!
//! CRUD over the caller's ciphers and bulk import. `POST /{id}` and
//! `PUT|POST /{id}/delete` are the verb-override forms clients send when
//! they cannot issue `PUT` or `DELETE`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use lockbox_core::Owner;
use lockbox_core::view::{CipherView, ListResponse};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/api/ciphers` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_ciphers).post(create_cipher))
        .route("/import", post(import))
        .route(
            "/{id}",
            get(get_cipher)
                .put(update_cipher)
                .post(update_cipher)
                .delete(delete_cipher),
        )
        .route("/{id}/delete", post(delete_cipher).put(delete_cipher))
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn list_ciphers(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
) -> Result<Json<ListResponse<CipherView>>, AppError> {
    Ok(Json(state.vault.list_ciphers(&owner).await?))
}

async fn create_cipher(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    body: Bytes,
) -> Result<Json<CipherView>, AppError> {
    Ok(Json(state.vault.create_cipher(&owner, &body).await?))
}

async fn get_cipher(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<CipherView>, AppError> {
    Ok(Json(state.vault.get_cipher(&owner, &id).await?))
}

async fn update_cipher(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<CipherView>, AppError> {
    Ok(Json(state.vault.update_cipher(&owner, &id, &body).await?))
}

async fn delete_cipher(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.vault.delete_cipher(&owner, &id).await?;
    Ok(StatusCode::OK)
}

/// Bulk import. Nothing is written if any part of the body fails to decode.
async fn import(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    state.vault.import(&owner, &body).await?;
    Ok(StatusCode::OK)
}
