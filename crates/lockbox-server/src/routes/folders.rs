//! Folder routes: `/api/folders/*`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use lockbox_core::Owner;
use lockbox_core::view::{FolderView, ListResponse};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/api/folders` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_folders).post(create_folder))
        .route(
            "/{id}",
            get(get_folder)
                .put(update_folder)
                .post(update_folder)
                .delete(delete_folder),
        )
        .route("/{id}/delete", post(delete_folder))
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn list_folders(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
) -> Result<Json<ListResponse<FolderView>>, AppError> {
    Ok(Json(state.vault.list_folders(&owner).await?))
}

async fn create_folder(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    body: Bytes,
) -> Result<Json<FolderView>, AppError> {
    Ok(Json(state.vault.create_folder(&owner, &body).await?))
}

async fn get_folder(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<FolderView>, AppError> {
    Ok(Json(state.vault.get_folder(&owner, &id).await?))
}

async fn update_folder(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<FolderView>, AppError> {
    Ok(Json(state.vault.update_folder(&owner, &id, &body).await?))
}

/// Delete a folder. Ciphers filed in it are moved out, not deleted.
async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.vault.delete_folder(&owner, &id).await?;
    Ok(StatusCode::OK)
}
