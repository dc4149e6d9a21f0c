//! Sync routes: `/api/sync` and `/api/collections`

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use lockbox_core::view::ListResponse;
use lockbox_core::{Owner, SyncOptions, SyncSnapshot};

use crate::error::AppError;
use crate::state::AppState;

/// Build the sync router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync", get(sync))
        .route("/collections", get(collections))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncQuery {
    pub exclude_domains: bool,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Full snapshot of the caller's vault.
async fn sync(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncSnapshot>, AppError> {
    let options = SyncOptions {
        exclude_domains: query.exclude_domains,
    };
    Ok(Json(state.vault.sync(&owner, options).await?))
}

/// Collections are not supported; always an empty list.
async fn collections(Extension(_owner): Extension<Owner>) -> Json<ListResponse<serde_json::Value>> {
    Json(ListResponse::empty())
}
