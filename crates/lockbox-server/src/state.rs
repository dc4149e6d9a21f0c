//! Shared application state for the Lockbox server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use lockbox_core::VaultService;

/// Shared application state passed to all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    /// The vault operations.
    pub vault: VaultService,
    /// Whether self-registration is open.
    pub signups_allowed: bool,
}
