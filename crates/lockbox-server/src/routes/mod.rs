//! HTTP route handlers for the Lockbox API.
//!
//! Each submodule builds a `Router<Arc<AppState>>` that is nested under
//! `/api` in [`crate::build_router`].

pub mod accounts;
pub mod ciphers;
pub mod folders;
pub mod sync;
