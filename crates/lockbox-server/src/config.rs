//! Server configuration for Lockbox.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `LOCKBOX_*` environment variables.

use std::net::SocketAddr;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Secret for signing and verifying bearer tokens. `None` means an
    /// ephemeral secret is generated at startup.
    pub token_secret: Option<String>,
    /// Whether `POST /api/accounts/register` provisions accounts.
    pub signups_allowed: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_backend", &self.storage_backend)
            .field("log_level", &self.log_level)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "[REDACTED]"))
            .field("signups_allowed", &self.signups_allowed)
            .finish()
    }
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Redb persistent storage.
    Redb { path: String },
    /// `RocksDB` persistent storage.
    RocksDb { path: String },
}

const DEFAULT_PORT: u16 = 8000;

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, listening on `0.0.0.0`
    /// - `LOCKBOX_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8000`)
    /// - `LOCKBOX_STORAGE`: `memory`, `redb`, or `rocksdb` (default: `memory`)
    /// - `LOCKBOX_STORAGE_PATH`: path for persistent backends (default: `./data`)
    /// - `LOCKBOX_LOG_LEVEL`: log filter (default: `info`)
    /// - `LOCKBOX_TOKEN_SECRET`: bearer token signing secret (default: ephemeral)
    /// - `LOCKBOX_SIGNUPS_ALLOWED`: allow self-registration (default: `true`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    #[must_use]
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        // Priority: LOCKBOX_BIND_ADDR > PORT > default 127.0.0.1:8000
        let bind_addr = if let Some(addr) = var("LOCKBOX_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
        } else if let Some(port_str) = var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(DEFAULT_PORT);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let storage_path = var("LOCKBOX_STORAGE_PATH").unwrap_or_else(|| "./data".to_owned());

        let storage_backend = match var("LOCKBOX_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "redb" => StorageBackendType::Redb { path: storage_path },
            "rocksdb" => StorageBackendType::RocksDb { path: storage_path },
            _ => StorageBackendType::Memory,
        };

        let log_level = var("LOCKBOX_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let token_secret = var("LOCKBOX_TOKEN_SECRET").filter(|s| !s.is_empty());

        let signups_allowed = var("LOCKBOX_SIGNUPS_ALLOWED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            bind_addr,
            storage_backend,
            log_level,
            token_secret,
            signups_allowed,
        }
    }
}
