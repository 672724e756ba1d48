//! ImageStore library -- image blobs on Azure Blob Storage behind a small
//! JWT-authenticated HTTP API.
//!
//! [`blob_store::BlobStore`] validates uploads and wraps a pluggable
//! [`storage::backend::BlobBackend`]; [`auth::RequestAuthenticator`]
//! resolves bearer tokens into a per-request identity.

use std::sync::Arc;

pub mod auth;
pub mod blob_store;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod jwt;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::auth::RequestAuthenticator;
use crate::blob_store::BlobStore;
use crate::config::Config;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Image store over the configured container.
    pub blobs: Arc<BlobStore>,
    /// Bearer token authenticator run by the auth middleware.
    pub authenticator: Arc<RequestAuthenticator>,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::jwt::JwtTokenProvider;
    use crate::storage::memory::MemoryBackend;
    use std::time::Duration;

    pub(crate) const TEST_SECRET: &[u8] = b"test-secret";

    /// In-memory state plus handles for seeding and minting tokens.
    pub(crate) struct TestApp {
        pub state: Arc<AppState>,
        pub backend: Arc<MemoryBackend>,
        pub tokens: Arc<JwtTokenProvider>,
    }

    pub(crate) fn test_app() -> TestApp {
        let mut config = Config::default();
        config.storage.backend = "memory".into();
        config.auth.jwt_secret = String::from_utf8_lossy(TEST_SECRET).into_owned();

        let backend = Arc::new(MemoryBackend::new(config.storage.container_name.clone()));
        let tokens = Arc::new(JwtTokenProvider::new(
            TEST_SECRET,
            None,
            Duration::from_secs(3600),
        ));
        let state = Arc::new(AppState {
            blobs: Arc::new(BlobStore::new(
                backend.clone(),
                config.storage.sas_validity(),
            )),
            authenticator: Arc::new(RequestAuthenticator::new(tokens.clone())),
            config,
        });
        TestApp {
            state,
            backend,
            tokens,
        }
    }
}
