//! In-memory blob backend.
//!
//! Blobs are held in a `tokio::sync::RwLock<HashMap<...>>`.  Read grants
//! are HMAC-SHA256 signatures over the blob name and expiry, keyed by a
//! random per-process secret, so they can be checked with
//! [`MemoryBackend::verify_grant`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

use super::backend::{BackendFuture, BlobBackend};

type HmacSha256 = Hmac<Sha256>;

/// A stored blob: its bytes and declared content type.
#[derive(Debug, Clone)]
pub struct MemoryBlob {
    pub data: Bytes,
    pub content_type: String,
}

/// In-memory blob backend for a single container.
pub struct MemoryBackend {
    /// Blob name -> blob.
    blobs: tokio::sync::RwLock<HashMap<String, MemoryBlob>>,
    /// Container name, used in canonical URLs.
    container: String,
    /// Grant signing secret.
    signing_key: [u8; 32],
}

impl MemoryBackend {
    /// Create an empty backend for `container`.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            blobs: tokio::sync::RwLock::new(HashMap::new()),
            container: container.into(),
            signing_key: rand::random(),
        }
    }

    /// Fetch a copy of a stored blob.
    pub async fn get(&self, name: &str) -> Option<MemoryBlob> {
        self.blobs.read().await.get(name).cloned()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the backend holds no blobs.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    fn sign(&self, name: &str, expiry: &str) -> anyhow::Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| anyhow::anyhow!("HMAC key error: {}", e))?;
        mac.update(name.as_bytes());
        mac.update(b"\n");
        mac.update(expiry.as_bytes());
        Ok(BASE64_URL.encode(mac.finalize().into_bytes()))
    }

    /// Check a signed read URL produced by this backend.  Returns the blob
    /// name when the signature matches and the grant has not expired.
    pub fn verify_grant(&self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let (base, query) = url.split_once('?')?;
        let name = base.rsplit('/').next()?.to_string();
        let mut expiry = None;
        let mut sig = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("se", v)) => expiry = Some(v),
                Some(("sig", v)) => sig = Some(v),
                _ => {}
            }
        }
        let (expiry, sig) = (expiry?, sig?);

        // verify_slice compares in constant time.
        let mut mac = HmacSha256::new_from_slice(&self.signing_key).ok()?;
        mac.update(name.as_bytes());
        mac.update(b"\n");
        mac.update(expiry.as_bytes());
        let provided = BASE64_URL.decode(sig).ok()?;
        mac.verify_slice(&provided).ok()?;

        let expires_at = DateTime::parse_from_rfc3339(expiry).ok()?.with_timezone(&Utc);
        (now <= expires_at).then_some(name)
    }
}

impl BlobBackend for MemoryBackend {
    fn ensure_container(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            tracing::debug!("Memory container ready: {}", self.container);
            Ok(())
        })
    }

    fn put(&self, name: &str, data: Bytes, content_type: &str) -> BackendFuture<'_, ()> {
        let name = name.to_string();
        let blob = MemoryBlob {
            data,
            content_type: content_type.to_string(),
        };
        Box::pin(async move {
            self.blobs.write().await.insert(name, blob);
            Ok(())
        })
    }

    fn exists(&self, name: &str) -> BackendFuture<'_, bool> {
        let name = name.to_string();
        Box::pin(async move { Ok(self.blobs.read().await.contains_key(&name)) })
    }

    fn delete(&self, name: &str) -> BackendFuture<'_, ()> {
        let name = name.to_string();
        Box::pin(async move {
            self.blobs.write().await.remove(&name);
            Ok(())
        })
    }

    fn blob_url(&self, name: &str) -> String {
        format!("memory://{}/{}", self.container, name)
    }

    fn signed_read_url(&self, name: &str, expiry: DateTime<Utc>) -> anyhow::Result<String> {
        let se = expiry.to_rfc3339_opts(SecondsFormat::Millis, true);
        let sig = self.sign(name, &se)?;
        Ok(format!("{}?se={}&sp=r&sig={}", self.blob_url(name), se, sig))
    }
}

// -- Tests -------------------------------------------------------------------
