//! Abstract blob backend trait.
//!
//! Every backing store must implement [`BlobBackend`].  The trait covers
//! exactly what the image layer needs from a container: write, existence,
//! delete, canonical URLs and time-limited read grants.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every [`BlobBackend`] operation.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Async blob storage contract over a single logical container.
pub trait BlobBackend: Send + Sync + 'static {
    /// Create the container if it does not exist yet.  Called once at
    /// startup, never per operation.
    fn ensure_container(&self) -> BackendFuture<'_, ()>;

    /// Write `data` under `name`, overwriting any existing blob, and record
    /// `content_type` as the blob's stored content type.
    fn put(&self, name: &str, data: Bytes, content_type: &str) -> BackendFuture<'_, ()>;

    /// Check whether a blob named `name` exists.
    fn exists(&self, name: &str) -> BackendFuture<'_, bool>;

    /// Delete the blob named `name`.
    fn delete(&self, name: &str) -> BackendFuture<'_, ()>;

    /// Canonical URL of `name`.  Never carries an access grant.
    fn blob_url(&self, name: &str) -> String;

    /// Build a read-only URL for `name` valid until `expiry`.
    fn signed_read_url(&self, name: &str, expiry: DateTime<Utc>) -> anyhow::Result<String>;
}
