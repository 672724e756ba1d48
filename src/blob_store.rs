//! Image blob layer.
//!
//! [`BlobStore`] enforces the image upload policy, names blobs
//! `<uuid>.<extension>`, and brokers time-limited read URLs.  Only the
//! upload path reports backing-store failures; access URL generation,
//! delete and existence checks are best-effort and say so in their
//! return types.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::metrics::record_blob_operation;
use crate::storage::backend::BlobBackend;

/// Maximum accepted upload size (5 MiB).
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Rejection message for uploads over [`MAX_FILE_SIZE`].
pub const FILE_TOO_LARGE: &str = "File must not exceed 5MB";

/// Upper bound for an access URL validity, in hours: one year.
pub const MAX_VALIDITY_HOURS: u64 = 8760;

/// Accepted file extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Original filename, used only to derive the extension.
    pub filename: Option<String>,
    /// Declared content type.
    pub content_type: Option<String>,
    /// File content.
    pub data: Bytes,
}

impl ImageUpload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        }
    }
}

/// Image blob store over a single container.
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
    default_validity: Duration,
}

impl BlobStore {
    pub fn new(backend: Arc<dyn BlobBackend>, default_validity: Duration) -> Self {
        Self {
            backend,
            default_validity,
        }
    }

    /// Validate and upload an image, returning its canonical reference.
    ///
    /// The reference never contains an access grant; use
    /// [`BlobStore::generate_access_url`] to obtain a readable URL.
    pub async fn store(&self, upload: ImageUpload) -> Result<String, StoreError> {
        let extension = match validate_upload(&upload) {
            Ok(extension) => extension,
            Err(e) => {
                record_blob_operation("store", "rejected");
                return Err(e);
            }
        };
        let content_type = upload.content_type.as_deref().unwrap_or_default();
        let blob_name = format!("{}.{}", Uuid::new_v4(), extension);

        if let Err(e) = self
            .backend
            .put(&blob_name, upload.data.clone(), content_type)
            .await
        {
            error!("Upload to backing store failed for {}: {:#}", blob_name, e);
            record_blob_operation("store", "error");
            return Err(StoreError::Backend(e));
        }

        info!(
            "Image uploaded: {} ({} bytes, {})",
            blob_name,
            upload.data.len(),
            content_type
        );
        record_blob_operation("store", "ok");
        Ok(self.backend.blob_url(&blob_name))
    }

    /// Build a read URL for `reference` valid for the default validity.
    pub async fn generate_access_url(&self, reference: &str) -> Option<String> {
        self.generate_access_url_with_validity(reference, self.default_validity)
            .await
    }

    /// Build a read URL for `reference` valid for `validity`.
    ///
    /// Returns `None` when the reference has no blob name, the blob does
    /// not exist, or the backing store fails.
    pub async fn generate_access_url_with_validity(
        &self,
        reference: &str,
        validity: Duration,
    ) -> Option<String> {
        let Some(blob_name) = extract_blob_name(reference) else {
            warn!("Invalid blob reference for access URL: '{}'", reference);
            record_blob_operation("access_url", "invalid");
            return None;
        };

        match self.backend.exists(blob_name).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Blob does not exist: {}", blob_name);
                record_blob_operation("access_url", "missing");
                return None;
            }
            Err(e) => {
                error!("Existence check failed for {}: {:#}", blob_name, e);
                record_blob_operation("access_url", "error");
                return None;
            }
        }

        let expiry = match chrono::Duration::from_std(validity) {
            Ok(validity) => Utc::now() + validity,
            Err(e) => {
                error!("Access URL validity out of range ({:?}): {}", validity, e);
                record_blob_operation("access_url", "error");
                return None;
            }
        };

        match self.backend.signed_read_url(blob_name, expiry) {
            Ok(url) => {
                debug!("Access URL generated for {} (expires {})", blob_name, expiry);
                record_blob_operation("access_url", "ok");
                Some(url)
            }
            Err(e) => {
                error!("Access URL generation failed for {}: {:#}", blob_name, e);
                record_blob_operation("access_url", "error");
                None
            }
        }
    }

    /// Delete the blob behind `reference`.  Best-effort: missing blobs and
    /// backing-store failures are logged, never returned.
    pub async fn delete(&self, reference: &str) {
        let Some(blob_name) = extract_blob_name(reference) else {
            warn!("Invalid blob reference, nothing to delete: '{}'", reference);
            record_blob_operation("delete", "invalid");
            return;
        };

        match self.backend.exists(blob_name).await {
            Ok(true) => match self.backend.delete(blob_name).await {
                Ok(()) => {
                    info!("Image deleted: {}", blob_name);
                    record_blob_operation("delete", "ok");
                }
                Err(e) => {
                    error!("Delete failed for {}: {:#}", blob_name, e);
                    record_blob_operation("delete", "error");
                }
            },
            Ok(false) => {
                warn!("Blob does not exist: {}", blob_name);
                record_blob_operation("delete", "missing");
            }
            Err(e) => {
                error!("Existence check failed for {}: {:#}", blob_name, e);
                record_blob_operation("delete", "error");
            }
        }
    }

    /// Whether the blob behind `reference` exists.  Any failure reads as
    /// `false`.
    pub async fn exists(&self, reference: &str) -> bool {
        let Some(blob_name) = extract_blob_name(reference) else {
            return false;
        };
        match self.backend.exists(blob_name).await {
            Ok(found) => found,
            Err(e) => {
                error!("Existence check failed for {}: {:#}", blob_name, e);
                record_blob_operation("exists", "error");
                false
            }
        }
    }
}

/// Check `upload` against the image policy and return its extension.
///
/// Rules are checked in order: non-empty, at most [`MAX_FILE_SIZE`],
/// filename with an extension, extension in [`ALLOWED_EXTENSIONS`],
/// content type starting with `image/`.
pub fn validate_upload(upload: &ImageUpload) -> Result<&str, StoreError> {
    if upload.data.is_empty() {
        return Err(StoreError::invalid("File is empty"));
    }

    if upload.data.len() > MAX_FILE_SIZE {
        return Err(StoreError::invalid(FILE_TOO_LARGE));
    }

    let extension = file_extension(upload.filename.as_deref())?;

    if !ALLOWED_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
        return Err(StoreError::InvalidFile(format!(
            "File type not allowed. Accepted extensions: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    match upload.content_type.as_deref() {
        Some(ct) if ct.starts_with("image/") => Ok(extension),
        _ => Err(StoreError::invalid("Only images are accepted")),
    }
}

/// Extension of `filename`: the text after the last `.` of its final path
/// component, case preserved.
pub fn file_extension(filename: Option<&str>) -> Result<&str, StoreError> {
    let filename = match filename {
        Some(name) if !name.is_empty() => name,
        _ => return Err(StoreError::invalid("Invalid filename")),
    };

    // Some clients send a full client-side path.
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    match base.rfind('.') {
        Some(idx) => Ok(&base[idx + 1..]),
        None => Err(StoreError::invalid("File must have an extension")),
    }
}

/// Blob name of a reference: the last path segment once any query string
/// (such as a previously appended access grant) is dropped.
pub fn extract_blob_name(reference: &str) -> Option<&str> {
    let without_query = reference.split('?').next().unwrap_or_default();
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

// -- Tests -------------------------------------------------------------------
