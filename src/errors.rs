//! Error types.
//!
//! [`StoreError`] is what the blob layer surfaces to callers of the
//! upload path.  [`ApiError`] is the HTTP-facing enum; it implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::Unauthorized)`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors raised by [`crate::blob_store::BlobStore::store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The upload violates the image upload policy.
    #[error("{0}")]
    InvalidFile(String),

    /// The backing store failed; the object may not be durably stored.
    #[error("Failed to upload file: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidFile(message.into())
    }
}

/// HTTP API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The uploaded file was rejected by the upload policy.
    #[error("{0}")]
    InvalidFile(String),

    /// A request argument is missing or invalid.
    #[error("{0}")]
    BadRequest(String),

    /// No authenticated identity on the request.
    #[error("Authentication required")]
    Unauthorized,

    /// The identity lacks the required authority.
    #[error("Requires authority {required}")]
    Forbidden { required: String },

    /// The referenced image does not exist.
    #[error("The requested image does not exist")]
    NotFound,

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidFile(_) => "InvalidFile",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Forbidden { .. } => "Forbidden",
            ApiError::NotFound => "NotFound",
            ApiError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidFile(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidFile(message) => ApiError::InvalidFile(message),
            StoreError::Backend(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        if let ApiError::Internal(ref e) = self {
            tracing::error!(request_id = %request_id, "Internal error: {:#}", e);
        }

        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
            "request_id": request_id,
        }));

        (status, [("x-request-id", request_id)], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_store_error_maps_to_api_error() {
        let api: ApiError = StoreError::invalid("File is empty").into();
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(api.to_string(), "File is empty");

        let api: ApiError = StoreError::Backend(anyhow::anyhow!("boom")).into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Forbidden {
                required: "ROLE_ADMIN".into()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("connection string leaked"));
        assert!(!err.to_string().contains("leaked"));
    }

    #[test]
    fn test_into_response_status_and_header() {
        let resp = ApiError::NotFound.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().contains_key("x-request-id"));
    }
}
