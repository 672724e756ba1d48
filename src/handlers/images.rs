//! Image upload, access and deletion handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::auth::RequestIdentity;
use crate::blob_store::{ImageUpload, FILE_TOO_LARGE, MAX_VALIDITY_HOURS};
use crate::errors::ApiError;
use crate::metrics::record_blob_operation;
use crate::AppState;

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Authority required to delete images.
pub const ADMIN_AUTHORITY: &str = "ROLE_ADMIN";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Canonical blob URL, without any access grant.
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessUrlResponse {
    /// Time-limited read URL.
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReferenceQuery {
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct AccessUrlQuery {
    pub reference: String,
    pub hours: Option<u64>,
}

/// `POST /images` -- Store the image in the `file` multipart field.
#[utoipa::path(
    post,
    path = "/images",
    tag = "Images",
    operation_id = "UploadImage",
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Missing or invalid file"),
        (status = 401, description = "No authenticated identity"),
        (status = 500, description = "Backing store failure")
    )
)]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Malformed multipart body"))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, "Could not read file"))?;
        upload = Some(ImageUpload {
            filename,
            content_type,
            data,
        });
        break;
    }

    let upload = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing multipart field '{}'", FILE_FIELD))
    })?;
    let reference = state.blobs.store(upload).await?;
    info!(principal = identity.principal(), "Stored {}", reference);

    Ok((StatusCode::CREATED, Json(UploadResponse { reference })).into_response())
}

/// A body cut off by the request size limit is an oversized file, not a
/// malformed request.
fn multipart_error(err: MultipartError, context: &str) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        record_blob_operation("store", "rejected");
        ApiError::InvalidFile(FILE_TOO_LARGE.to_string())
    } else {
        ApiError::BadRequest(format!("{}: {}", context, err))
    }
}

/// `GET /images/access-url` -- Time-limited read URL for an image.
#[utoipa::path(
    get,
    path = "/images/access-url",
    tag = "Images",
    operation_id = "GetAccessUrl",
    params(
        ("reference" = String, Query, description = "Blob URL or blob name"),
        ("hours" = Option<u64>, Query, description = "Validity in hours (1-8760), default from config"),
    ),
    responses(
        (status = 200, description = "Read URL", body = AccessUrlResponse),
        (status = 400, description = "Invalid validity"),
        (status = 404, description = "Image not found")
    )
)]
pub async fn access_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccessUrlQuery>,
) -> Result<Json<AccessUrlResponse>, ApiError> {
    let url = match query.hours {
        Some(hours) if !(1..=MAX_VALIDITY_HOURS).contains(&hours) => {
            return Err(ApiError::BadRequest(format!(
                "hours must be between 1 and {}",
                MAX_VALIDITY_HOURS
            )));
        }
        Some(hours) => {
            state
                .blobs
                .generate_access_url_with_validity(
                    &query.reference,
                    Duration::from_secs(hours * 3600),
                )
                .await
        }
        None => state.blobs.generate_access_url(&query.reference).await,
    };

    url.map(|url| Json(AccessUrlResponse { url }))
        .ok_or(ApiError::NotFound)
}

/// `GET /images/exists` -- Whether an image exists.
#[utoipa::path(
    get,
    path = "/images/exists",
    tag = "Images",
    operation_id = "ImageExists",
    params(
        ("reference" = String, Query, description = "Blob URL or blob name"),
    ),
    responses(
        (status = 200, description = "Existence flag", body = ExistsResponse)
    )
)]
pub async fn image_exists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReferenceQuery>,
) -> Json<ExistsResponse> {
    Json(ExistsResponse {
        exists: state.blobs.exists(&query.reference).await,
    })
}

/// `DELETE /images` -- Delete an image.  Admin only; deleting a missing
/// image still answers 204.
#[utoipa::path(
    delete,
    path = "/images",
    tag = "Images",
    operation_id = "DeleteImage",
    params(
        ("reference" = String, Query, description = "Blob URL or blob name"),
    ),
    responses(
        (status = 204, description = "Deleted (or already absent)"),
        (status = 401, description = "No authenticated identity"),
        (status = 403, description = "Identity is not an administrator")
    )
)]
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Query(query): Query<ReferenceQuery>,
) -> Result<StatusCode, ApiError> {
    identity.require_authority(ADMIN_AUTHORITY)?;
    state.blobs.delete(&query.reference).await;
    info!(
        principal = identity.principal(),
        "Delete requested for {}", query.reference
    );
    Ok(StatusCode::NO_CONTENT)
}
