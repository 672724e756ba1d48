//! Caller identity handler.

use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::RequestIdentity;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    /// Principal identifier (email).
    pub principal: String,
    /// Granted authority, e.g. `ROLE_ADMIN`.
    pub authority: String,
}

/// `GET /me` -- The identity established for this request.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Identity",
    operation_id = "CurrentIdentity",
    responses(
        (status = 200, description = "Authenticated identity", body = IdentityResponse),
        (status = 401, description = "No authenticated identity")
    )
)]
pub async fn current_identity(identity: RequestIdentity) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        principal: identity.principal().to_string(),
        authority: identity.authority().to_string(),
    })
}
