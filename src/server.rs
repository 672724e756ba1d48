//! Axum router construction.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::auth::authenticate_middleware;
use crate::blob_store::MAX_FILE_SIZE;
use crate::errors::generate_request_id;
use crate::handlers::{identity, images};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Room for multipart framing on top of the largest accepted image.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

// -- OpenAPI document --------------------------------------------------------

/// OpenAPI documentation for the ImageStore API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ImageStore API",
        version = "0.1.0",
        description = "Image storage on Azure Blob Storage with time-limited read URLs"
    ),
    paths(
        health_check,
        identity::current_identity,
        images::upload_image,
        images::access_url,
        images::image_exists,
        images::delete_image,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Identity", description = "Caller identity"),
        (name = "Images", description = "Image storage operations"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/me", get(identity::current_identity))
        .route(
            "/images",
            post(images::upload_image).delete(images::delete_image),
        )
        .route("/images/access-url", get(images::access_url))
        .route("/images/exists", get(images::image_exists))
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        // authenticate_middleware is innermost so identity is set per request.
        .layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            authenticate_middleware,
        ))
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + MULTIPART_OVERHEAD))
}

// -- Common headers middleware -----------------------------------------------

/// Adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `ImageStore`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Error responses carry their own id, which is also in the body.
    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("ImageStore"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- The OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
