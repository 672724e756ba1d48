//! Bearer-token request authentication.
//!
//! [`RequestAuthenticator`] turns an `Authorization: Bearer <token>` header
//! into a [`RequestIdentity`].  [`authenticate_middleware`] runs it for
//! every request and stores the identity in that request's extensions, so
//! concurrent requests never share identity state.  The middleware never
//! rejects: requests without a valid token continue anonymously and
//! handlers decide what anonymous callers may do.

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::jwt::TokenVerifier;
use crate::metrics::record_auth_attempt;

/// Scheme prefix of the `Authorization` header value.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Prefix applied to a role to form its authority.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Authenticated caller of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestIdentity {
    principal: String,
    authority: String,
}

impl RequestIdentity {
    /// Identity for `principal` holding the single authority `ROLE_<role>`.
    pub fn new(principal: impl Into<String>, role: &str) -> Self {
        Self {
            principal: principal.into(),
            authority: format!("{}{}", ROLE_PREFIX, role),
        }
    }

    /// Principal identifier (email).
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The identity's authority, e.g. `ROLE_ADMIN`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Fail with [`ApiError::Forbidden`] unless the identity holds `authority`.
    pub fn require_authority(&self, authority: &str) -> Result<(), ApiError> {
        if self.authority == authority {
            Ok(())
        } else {
            Err(ApiError::Forbidden {
                required: authority.to_string(),
            })
        }
    }
}

/// Extracts the identity placed by [`authenticate_middleware`]; rejects
/// with 401 when the request is anonymous.  Use `Option<RequestIdentity>`
/// for routes open to anonymous callers.
#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Establishes caller identity from a bearer token.
pub struct RequestAuthenticator {
    verifier: Arc<dyn TokenVerifier>,
}

impl RequestAuthenticator {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Resolve the identity carried by `headers`, if any.
    ///
    /// Missing or non-bearer headers yield `None` silently; invalid tokens
    /// and verifier failures are logged and also yield `None`.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<RequestIdentity> {
        let token = bearer_token(headers)?;

        if !self.verifier.validate(token) {
            debug!("Bearer token failed validation");
            record_auth_attempt("invalid");
            return None;
        }

        let identity = self
            .verifier
            .principal(token)
            .and_then(|principal| Ok((principal, self.verifier.role(token)?)));

        match identity {
            Ok((principal, role)) => {
                record_auth_attempt("ok");
                Some(RequestIdentity::new(principal, &role))
            }
            Err(e) => {
                warn!("Could not establish request identity: {:#}", e);
                record_auth_attempt("error");
                None
            }
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?;
    (!token.trim().is_empty()).then_some(token)
}

/// Middleware running [`RequestAuthenticator::authenticate`] on every
/// request.  Always forwards to the next stage.
pub async fn authenticate_middleware(
    State(authenticator): State<Arc<RequestAuthenticator>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(identity) = authenticator.authenticate(req.headers()) {
        debug!(
            "Authenticated {} with {}",
            identity.principal(),
            identity.authority()
        );
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}
