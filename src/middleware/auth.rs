use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{Identity, IdentityError, TokenVerifier};
use crate::error::ApiError;

const USER_ID_HEADER: &str = "x-user-id";
const USER_NAME_HEADER: &str = "x-user-name";
const USER_ROLE_HEADER: &str = "x-user-role";
const TENANT_HEADER: &str = "x-user-college-id";

/// How callers prove who they are.
#[derive(Debug, Clone)]
pub struct IdentitySource {
    pub verifier: TokenVerifier,
    /// Accept `X-User-*` headers set by a trusted gateway when no bearer token is sent
    pub trust_headers: bool,
}

impl IdentitySource {
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Identity, IdentityError> {
        match extract_bearer_token(headers) {
            Ok(token) => self.verifier.verify(&token),
            Err(IdentityError::MissingToken) if self.trust_headers => identity_from_headers(headers),
            Err(e) => Err(e),
        }
    }
}

/// Authentication middleware that resolves the caller and attaches its `Identity`
pub async fn identity_middleware(
    State(source): State<IdentitySource>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = source.resolve(request.headers()).map_err(|e| {
        tracing::debug!("Rejected caller: {}", e);
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, IdentityError> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(IdentityError::MissingToken)?;

    let auth_str = auth_header.to_str().map_err(|_| IdentityError::MalformedHeader)?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(IdentityError::MalformedHeader),
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, IdentityError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(IdentityError::MissingClaim(name))
}

fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, IdentityError> {
    let user_id = header_value(headers, USER_ID_HEADER)?
        .parse()
        .map_err(|_| IdentityError::MissingClaim(USER_ID_HEADER))?;

    Ok(Identity {
        user_id,
        username: header_value(headers, USER_NAME_HEADER)?.to_string(),
        role: header_value(headers, USER_ROLE_HEADER)?.parse()?,
        tenant_id: header_value(headers, TENANT_HEADER)?.to_string(),
    })
}
