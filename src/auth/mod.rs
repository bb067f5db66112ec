use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Roles issued by the upstream login service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Faculty,
    Admin,
    CollegeAdmin,
    SuperAdmin,
}

impl Role {
    /// May approve or reject requests (within its tenant unless it spans tenants)
    pub fn is_approver(self) -> bool {
        matches!(self, Role::Admin | Role::CollegeAdmin | Role::SuperAdmin)
    }

    pub fn spans_tenants(self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
            Role::CollegeAdmin => "college_admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "admin" => Ok(Role::Admin),
            "college_admin" => Ok(Role::CollegeAdmin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(IdentityError::UnknownRole(other.to_string())),
        }
    }
}

/// Authenticated caller, attached to every request by the identity middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub tenant_id: String,
}

impl Identity {
    /// Whether this caller may act as an administrator over `tenant_id`.
    pub fn administers(&self, tenant_id: &str) -> bool {
        self.role.is_approver() && (self.role.spans_tenants() || self.tenant_id == tenant_id)
    }
}

/// Claims carried by tokens from the login service. The tenant travels as
/// `subdomain`; `tenant_id` is accepted as well.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    #[serde(alias = "tenant_id")]
    pub subdomain: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl Claims {
    pub fn new(user_id: i64, username: String, role: Role, tenant: String, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            user_id,
            username,
            role: role.as_str().to_string(),
            subdomain: tenant,
            exp,
            iat: Some(now.timestamp()),
        }
    }
}

impl TryFrom<Claims> for Identity {
    type Error = IdentityError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.username.trim().is_empty() {
            return Err(IdentityError::MissingClaim("username"));
        }
        if claims.subdomain.trim().is_empty() {
            return Err(IdentityError::MissingClaim("subdomain"));
        }
        Ok(Self {
            user_id: claims.user_id,
            username: claims.username,
            role: claims.role.parse()?,
            tenant_id: claims.subdomain,
        })
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Authorization header must use Bearer token format")]
    MalformedHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing identity claim: {0}")]
    MissingClaim(&'static str),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Token secret not configured")]
    InvalidSecret,
}

/// Verifies bearer tokens with the shared HS256 secret.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: Option<DecodingKey>,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let decoding_key = if secret.is_empty() {
            None
        } else {
            Some(DecodingKey::from_secret(secret.as_bytes()))
        };
        Self { decoding_key }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let decoding_key = self.decoding_key.as_ref().ok_or(IdentityError::InvalidSecret)?;

        let token_data = decode::<Claims>(token, decoding_key, &Validation::default())
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        Identity::try_from(token_data.claims)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("configured", &self.decoding_key.is_some())
            .finish()
    }
}

/// Signs a token with the shared secret. Used by the `token` CLI command to mint
/// development tokens; production tokens come from the login service.
pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, IdentityError> {
    if secret.is_empty() {
        return Err(IdentityError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| IdentityError::InvalidToken(e.to_string()))
}
