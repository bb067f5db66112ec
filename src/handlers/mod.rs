// handlers/mod.rs - 3-Tier Handler Architecture
//
// Public (no identity) → Protected (any caller with an identity) → Elevated
// (approver roles, tenant-bounded unless super_admin)
pub mod public;    // Tier 1: No identity required (/, /health)
pub mod protected; // Tier 2: Identity required (/api/requests/*)
pub mod elevated;  // Tier 3: Approver role required (/api/admin/*)

use uuid::Uuid;

use crate::error::ApiError;

/// Parse the `:id` path segment of request routes
pub(crate) fn parse_request_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid request id: {}", raw)))
}
