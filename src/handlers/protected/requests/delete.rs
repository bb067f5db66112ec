// handlers/protected/requests/delete.rs - POST /api/requests/delete/:id/ handler

use axum::{
    extract::{Path, State},
    Extension,
};
use crate::auth::Identity;
use crate::handlers::parse_request_id;
use crate::middleware::{ApiResponse, ApiResult, Deleted};
use crate::server::AppState;

/// Drops the database and role, or any leftovers of an unfinished approval,
/// and removes the request
pub async fn request_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    let id = parse_request_id(&id)?;
    state.provisioning.delete(id, &identity).await?;
    Ok(ApiResponse::deleted(id))
}
