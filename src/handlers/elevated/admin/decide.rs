// handlers/elevated/admin/decide.rs - approve / reject handlers

use axum::{
    extract::{Path, State},
    Extension,
};

use crate::auth::Identity;
use crate::database::models::RequestView;
use crate::handlers::parse_request_id;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

/// POST /api/admin/requests/approve/:id/
///
/// Provisions the role and database. The generated password is never part of
/// this response; only the owner can reveal it.
pub async fn request_approve(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<RequestView> {
    let id = parse_request_id(&id)?;
    let request = state.provisioning.approve(id, &identity).await?;
    Ok(ApiResponse::success(request.view()))
}

/// POST /api/admin/requests/reject/:id/
pub async fn request_reject(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<RequestView> {
    let id = parse_request_id(&id)?;
    let request = state.provisioning.reject(id, &identity).await?;
    Ok(ApiResponse::success(request.view()))
}
