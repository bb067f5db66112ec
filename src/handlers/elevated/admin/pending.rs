// handlers/elevated/admin/pending.rs - GET /api/admin/requests/pending/ handler

use axum::{extract::State, Extension};

use crate::auth::Identity;
use crate::database::models::RequestView;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

/// Pending requests the caller may decide, oldest first
pub async fn request_list_pending(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<RequestView>> {
    let requests = state.provisioning.list_pending(&identity).await?;
    Ok(ApiResponse::success(requests.iter().map(|r| r.view()).collect()))
}
