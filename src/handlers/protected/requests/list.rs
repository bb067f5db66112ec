// handlers/protected/requests/list.rs - GET /api/requests/my/ handler

use axum::{extract::State, Extension};

use crate::auth::Identity;
use crate::database::models::RequestView;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

/// The caller's requests, newest first
pub async fn request_list_mine(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<RequestView>> {
    let requests = state.provisioning.list_mine(&identity).await?;
    Ok(ApiResponse::success(requests.iter().map(|r| r.view()).collect()))
}
