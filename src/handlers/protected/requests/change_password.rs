// handlers/protected/requests/change_password.rs - POST /api/requests/change-password/:id/ handler

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};

use super::PasswordBody;
use crate::auth::Identity;
use crate::database::models::RequestView;
use crate::handlers::parse_request_id;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

/// Sets a caller-chosen password on the database role.
///
/// Expected Input:
/// ```json
/// { "password": "at-least-8-chars" }
/// ```
pub async fn request_change_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    payload: Result<Json<PasswordBody>, JsonRejection>,
) -> ApiResult<RequestView> {
    let id = parse_request_id(&id)?;
    let Json(body) = payload?;
    let request = state
        .provisioning
        .change_password(id, &identity, body.into_secret())
        .await?;
    Ok(ApiResponse::success(request.view()))
}
