// handlers/protected/requests/create.rs - POST /api/requests/create/ handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::auth::Identity;
use crate::database::models::RequestView;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

#[derive(Deserialize)]
pub struct CreateRequestBody {
    pub db_name: String,
}

/// Files a pending request for a new database in the caller's tenant.
///
/// Expected Input:
/// ```json
/// { "db_name": "my-project" }
/// ```
pub async fn request_create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<CreateRequestBody>, JsonRejection>,
) -> ApiResult<RequestView> {
    let Json(body) = payload?;
    let request = state.provisioning.create(&identity, body.db_name.trim()).await?;
    Ok(ApiResponse::created(request.view()))
}
