// handlers/protected/requests/inspect.rs - size and table listing handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use super::PasswordBody;
use crate::auth::Identity;
use crate::database::inspector::DatabaseSize;
use crate::handlers::parse_request_id;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

/// GET /api/requests/size/:id/
pub async fn request_size(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<DatabaseSize> {
    let id = parse_request_id(&id)?;
    let size = state.inspection.size(id, &identity).await?;
    Ok(ApiResponse::success(size))
}

/// POST /api/requests/tables/:id/
///
/// Connects as the database user with the supplied password; a wrong password
/// yields 401 with code `AUTH_FAILED`.
pub async fn request_tables(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    payload: Result<Json<PasswordBody>, JsonRejection>,
) -> ApiResult<Value> {
    let id = parse_request_id(&id)?;
    let Json(body) = payload?;
    let tables = state
        .inspection
        .tables(id, &identity, body.into_secret())
        .await?;
    Ok(ApiResponse::success(json!({ "tables": tables })))
}
