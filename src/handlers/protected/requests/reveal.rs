// handlers/protected/requests/reveal.rs - POST /api/requests/reveal/:id/ handler

use axum::{
    extract::{Path, State},
    Extension,
};

use crate::auth::Identity;
use crate::handlers::parse_request_id;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::RevealedCredentials;

/// Returns the generated password exactly once; later calls get 410 Gone
pub async fn request_reveal(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<RevealedCredentials> {
    let id = parse_request_id(&id)?;
    let credentials = state.provisioning.reveal(id, &identity).await?;
    Ok(ApiResponse::success(credentials).confidential())
}
