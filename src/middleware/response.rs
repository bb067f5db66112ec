use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;

/// Success envelope `{ "success": true, "data": ... }` returned by every handler
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    data: T,
    status: StatusCode,
    confidential: bool,
}

/// Body of a successful delete
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
    pub deleted: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data,
            status: StatusCode::OK,
            confidential: false,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::success(data)
        }
    }

    /// Marks the body as carrying credentials: clients and proxies must not store it
    pub fn confidential(mut self) -> Self {
        self.confidential = true;
        self
    }
}

impl ApiResponse<Deleted> {
    pub fn deleted(id: Uuid) -> Self {
        Self::success(Deleted { id, deleted: true })
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return ApiError::internal_server_error("Failed to serialize response data").into_response();
            }
        };

        let mut response = (self.status, Json(json!({ "success": true, "data": data }))).into_response();
        if self.confidential {
            let headers = response.headers_mut();
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }
        response
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
