// handlers/public/root.rs - GET / handler

use axum::response::Json;
use serde_json::{json, Value};

/// Service name, version and route overview
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Nidhi API",
            "version": version,
            "description": "Self-service PostgreSQL provisioning with admin approval",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "requests": "/api/requests/{create,my,reveal/:id,change-password/:id,delete/:id,size/:id,tables/:id} (identity)",
                "admin": "/api/admin/requests/{pending,approve/:id,reject/:id} (approver roles)",
            }
        }
    }))
}
