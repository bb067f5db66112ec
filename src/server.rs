use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::TokenVerifier;
use crate::config::{ApiConfig, AppConfig, SecurityConfig};
use crate::database::{DatabaseManager, PgInspector, PgProvisioner, PgRequestDirectory};
use crate::handlers::{elevated, protected, public};
use crate::middleware::{identity_middleware, IdentitySource};
use crate::services::{ConnectionInfo, InspectionService, ProvisioningService};
use crate::vault::CredentialVault;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub provisioning: Arc<ProvisioningService>,
    pub inspection: Arc<InspectionService>,
    pub identity: IdentitySource,
    /// Pinged by `/health`; absent when the services run without PostgreSQL
    pub database: Option<DatabaseManager>,
}

impl AppState {
    /// Wires the PostgreSQL-backed services from configuration
    pub fn from_config(config: &AppConfig, manager: DatabaseManager) -> Self {
        let directory = Arc::new(PgRequestDirectory::new(manager.main_pool()));
        let provisioner = Arc::new(PgProvisioner::new(manager.cluster_pool()));
        let inspector = Arc::new(PgInspector::new(
            manager.clone(),
            Duration::from_secs(config.provisioning.connect_timeout_secs),
        ));

        let provisioning = ProvisioningService::new(
            directory.clone(),
            provisioner,
            CredentialVault::new(
                config.provisioning.generated_password_length,
                config.provisioning.min_password_length,
            ),
            config.provisioning.max_requests_per_owner,
            ConnectionInfo {
                host: config.provisioning.public_host.clone(),
                port: config.provisioning.public_port,
            },
        );
        let inspection = InspectionService::new(directory, inspector);

        Self {
            provisioning: Arc::new(provisioning),
            inspection: Arc::new(inspection),
            identity: IdentitySource {
                verifier: TokenVerifier::new(&config.security.jwt_secret),
                trust_headers: config.security.trust_identity_headers,
            },
            database: Some(manager),
        }
    }
}

pub fn app(state: AppState, api_config: &ApiConfig, security: &SecurityConfig) -> Router {
    let api = Router::new()
        .merge(request_routes())
        .merge(admin_routes())
        .route_layer(from_fn_with_state(state.identity.clone(), identity_middleware));

    let router = Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Identity required
        .nest("/api", api)
        .with_state(state);

    // Global middleware
    let router = match cors_layer(security) {
        Some(cors) => router.layer(cors),
        None => router,
    };
    if api_config.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn request_routes() -> Router<AppState> {
    use protected::requests;

    Router::new()
        .route("/requests/create/", post(requests::request_create))
        .route("/requests/my/", get(requests::request_list_mine))
        .route("/requests/reveal/:id/", post(requests::request_reveal))
        .route("/requests/change-password/:id/", post(requests::request_change_password))
        .route("/requests/delete/:id/", post(requests::request_delete))
        .route("/requests/size/:id/", get(requests::request_size))
        .route("/requests/tables/:id/", post(requests::request_tables))
}

fn admin_routes() -> Router<AppState> {
    use elevated::admin;

    Router::new()
        .route("/admin/requests/pending/", get(admin::request_list_pending))
        .route("/admin/requests/approve/:id/", post(admin::request_approve))
        .route("/admin/requests/reject/:id/", post(admin::request_reject))
}

fn cors_layer(security: &SecurityConfig) -> Option<CorsLayer> {
    if !security.enable_cors {
        return None;
    }
    if security.cors_origins.iter().any(|o| o == "*") {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt, Claims, Role};
    use crate::testing::{MemoryCluster, MemoryDirectory};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "router-secret";

    struct Harness {
        router: Router,
        cluster: Arc<MemoryCluster>,
    }

    fn security() -> SecurityConfig {
        SecurityConfig {
            jwt_secret: SECRET.to_string(),
            trust_identity_headers: false,
            enable_cors: true,
            cors_origins: vec!["http://localhost:5173".to_string()],
            dev_token_expiry_hours: 1,
        }
    }

    fn api_config(enable_request_logging: bool) -> ApiConfig {
        ApiConfig {
            port: 0,
            enable_request_logging,
        }
    }

    fn harness() -> Harness {
        harness_with(api_config(true))
    }

    fn harness_with(api: ApiConfig) -> Harness {
        let directory = Arc::new(MemoryDirectory::default());
        let cluster = Arc::new(MemoryCluster::default());
        let provisioning = ProvisioningService::new(
            directory.clone(),
            cluster.clone(),
            CredentialVault::new(16, 8),
            5,
            ConnectionInfo {
                host: "db.example.edu".into(),
                port: 5432,
            },
        );
        let inspection = InspectionService::new(directory, cluster.clone());
        let state = AppState {
            provisioning: Arc::new(provisioning),
            inspection: Arc::new(inspection),
            identity: IdentitySource {
                verifier: TokenVerifier::new(SECRET),
                trust_headers: false,
            },
            database: None,
        };
        Harness {
            router: app(state, &api, &security()),
            cluster,
        }
    }

    fn token(user_id: i64, username: &str, role: Role, tenant: &str) -> String {
        generate_jwt(&Claims::new(user_id, username.into(), role, tenant.into(), 1), SECRET).unwrap()
    }

    fn student() -> String {
        token(7, "alice", Role::Student, "north")
    }

    fn admin() -> String {
        token(1, "dean", Role::Admin, "north")
    }

    async fn call(router: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, value) = call_with_headers(router, method, uri, token, body).await;
        (status, value)
    }

    async fn call_with_headers(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, header::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, value)
    }

    async fn create(router: &Router, db_name: &str) -> String {
        let (status, body) = call(
            router,
            Method::POST,
            "/api/requests/create/",
            Some(&student()),
            Some(json!({ "db_name": db_name })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn public_routes_need_no_identity() {
        let h = harness();
        let (status, body) = call(&h.router, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");

        let (status, body) = call(&h.router, Method::GET, "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Nidhi API");
    }

    #[tokio::test]
    async fn routes_serve_with_request_logging_off() {
        let h = harness_with(api_config(false));
        let (status, _) = call(&h.router, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&h.router, Method::GET, "/api/requests/my/", Some(&student()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn api_requires_identity() {
        let h = harness();
        let (status, body) = call(&h.router, Method::GET, "/api/requests/my/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = call(&h.router, Method::GET, "/api/requests/my/", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn full_lifecycle_over_http() {
        let h = harness();
        let id = create(&h.router, "proj1").await;

        let (status, body) = call(&h.router, Method::GET, "/api/admin/requests/pending/", Some(&admin()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &h.router,
            Method::POST,
            &format!("/api/admin/requests/approve/{}/", id),
            Some(&admin()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "approved");
        assert_eq!(body["data"]["password_viewable"], true);
        assert!(body["data"].get("db_password").is_none());

        let reveal_uri = format!("/api/requests/reveal/{}/", id);
        let (status, headers, body) = call_with_headers(&h.router, Method::POST, &reveal_uri, Some(&student()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        let password = body["data"]["db_password"].as_str().unwrap().to_string();
        let db_user = body["data"]["db_user"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["host"], "db.example.edu");
        assert!(h.cluster.role_password_is(&db_user, &password));

        let (status, body) = call(&h.router, Method::POST, &reveal_uri, Some(&student()), None).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["code"], "ALREADY_REVEALED");

        let tables_uri = format!("/api/requests/tables/{}/", id);
        let (status, body) = call(
            &h.router,
            Method::POST,
            &tables_uri,
            Some(&student()),
            Some(json!({ "password": "wrong-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTH_FAILED");

        let (status, body) = call(
            &h.router,
            Method::POST,
            &tables_uri,
            Some(&student()),
            Some(json!({ "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tables"], json!([]));

        let (status, body) = call(
            &h.router,
            Method::GET,
            &format!("/api/requests/size/{}/", id),
            Some(&student()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["bytes"].as_i64().unwrap() > 0);
        assert!(body["data"]["size"].is_string());

        let (status, body) = call(
            &h.router,
            Method::POST,
            &format!("/api/requests/delete/{}/", id),
            Some(&student()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], true);
        assert!(!h.cluster.has_role(&db_user));

        let (status, body) = call(
            &h.router,
            Method::GET,
            &format!("/api/requests/size/{}/", id),
            Some(&student()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn students_cannot_review() {
        let h = harness();
        let id = create(&h.router, "proj1").await;

        let (status, body) = call(&h.router, Method::GET, "/api/admin/requests/pending/", Some(&student()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, _) = call(
            &h.router,
            Method::POST,
            &format!("/api/admin/requests/approve/{}/", id),
            Some(&student()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bad_input_is_rejected() {
        let h = harness();
        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/requests/create/",
            Some(&student()),
            Some(json!({ "db_name": "Not Valid!" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_NAME");

        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/requests/create/",
            Some(&student()),
            Some(json!({ "name": "proj1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_JSON");

        let (status, body) = call(&h.router, Method::POST, "/api/requests/reveal/not-a-uuid/", Some(&student()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn duplicate_and_weak_password_codes() {
        let h = harness();
        let id = create(&h.router, "proj1").await;

        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/requests/create/",
            Some(&student()),
            Some(json!({ "db_name": "proj1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "DUPLICATE_NAME");

        call(
            &h.router,
            Method::POST,
            &format!("/api/admin/requests/approve/{}/", id),
            Some(&admin()),
            None,
        )
        .await;
        let (status, body) = call(
            &h.router,
            Method::POST,
            &format!("/api/requests/change-password/{}/", id),
            Some(&student()),
            Some(json!({ "password": "short12" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "WEAK_PASSWORD");
    }
}
