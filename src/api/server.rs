use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, list_checks, list_services, ping_service, query_service, run_check,
    run_executor, run_exporter, run_multi, validate_service, AppState,
};
use crate::config::EyeConfig;
use crate::engine::Eye;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl From<&EyeConfig> for ServerConfig {
    fn from(config: &EyeConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Services
        .route("/services", get(list_services))
        .route("/services/:name/ping", get(ping_service))
        .route("/services/:name/validate", get(validate_service))
        .route("/services/:name/query", get(query_service))
        // Named items
        .route("/checks", get(list_checks))
        .route("/checks/:name", get(run_check))
        .route("/exporters/:name", post(run_exporter))
        .route("/executors/:name", post(run_executor))
        // Aggregates
        .route("/multi/:mode", get(run_multi))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the controller until CTRL+C, then close its services
pub async fn run_server(config: ServerConfig, eye: Arc<Eye>) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState {
        eye: Arc::clone(&eye),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(eye = %eye.name(), "Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    eye.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received, closing services...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    const CONFIG: &str = r#"{
        "name": "api-test",
        "services": [
            {"name": "users", "kind": "memory", "datasets": {
                "all": [{"id": 1, "name": "ann"}, {"id": 2, "name": "bob"}],
                "hosts": [
                    {"host": "a", "procs": [{"pid": 1, "state": "up"}, {"pid": 2, "state": "up"}]},
                    {"host": "b", "procs": [{"pid": 1, "state": "up"}]}
                ]
            }},
            {"name": "replica", "kind": "memory", "datasets": {"all": [{"id": 1, "name": "ann"}]}}
        ],
        "validate": [{"name": "has-bob", "services": ["users"], "request": {"query": "all", "evalExpr": "name = 'bob'"}}],
        "fields_exporter": [{"name": "names", "services": ["users"], "query": "all", "fields": ["name"]}]
    }"#;

    async fn create_test_app(export_folder: &std::path::Path) -> Router {
        let mut config = EyeConfig::from_json(CONFIG).unwrap();
        config.export_folder = export_folder.to_path_buf();
        let eye = Arc::new(Eye::new(config).await);
        build_router(Arc::new(AppState { eye }))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(create_test_app(dir.path()).await, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "api-test");
    }

    #[tokio::test]
    async fn test_list_services_and_checks() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path()).await;

        let (status, body) = get(app.clone(), "/services").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["services"], serde_json::json!(["replica", "users"]));

        let (status, body) = get(app, "/checks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"], serde_json::json!(["has-bob"]));
        assert_eq!(body["exporters"], serde_json::json!(["names"]));
    }

    #[tokio::test]
    async fn test_validate_pass_and_fail() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path()).await;

        let (status, body) = get(
            app.clone(),
            "/services/users/validate?query=all&eval_expr=id%20%3E%200&all=true",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "pass");
        assert_eq!(body["records"], 2);

        let (status, body) = get(
            app,
            "/services/users/validate?query=all&eval_expr=id%20%3E%201&all=true",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body["outcome"], "fail");
    }

    #[tokio::test]
    async fn test_ping_and_named_check() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path()).await;

        let (status, _) = get(app.clone(), "/services/users/ping").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get(app.clone(), "/checks/has-bob").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(app, "/checks/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _) = get(create_test_app(dir.path()).await, "/services/ghost/ping").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_explode_and_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path()).await;

        let (status, body) = get(app.clone(), "/services/users/query?query=all").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"], 2);
        assert_eq!(body["rows"][1]["name"], "bob");

        let (status, body) = get(app.clone(), "/services/users/query?query=hosts&explode=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"], 2);
        assert_eq!(body["rows"].as_array().unwrap().len(), 3);
        assert_eq!(body["columns"], serde_json::json!(["host", "pid", "state"]));

        let (status, body) = get(
            app.clone(),
            "/services/users/query?query=hosts&changed_key=pid&changed_value=state",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);

        let (status, _) = get(app, "/services/users/query").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_multi_modes() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path()).await;

        let (status, body) = get(
            app.clone(),
            "/multi/any?services=users,replica&query=all&eval_expr=id%20%3D%202",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["children"].as_array().unwrap().len(), 2);

        let (status, _) = get(
            app.clone(),
            "/multi/all?services=users,replica&query=all&eval_expr=id%20%3D%202",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);

        let (status, _) = get(app.clone(), "/multi/ping_all?services=users,replica").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get(app.clone(), "/multi/sometimes?services=users").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(app, "/multi/all?services=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_exporter_and_executor() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path()).await;

        let (status, body) = post(
            app.clone(),
            "/exporters/names",
            serde_json::json!({"file": "names.txt"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exporter"], "names");
        let written = std::fs::read_to_string(dir.path().join("names.txt")).unwrap();
        assert_eq!(written, "ann\nbob\n");

        let (status, _) = post(app, "/executors/restart", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
