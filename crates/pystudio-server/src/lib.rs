//! HTTP interface for the pystudio learning studio
//!
//! Exposes the session state facade to a browser UI: the editor pushes code
//! and the current section's tests, triggers runs and grading, and polls the
//! session snapshot to render output, outcomes and the running flags.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Json as AxumJson, State};
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use pystudio_core::{Studio, TestAssertion};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    pub enable_logging: bool,
    /// Boot the interpreter in the background as soon as the server starts
    pub warm_up_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            enable_cors: true,
            cors_origins: None,
            max_body_size: 1024 * 1024,
            enable_logging: true,
            warm_up_on_start: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address: {}", e)))?;
        Ok(self)
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn with_warm_up(mut self, enable: bool) -> Self {
        self.warm_up_on_start = enable;
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
    pub config: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct CodeUpdate {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TestsUpdate {
    pub tests: Vec<TestAssertion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "mockInputs")]
    pub inputs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBody {
    #[serde(default)]
    pub code: Option<String>,
    /// Replaces the held tests before grading when present
    #[serde(default)]
    pub tests: Option<Vec<TestAssertion>>,
    #[serde(default, alias = "mockInputs")]
    pub inputs: Vec<String>,
}

fn body<T>(payload: std::result::Result<AxumJson<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|AxumJson(value)| value)
        .map_err(|rejection| ServerError::invalid_request(rejection.body_text()))
}

fn validate_tests(tests: &[TestAssertion]) -> Result<()> {
    if let Some(index) = tests.iter().position(|t| t.name.trim().is_empty()) {
        return Err(ServerError::invalid_request(format!(
            "Test at position {} has an empty name",
            index
        )));
    }
    Ok(())
}

async fn runtime_handler(State(app_state): State<AppState>) -> Json<Value> {
    let status = app_state.studio.engine().status();
    let config = &app_state.config;
    Json(json!({
        "status": "success",
        "runtime": status,
        "server": {
            "maxBodySize": config.max_body_size,
            "warmUpOnStart": config.warm_up_on_start,
            "cors": config.enable_cors
        },
        "timestamp": chrono::Utc::now()
    }))
}

async fn warmup_handler(State(app_state): State<AppState>) -> Result<Json<Value>> {
    log::info!("Received runtime warm-up request");
    let version = app_state.studio.engine().warm_up().await?;
    Ok(Json(json!({
        "status": "ready",
        "version": version,
        "timestamp": chrono::Utc::now()
    })))
}

async fn session_handler(State(app_state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "session": app_state.studio.snapshot(),
        "timestamp": chrono::Utc::now()
    }))
}

async fn set_code_handler(
    State(app_state): State<AppState>,
    payload: std::result::Result<AxumJson<CodeUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let update = body(payload)?;
    log::debug!("Updating held code ({} bytes)", update.code.len());
    app_state.studio.set_code(update.code);
    Ok(Json(json!({
        "status": "success",
        "message": "Code updated",
        "timestamp": chrono::Utc::now()
    })))
}

async fn set_tests_handler(
    State(app_state): State<AppState>,
    payload: std::result::Result<AxumJson<TestsUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let update = body(payload)?;
    validate_tests(&update.tests)?;
    let count = update.tests.len();
    app_state.studio.set_tests(update.tests);
    Ok(Json(json!({
        "status": "success",
        "message": "Tests updated",
        "count": count,
        "timestamp": chrono::Utc::now()
    })))
}

async fn run_handler(
    State(app_state): State<AppState>,
    payload: std::result::Result<AxumJson<RunBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let request = body(payload)?;
    log::info!("Received run request with {} input(s)", request.inputs.len());

    let result = app_state.studio.run(request.code, request.inputs).await?;
    Ok(Json(json!({
        "status": "success",
        "result": result,
        "timestamp": chrono::Utc::now()
    })))
}

async fn test_handler(
    State(app_state): State<AppState>,
    payload: std::result::Result<AxumJson<TestBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let request = body(payload)?;
    if let Some(tests) = request.tests {
        validate_tests(&tests)?;
        app_state.studio.set_tests(tests);
    }

    let outcomes = app_state.studio.test(request.code, request.inputs).await?;
    let passed = outcomes.iter().filter(|o| o.passed).count();
    log::info!("Test request finished: {}/{} passed", passed, outcomes.len());
    Ok(Json(json!({
        "status": "success",
        "outcomes": outcomes,
        "passed": passed,
        "total": outcomes.len(),
        "timestamp": chrono::Utc::now()
    })))
}

pub struct StudioServer {
    studio: Arc<Studio>,
    config: ServerConfig,
}

impl StudioServer {
    pub fn new(studio: Arc<Studio>) -> Self {
        Self {
            studio,
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(studio: Arc<Studio>, config: ServerConfig) -> Self {
        Self { studio, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            studio: self.studio.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "healthy".to_string(),
                        timestamp: chrono::Utc::now(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    })
                }),
            )
            .route("/runtime", get(runtime_handler))
            .route("/runtime/warmup", post(warmup_handler))
            .route("/session", get(session_handler))
            .route("/session/code", put(set_code_handler))
            .route("/session/tests", put(set_tests_handler))
            .route("/run", post(run_handler))
            .route("/test", post(test_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // UIs poll these while an operation runs
                    let polling = method == axum::http::Method::GET
                        && matches!(uri.path(), "/session" | "/runtime");
                    if polling {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    if polling {
                        log::debug!("Response {} completed in {:?}", request_id, duration);
                    } else {
                        log::info!(
                            "Response {} {} completed in {:?}",
                            request_id,
                            response.status(),
                            duration
                        );
                    }
                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: std::result::Result<Vec<_>, _> =
                    origins.iter().map(|s| s.parse()).collect();
                match origins {
                    Ok(origins) => CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods(Any)
                        .allow_headers(Any),
                    Err(_) => {
                        log::warn!("Invalid CORS origin configured; allowing any origin");
                        CorsLayer::permissive()
                    }
                }
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    fn spawn_warm_up(&self) {
        if !self.config.warm_up_on_start {
            return;
        }
        let studio = self.studio.clone();
        tokio::spawn(async move {
            match studio.engine().warm_up().await {
                Ok(version) => log::info!("Python {} ready", version),
                Err(e) => log::error!("Interpreter warm-up failed: {}", e),
            }
        });
    }

    async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            ServerError::config_error(format!(
                "Failed to bind to {}: {}",
                self.config.bind_addr, e
            ))
        })
    }

    /// Start the server and listen for connections.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown support.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = self.bind().await?;

        log::info!("pystudio server starting on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Session: http://{}/session", self.config.bind_addr);
        self.spawn_warm_up();

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("pystudio server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
