use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use rust_embed::RustEmbed;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::{
    handlers::{ApiResponse, ContactHandler},
    models::HealthResponse,
    router::{self, RouteTable},
    store::{ContactStore, PhoneStore},
};

#[derive(RustEmbed)]
#[folder = "src/static/"]
pub struct Asset;

#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub handler: Arc<ContactHandler>,
}

impl AppState {
    /// Builds the route table once and binds the handler to `store`.
    pub fn new<S>(store: Arc<S>) -> Result<Self, regex::Error>
    where
        S: ContactStore + PhoneStore + 'static,
    {
        let contacts: Arc<dyn ContactStore> = store.clone();
        let phones: Arc<dyn PhoneStore> = store;
        Ok(Self {
            routes: Arc::new(router::api_routes()?),
            handler: Arc::new(ContactHandler::new(contacts, phones)),
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    // CORS: allow all
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(serve_index))
        .route("/static/*path", get(serve_static))
        .route("/health", get(health))
        .route("/api", any(dispatch_api))
        .route("/api/*rest", any(dispatch_api))
        .layer(cors)
        .with_state(state)
}

// ────────────────────────────────────────────────────────────────────────────
// Request logging (nginx-style)
// ────────────────────────────────────────────────────────────────────────────

fn log_request(method: &Method, uri: &Uri, headers: &HeaderMap, status: StatusCode) {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let referer = headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info!(
        "{} {} {} {} \"{}\" \"{}\"",
        method.as_str(),
        uri.path(),
        uri.query().unwrap_or(""),
        status.as_u16(),
        user_agent,
        referer
    );
}

// ────────────────────────────────────────────────────────────────────────────
// API entrypoint
// ────────────────────────────────────────────────────────────────────────────

/// Resolves the request against the route table and runs the matched
/// endpoint on the blocking pool.
pub async fn dispatch_api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> impl IntoResponse {
    let response = match state.routes.dispatch(&method, uri.path()) {
        Some(matched) => {
            let handler = state.handler.clone();
            let result =
                tokio::task::spawn_blocking(move || handler.handle(&matched, &query, &body)).await;
            match result {
                Ok(response) => response,
                Err(e) => {
                    error!("request task failed: {}", e);
                    ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Server Error")
                }
            }
        }
        None => ApiResponse::not_found("Not Found"),
    };

    log_request(&method, &uri, &headers, response.status());
    response
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let handler = state.handler.clone();
    let db_ok = tokio::task::spawn_blocking(move || handler.store_healthy())
        .await
        .unwrap_or(false);

    let resp = HealthResponse {
        status: "ok".to_string(),
        db: if db_ok { "ok".to_string() } else { "error".to_string() },
    };
    (StatusCode::OK, Json(json!(resp)))
}

// ────────────────────────────────────────────────────────────────────────────
// Embedded UI
// ────────────────────────────────────────────────────────────────────────────

fn embedded(path: &str) -> axum::response::Response {
    match Asset::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();
            let body = content.data.into_owned();
            ([(header::CONTENT_TYPE, mime)], body).into_response()
        }
        None => (StatusCode::NOT_FOUND, "file not found").into_response(),
    }
}

pub async fn serve_index() -> impl IntoResponse {
    embedded("index.html")
}

pub async fn serve_static(Path(path): Path<String>) -> impl IntoResponse {
    // Prevent path traversal
    if path.contains("..") {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    }
    embedded(&path)
}
