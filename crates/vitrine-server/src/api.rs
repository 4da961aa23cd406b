//! HTTP API over the current preview snapshot.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::sync::{watch, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::{PreviewMachine, Snapshot};
use crate::viewer::Viewer;

/// State shared by all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub machine: Arc<RwLock<PreviewMachine>>,
    pub snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    pub viewer: Arc<Viewer>,
}

impl ApiState {
    fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshots.borrow().clone()
    }
}

/// Build the preview router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/status", get(status_handler))
        .route("/api/stories", get(stories_handler))
        .route("/api/assets", get(assets_handler))
        .route("/api/files", get(files_handler))
        .route("/app/story/{*key}", get(story_page_handler))
        .fallback(asset_handler)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler(State(state): State<ApiState>) -> Response {
    let ready = state.machine.read().await.status().ready;
    let stories = state.snapshot().map(|s| s.stories.clone()).unwrap_or_default();

    match state.viewer.render_index(&stories, ready) {
        Ok(html) => Html(html).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn status_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let status = state.machine.read().await.status();
    Json(status)
}

async fn stories_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let stories = state.snapshot().map(|s| s.stories.clone()).unwrap_or_default();
    Json(stories)
}

async fn assets_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let assets = state.snapshot().map(|s| s.asset_map()).unwrap_or_default();
    Json(assets)
}

async fn files_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let files = state.snapshot().map(|s| s.files()).unwrap_or_default();
    Json(files)
}

async fn story_page_handler(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Response {
    let Some(snapshot) = state.snapshot() else {
        return not_ready();
    };

    let key = key.trim_start_matches('/');
    let (Some(story), Some(asset)) = (snapshot.stories.get(key), snapshot.assets.get(key)) else {
        return (StatusCode::NOT_FOUND, format!("Unknown story {}", key)).into_response();
    };

    match state.viewer.render_story(story, &asset.files) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render story {}: {}", key, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn asset_handler(State(state): State<ApiState>, uri: Uri) -> Response {
    asset_response(state.snapshot().as_deref(), uri.path())
}

/// Serve an emitted file from `snapshot`.
pub fn asset_response(snapshot: Option<&Snapshot>, path: &str) -> Response {
    let Some(snapshot) = snapshot else {
        return not_ready();
    };

    let name = path.trim_start_matches('/');
    match snapshot.assets.content(name) {
        Some(content) => (
            [(header::CONTENT_TYPE, content_type(name))],
            content.to_vec(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, format!("No asset {}", name)).into_response(),
    }
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Stories are still compiling",
    )
        .into_response()
}

/// Content type by file extension.
pub fn content_type(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("map") | Some("json") => "application/json",
        Some("html") => "text/html; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
