//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use kickstorm_core::Config;

use crate::api_doc::ApiDoc;
use crate::handlers;
use crate::state::AppState;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    // Multipart bodies carry whole archives; allow the archive cap plus
    // form overhead.
    let body_limit = config.max_archive_bytes as usize + 1024 * 1024;

    let api = Router::new()
        .route(
            "/api/v0/projects/{project_id}/upload-zip",
            post(handlers::upload_zip::upload_zip),
        )
        .route(
            "/api/v0/projects/{project_id}/files",
            post(handlers::file_upload::upload_file),
        )
        .route(
            "/api/v0/projects/{project_id}/finalize-upload",
            post(handlers::finalize::finalize_upload),
        )
        .route(
            "/api/v0/projects/{project_id}/sessions/{session_id}",
            delete(handlers::sessions::delete_session),
        )
        .route(
            "/api/v0/projects/{project_id}/sync-status",
            get(handlers::sync_status::sync_status),
        )
        .route(
            "/api/v0/projects/{project_id}/files/tree",
            get(handlers::tree::file_tree),
        )
        .route(
            "/api/v0/projects/{project_id}/files/sign",
            post(handlers::sign::sign_file),
        )
        .route(
            "/api/v0/projects/{project_id}/files/{*path}",
            get(handlers::download::download_file),
        )
        .with_state(state);

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(api)
        .merge(
            utoipa_rapidoc::RapiDoc::new("/api/openapi.json")
                .path("/docs"),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any)
    } else {
        let origins: Result<Vec<HeaderValue>, _> = config
            .cors_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect();
        CorsLayer::new()
            .allow_origin(origins.map_err(|e| anyhow::anyhow!("invalid CORS origin: {}", e))?)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any)
    };
    Ok(cors)
}
