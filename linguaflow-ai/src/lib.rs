//! linguaflow-ai library interface
//!
//! Anki deck import service: decodes uploaded `.apkg` archives into plain
//! flashcard records for the LinguaFlow front end.

pub mod api;
pub mod backend;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult, ImportError};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::services::AnkiImporter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Archive import pipeline
    pub importer: Arc<AnkiImporter>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last import failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
    /// Request body ceiling for uploads
    pub max_upload_bytes: usize,
    /// CORS origin allow-list
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(importer: Arc<AnkiImporter>, max_upload_bytes: usize, allowed_origins: Vec<String>) -> Self {
        Self {
            importer,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
            max_upload_bytes,
            allowed_origins,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .merge(api::health_routes())
        .merge(api::import_routes())
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true)
}
