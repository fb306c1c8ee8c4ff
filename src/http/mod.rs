//! HTTP surface: the download endpoint and a health probe.

mod client;
mod handlers;
mod server;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::download::DownloadService;

pub use client::{resolve_client_id, ClientId, UNKNOWN_CLIENT};
pub use handlers::{download_handler, health_handler, DownloadRequest};
pub use server::HttpServer;

/// JSON envelope of every download API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            download_url: Some(download_url.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            download_url: None,
        }
    }
}

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DownloadService>,
    /// Take the client address from `X-Forwarded-For` when present
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(service: Arc<DownloadService>) -> Self {
        Self {
            service,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/download", post(download_handler))
        .route("/health", get(health_handler))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!(panic = detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::failure(
            "An unexpected error occurred. Please try again later.",
        )),
    )
        .into_response()
}
