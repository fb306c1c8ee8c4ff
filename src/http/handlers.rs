//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use super::client::ClientId;
use super::{ApiResponse, AppState};
use crate::error::{ReportGateError, Result};

const SUCCESS_MESSAGE: &str = "Thank you! Your report is ready to download.";

/// Body of a download request.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub email: String,
}

/// `POST /api/download`
///
/// A body that is not JSON or lacks `email` is reported like a malformed
/// address.
pub async fn download_handler(
    State(state): State<AppState>,
    ClientId(client_id): ClientId,
    headers: HeaderMap,
    payload: std::result::Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(client_id = %client_id, error = %rejection.body_text(), "Rejected request body");
            return Err(ReportGateError::Validation(rejection.body_text()));
        }
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let grant = state
        .service
        .request_download(&request.email, &client_id, user_agent)
        .await?;

    Ok(Json(ApiResponse::success(SUCCESS_MESSAGE, grant.download_url)))
}

/// `GET /health`
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
