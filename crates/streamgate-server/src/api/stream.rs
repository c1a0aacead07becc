//! Streaming completion API

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use streamgate_core::{GatewayError, RequestId, StreamRequest, DEFAULT_MODEL};
use tracing::{info, warn};

use crate::state::AppState;

/// Body of `POST /stream`. Parsed leniently so validation can report a
/// missing prompt itself.
#[derive(Debug, Default, Deserialize)]
pub struct StreamBody {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl StreamBody {
    pub fn into_request(self) -> Result<StreamRequest, GatewayError> {
        let prompt = self
            .prompt
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GatewayError::Validation("No prompt provided".to_string()))?;
        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(StreamRequest::new(model, prompt))
    }
}

/// POST /stream
///
/// The body is decoded as JSON whatever the declared content type.
pub async fn stream_completion(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: StreamBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?;
    let request = body.into_request()?;

    let request_id = RequestId::generate();
    info!(request_id = %request_id, model = %request.model, "Stream requested");

    let events = state.llm_router.stream(&request, &request_id)?;
    let frames = events.map(|event| Ok::<_, Infallible>(Bytes::from(event.to_sse_frame())));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

/// Errors reported before any stream bytes are sent
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::BadRequest(message) = self;
        warn!(error = %message, "Rejected stream request");

        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}
