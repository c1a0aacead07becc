//! Google Gemini streaming adapter.
//!
//! Fragments are pulled by a blocking line iterator on tokio's blocking pool
//! and handed to the async side through [`spawn_blocking_stream`]. The HTTP
//! body itself is read by an async pump, so dropping the stream closes the
//! upstream connection even while the iterator is parked.

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use streamgate_core::config::ProviderConfig;
use streamgate_core::{GatewayError, GatewayResult, NormalizedEvent, RequestId, Usage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::provider::{EventStream, StreamAdapter, UsageExtractor};
use crate::providers::blocking::{pump_to_reader, spawn_blocking_stream, BlockingSink};
use crate::providers::sse::data_line;
use crate::providers::{connection_error, read_error_body};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Fragments buffered between the blocking reader and the consumer.
const BRIDGE_CAPACITY: usize = 16;

/// Google Gemini adapter.
pub struct GeminiAdapter {
    client: Client,
    api_key: Option<String>,
    api_base: String,
}

impl GeminiAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let adapter = Self::new(config.api_key.clone());
        match &config.api_base {
            Some(base) => adapter.with_base_url(base),
            None => adapter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Streaming endpoint for the model. The key travels in a header so it
    /// never shows up in URLs or error messages.
    fn api_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api_base, model
        )
    }

    fn build_request(prompt: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

/// One streamed `GenerateContentResponse` fragment.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    status: Option<String>,
    message: String,
}

impl GeminiChunk {
    /// Text of the first part of the first candidate.
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
            .filter(|text| !text.is_empty())
    }
}

impl UsageExtractor for GeminiAdapter {
    type Event = GeminiChunk;

    /// Gemini's total includes the prompt (and any thinking tokens), so
    /// output is `total - prompt`.
    fn extract_usage(chunk: &GeminiChunk) -> Option<Usage> {
        chunk
            .usage_metadata
            .as_ref()
            .map(|meta| Usage::from_cumulative(meta.prompt_token_count, meta.total_token_count))
    }
}

/// Blocking side: parse each `data:` line of the body into a fragment.
fn pull_fragments<R: Read>(body: R, sink: BlockingSink<GatewayResult<GeminiChunk>>) {
    for line in BufReader::new(body).lines() {
        if sink.is_cancelled() {
            debug!("Gemini consumer went away, stopping fragment reader");
            return;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                sink.send(Err(GatewayError::Connection(e.to_string())));
                return;
            }
        };

        let Some(data) = data_line(line.trim_end()) else {
            continue;
        };

        let item = serde_json::from_str::<GeminiChunk>(data)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        let failed = item.is_err();
        if !sink.send(item) || failed {
            return;
        }
    }
}

impl StreamAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "google"
    }

    fn stream(&self, model: &str, prompt: &str, request_id: &RequestId) -> EventStream {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = self.api_url(model);
        let request = Self::build_request(prompt);
        let request_id = request_id.clone();

        Box::pin(async_stream::try_stream! {
            let api_key = api_key
                .ok_or_else(|| GatewayError::missing_credential("google", "GOOGLE_API_KEY"))?;

            debug!(request_id = %request_id, "Opening Gemini stream");

            let response = client
                .post(&url)
                .header("x-goog-api-key", &api_key)
                .json(&request)
                .send()
                .await
                .map_err(connection_error)?;

            let status = response.status();
            let response = if status.is_success() {
                response
            } else {
                Err(read_error_body(status, response).await)?
            };

            // Fired when `fragments` is dropped; stops the body pump.
            let cancel = CancellationToken::new();
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| e.without_url().to_string()));
            let reader = pump_to_reader(body, BRIDGE_CAPACITY, cancel.clone());
            let mut fragments = spawn_blocking_stream(BRIDGE_CAPACITY, cancel, move |sink| {
                pull_fragments(reader, sink)
            });

            let mut usage = None;
            while let Some(fragment) = fragments.next().await {
                let chunk = fragment?;

                if let Some(error) = &chunk.error {
                    let status = error.status.as_deref().unwrap_or("UNKNOWN");
                    Err::<(), _>(GatewayError::Provider(format!("{}: {}", status, error.message)))?;
                }
                if let Some(reported) = Self::extract_usage(&chunk) {
                    usage = Some(reported);
                }
                if let Some(text) = chunk.text() {
                    yield NormalizedEvent::delta(text);
                }
            }

            info!(request_id = %request_id, provider = "google", "Streaming completed");
            yield NormalizedEvent::Done { usage };
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: &str) -> GeminiChunk {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_api_url_keeps_key_out() {
        let adapter = GeminiAdapter::new(Some("secret-key".to_string()))
            .with_base_url("http://localhost:9999/");
        let url = adapter.api_url("gemini-2.5-flash");
        assert_eq!(
            url,
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert!(!url.contains("secret-key"));
    }

    #[test]
    fn test_request_shape() {
        let json = serde_json::to_value(GeminiAdapter::build_request("Hello")).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Hello");
    }

    #[test]
    fn test_fragment_text_and_usage() {
        let fragment = chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}],"role":"model"},"index":0}],
                "usageMetadata":{"promptTokenCount":100,"candidatesTokenCount":60,"totalTokenCount":180},
                "modelVersion":"gemini-2.5-flash"}"#,
        );

        assert_eq!(fragment.text(), Some("Hi"));
        assert_eq!(GeminiAdapter::extract_usage(&fragment), Some(Usage::new(100, 80)));
    }

    #[test]
    fn test_fragment_without_text() {
        let fragment = chunk(r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#);
        assert_eq!(fragment.text(), None);
        assert_eq!(GeminiAdapter::extract_usage(&fragment), None);

        let fragment = chunk(r#"{"candidates":[{"finishReason":"STOP"}]}"#);
        assert_eq!(fragment.text(), None);

        let fragment = chunk(r#"{"usageMetadata":{"promptTokenCount":7}}"#);
        assert_eq!(fragment.text(), None);
        assert_eq!(GeminiAdapter::extract_usage(&fragment), Some(Usage::new(7, 0)));
    }

    #[test]
    fn test_error_payload() {
        let fragment = chunk(
            r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        let error = fragment.error.expect("error payload");
        assert_eq!(error.status.as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert_eq!(error.message, "Resource exhausted");
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let adapter = GeminiAdapter::new(None);
        let mut stream = adapter.stream("gemini-2.5-flash", "hi", &RequestId::from("t"));

        assert!(matches!(
            stream.next().await,
            Some(Err(GatewayError::Configuration(_)))
        ));
        assert!(stream.next().await.is_none());
    }
}
