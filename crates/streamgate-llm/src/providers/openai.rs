//! OpenAI streaming adapter.
//!
//! Requests and stream chunks use async-openai's typed models; the HTTP
//! call itself goes through reqwest so that an error status keeps its body
//! and dropping the stream closes the connection.

use async_openai::{
    error::ApiError as OpenAIApiError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionStreamOptions, CreateChatCompletionRequest,
        CreateChatCompletionStreamResponse,
    },
};
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use streamgate_core::config::ProviderConfig;
use streamgate_core::{GatewayError, NormalizedEvent, RequestId, Usage};
use tracing::{debug, info};

use crate::provider::{EventStream, StreamAdapter, UsageExtractor};
use crate::providers::sse::SseDecoder;
use crate::providers::{connection_error, read_error_body};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Sentinel payload closing an OpenAI event stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Sampling temperature for reasoning models, which reject any other value.
const REASONING_TEMPERATURE: f32 = 1.0;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// OpenAI adapter for GPT and o-series models.
pub struct OpenAIAdapter {
    client: Client,
    api_key: Option<String>,
    api_base: String,
}

impl OpenAIAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: OPENAI_API_BASE.to_string(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let adapter = Self::new(config.api_key.clone());
        match &config.api_base {
            Some(base) => adapter.with_base_url(base),
            None => adapter,
        }
    }

    /// Override the API root, including the version segment (e.g. `.../v1`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Temperature for `model`: fixed at 1 for reasoning models.
    pub fn temperature_for(model: &str) -> f32 {
        if model.starts_with("gpt-5") || model.starts_with('o') {
            REASONING_TEMPERATURE
        } else {
            DEFAULT_TEMPERATURE
        }
    }

    fn build_request(model: &str, prompt: &str) -> CreateChatCompletionRequest {
        CreateChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: prompt.to_string().into(),
                    ..Default::default()
                },
            )],
            temperature: Some(Self::temperature_for(model)),
            stream: Some(true),
            stream_options: Some(ChatCompletionStreamOptions {
                include_usage: true,
            }),
            ..Default::default()
        }
    }

    /// Text carried by a chunk's first choice, if any.
    fn delta_text(chunk: &CreateChatCompletionStreamResponse) -> Option<&str> {
        chunk
            .choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|text| !text.is_empty())
    }
}

impl UsageExtractor for OpenAIAdapter {
    type Event = CreateChatCompletionStreamResponse;

    /// OpenAI reports a running total, so output is `total - prompt`.
    fn extract_usage(chunk: &CreateChatCompletionStreamResponse) -> Option<Usage> {
        chunk.usage.as_ref().map(|usage| {
            Usage::from_cumulative(u64::from(usage.prompt_tokens), u64::from(usage.total_tokens))
        })
    }
}

/// `{"error": {...}}` object OpenAI sends in place of a chunk.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: OpenAIApiError,
}

/// Parse one `data:` payload. `None` marks the end-of-stream sentinel.
fn parse_payload(data: &str) -> Option<Result<CreateChatCompletionStreamResponse, GatewayError>> {
    if data.trim() == DONE_SENTINEL {
        return None;
    }
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        return Some(Err(GatewayError::Provider(envelope.error.to_string())));
    }
    Some(
        serde_json::from_str(data).map_err(|e| GatewayError::InvalidResponse(e.to_string())),
    )
}

impl StreamAdapter for OpenAIAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn stream(&self, model: &str, prompt: &str, request_id: &RequestId) -> EventStream {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = format!("{}/chat/completions", self.api_base);
        let request = Self::build_request(model, prompt);
        let request_id = request_id.clone();

        Box::pin(async_stream::try_stream! {
            let api_key = api_key
                .ok_or_else(|| GatewayError::missing_credential("openai", "OPENAI_API_KEY"))?;

            debug!(request_id = %request_id, model = %request.model, temperature = ?request.temperature, "Opening OpenAI stream");

            let response = client
                .post(&url)
                .bearer_auth(&api_key)
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

            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut usage = None;
            let mut ended = false;

            while !ended {
                let payloads = match body.next().await {
                    Some(chunk) => decoder.push(&chunk.map_err(connection_error)?),
                    None => {
                        ended = true;
                        decoder.finish().into_iter().collect()
                    }
                };

                for data in payloads {
                    let Some(parsed) = parse_payload(&data) else {
                        ended = true;
                        break;
                    };
                    let chunk = parsed?;

                    if let Some(text) = Self::delta_text(&chunk) {
                        yield NormalizedEvent::delta(text);
                    } else if let Some(reported) = Self::extract_usage(&chunk) {
                        usage = Some(reported);
                    }
                }
            }

            info!(request_id = %request_id, provider = "openai", "Streaming completed");
            yield NormalizedEvent::Done { usage };
        })
    }
}
