//! Anthropic Claude streaming adapter.

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use streamgate_core::config::ProviderConfig;
use streamgate_core::{GatewayError, NormalizedEvent, RequestId, Usage};
use tracing::{debug, info};

use crate::provider::{EventStream, StreamAdapter, UsageExtractor};
use crate::providers::{connection_error, read_error_body};
use crate::providers::sse::SseDecoder;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output ceiling for Opus-family models.
const OPUS_MAX_TOKENS: u32 = 32_000;
/// Output ceiling for every other Claude model.
const DEFAULT_MAX_TOKENS: u32 = 64_000;

/// Anthropic adapter for Claude models.
pub struct AnthropicAdapter {
    client: Client,
    api_key: Option<String>,
    api_base: String,
}

impl AnthropicAdapter {
    /// Create a new Anthropic adapter. A missing key is reported when a
    /// stream is opened, not here.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: ANTHROPIC_API_BASE.to_string(),
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

    /// Generation cap for `model`.
    pub fn max_tokens_for(model: &str) -> u32 {
        if model.contains("opus") {
            OPUS_MAX_TOKENS
        } else {
            DEFAULT_MAX_TOKENS
        }
    }

    fn build_request(model: &str, prompt: &str) -> AnthropicRequest {
        AnthropicRequest {
            model: model.to_string(),
            max_tokens: Self::max_tokens_for(model),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockDelta {
        delta: ContentDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Error {
        error: AnthropicErrorDetail,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<StartUsage>,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

/// Usage accumulated from `message_start` and `message_delta`, as it stands
/// when `message_stop` arrives.
#[derive(Debug, Default)]
pub struct MessageSnapshot {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl MessageSnapshot {
    fn apply(&mut self, event: &AnthropicStreamEvent) {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = &message.usage {
                    self.input_tokens = Some(usage.input_tokens);
                    self.output_tokens = Some(usage.output_tokens);
                }
            }
            AnthropicStreamEvent::MessageDelta { usage: Some(usage) } => {
                if let Some(input) = usage.input_tokens {
                    self.input_tokens = Some(input);
                }
                // Anthropic reports output tokens directly, not as a running total
                self.output_tokens = Some(usage.output_tokens);
            }
            _ => {}
        }
    }
}

impl UsageExtractor for AnthropicAdapter {
    type Event = MessageSnapshot;

    fn extract_usage(snapshot: &MessageSnapshot) -> Option<Usage> {
        match (snapshot.input_tokens, snapshot.output_tokens) {
            (None, None) => None,
            (input, output) => Some(Usage::new(input.unwrap_or(0), output.unwrap_or(0))),
        }
    }
}

impl StreamAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn stream(&self, model: &str, prompt: &str, request_id: &RequestId) -> EventStream {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = format!("{}/v1/messages", self.api_base);
        let request = Self::build_request(model, prompt);
        let request_id = request_id.clone();

        Box::pin(async_stream::try_stream! {
            let api_key = api_key
                .ok_or_else(|| GatewayError::missing_credential("anthropic", "ANTHROPIC_API_KEY"))?;

            debug!(request_id = %request_id, model = %request.model, max_tokens = request.max_tokens, "Opening Anthropic stream");

            let response = client
                .post(&url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
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
            let mut snapshot = MessageSnapshot::default();
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
                    let event: AnthropicStreamEvent = serde_json::from_str(&data)
                        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
                    snapshot.apply(&event);

                    match event {
                        AnthropicStreamEvent::ContentBlockDelta {
                            delta: ContentDelta::TextDelta { text },
                        } => {
                            yield NormalizedEvent::Delta { text };
                        }
                        AnthropicStreamEvent::MessageStop => {
                            usage = Self::extract_usage(&snapshot);
                        }
                        AnthropicStreamEvent::Error { error } => {
                            Err::<(), _>(GatewayError::Provider(format!("{}: {}", error.kind, error.message)))?;
                        }
                        _ => {}
                    }
                }
            }

            info!(request_id = %request_id, provider = "anthropic", "Streaming completed");
            yield NormalizedEvent::Done { usage };
        })
    }
}
