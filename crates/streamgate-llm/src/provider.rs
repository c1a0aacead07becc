//! Streaming adapter abstraction

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use streamgate_core::config::ProvidersConfig;
use streamgate_core::{GatewayResult, NormalizedEvent, Provider, RequestId, Usage};

use crate::providers::{AnthropicAdapter, GeminiAdapter, OpenAIAdapter};

/// Lazy, finite sequence of normalized events produced by one adapter call.
///
/// Dropping it tears down the upstream connection.
pub type EventStream = Pin<Box<dyn Stream<Item = GatewayResult<NormalizedEvent>> + Send>>;

/// One upstream provider's streaming API, normalized.
pub trait StreamAdapter: Send + Sync {
    /// Provider name used in logs (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Open one streaming completion.
    ///
    /// Nothing is sent upstream until the returned stream is first polled.
    /// The stream yields zero or more `Delta` events followed by exactly one
    /// `Done`, or ends early with an `Err`.
    fn stream(&self, model: &str, prompt: &str, request_id: &RequestId) -> EventStream;
}

/// Per-provider token accounting over a native stream event.
pub trait UsageExtractor {
    type Event;

    fn extract_usage(event: &Self::Event) -> Option<Usage>;
}

/// One adapter per known provider.
#[derive(Clone)]
pub struct ProviderRegistry {
    anthropic: Arc<dyn StreamAdapter>,
    openai: Arc<dyn StreamAdapter>,
    google: Arc<dyn StreamAdapter>,
}

impl ProviderRegistry {
    pub fn new(
        anthropic: Arc<dyn StreamAdapter>,
        openai: Arc<dyn StreamAdapter>,
        google: Arc<dyn StreamAdapter>,
    ) -> Self {
        Self {
            anthropic,
            openai,
            google,
        }
    }

    /// Build the real HTTP adapters from configured credentials.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self::new(
            Arc::new(AnthropicAdapter::from_config(&config.anthropic)),
            Arc::new(OpenAIAdapter::from_config(&config.openai)),
            Arc::new(GeminiAdapter::from_config(&config.google)),
        )
    }

    /// Adapter for `provider`; `None` only for `Provider::Unknown`.
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn StreamAdapter>> {
        match provider {
            Provider::Anthropic => Some(self.anthropic.clone()),
            Provider::OpenAI => Some(self.openai.clone()),
            Provider::Google => Some(self.google.clone()),
            Provider::Unknown => None,
        }
    }
}
