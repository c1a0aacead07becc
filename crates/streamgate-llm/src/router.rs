//! Provider resolution and stream normalization

use futures::{Stream, StreamExt};
use std::pin::Pin;
use streamgate_core::{
    GatewayError, GatewayResult, NormalizedEvent, Provider, RequestId, StreamRequest,
};
use tracing::{error, info, warn};

use crate::provider::{EventStream, ProviderRegistry};

/// Normalized events ready for the transport. Always ends with exactly one
/// terminal event.
pub type NormalizedStream = Pin<Box<dyn Stream<Item = NormalizedEvent> + Send>>;

/// Map a model name to its provider by prefix.
///
/// Any model starting with `o` is treated as OpenAI.
pub fn resolve(model: &str) -> Provider {
    if model.starts_with("claude") {
        Provider::Anthropic
    } else if model.starts_with("gemini") {
        Provider::Google
    } else if model.starts_with("gpt") || model.starts_with('o') {
        Provider::OpenAI
    } else {
        Provider::Unknown
    }
}

/// Selects an adapter per request and drives it to a terminal event
pub struct Router {
    registry: ProviderRegistry,
}

impl Router {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Resolve the provider and open its normalized stream.
    ///
    /// Fails with `UnsupportedModel` before anything is streamed when the
    /// model does not map to a known provider.
    pub fn stream(
        &self,
        request: &StreamRequest,
        request_id: &RequestId,
    ) -> GatewayResult<NormalizedStream> {
        let provider = resolve(&request.model);
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| GatewayError::UnsupportedModel(request.model.clone()))?;

        info!(
            request_id = %request_id,
            provider = adapter.name(),
            model = %request.model,
            "Streaming from provider"
        );

        let upstream = adapter.stream(&request.model, &request.prompt, request_id);
        Ok(normalize(upstream, request_id.clone()))
    }
}

/// Forward adapter events in order and guarantee a single terminal event.
///
/// An adapter failure becomes one `Error` event. Anything after the first
/// terminal event is discarded and the adapter is dropped.
pub fn normalize(upstream: EventStream, request_id: RequestId) -> NormalizedStream {
    Box::pin(async_stream::stream! {
        let mut upstream = upstream;
        loop {
            match upstream.next().await {
                Some(Ok(event)) => {
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!(request_id = %request_id, error = %e, "Error during streaming");
                    yield NormalizedEvent::error(e.to_string());
                    break;
                }
                None => {
                    warn!(request_id = %request_id, "Upstream ended without a terminal event");
                    yield NormalizedEvent::error("stream ended without a terminal event");
                    break;
                }
            }
        }
    })
}
