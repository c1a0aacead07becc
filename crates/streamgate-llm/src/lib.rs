//! Streamgate LLM - provider routing and stream normalization
//!
//! This crate provides:
//! - Model-name to provider resolution
//! - One streaming adapter per provider (Anthropic, OpenAI, Google)
//! - The router that drives an adapter and guarantees a single terminal event

pub mod provider;
pub mod providers;
pub mod router;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use provider::{EventStream, ProviderRegistry, StreamAdapter, UsageExtractor};
pub use providers::{AnthropicAdapter, GeminiAdapter, OpenAIAdapter};
pub use router::{normalize, resolve, NormalizedStream, Router};
