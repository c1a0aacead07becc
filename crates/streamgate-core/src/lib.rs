//! Streamgate Core - shared types for the streaming gateway
//!
//! This crate provides:
//! - The request and canonical event model
//! - Error types
//! - Configuration types

pub mod config;
pub mod error;
pub mod llm;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use llm::{NormalizedEvent, Provider, RequestId, StreamRequest, Usage, DEFAULT_MODEL};
