//! Gateway error types

use thiserror::Error;

/// Main gateway error type
///
/// `Validation` and `UnsupportedModel` are raised before a stream is opened
/// and become plain HTTP 400 responses. Everything else happens once the
/// client is already reading the event stream, so the dispatcher turns it
/// into a terminal `error` event instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl GatewayError {
    /// Whether the error must be reported before streaming begins.
    pub fn is_pre_stream(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnsupportedModel(_))
    }

    /// Missing upstream credential for `provider`.
    pub fn missing_credential(provider: &str, env_var: &str) -> Self {
        Self::Configuration(format!("no API key configured for {provider} (set {env_var})"))
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
