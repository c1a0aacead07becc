//! Provider stream adapters

pub mod anthropic;
pub mod blocking;
pub mod gemini;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAIAdapter;

use reqwest::{Response, StatusCode};
use streamgate_core::GatewayError;

/// Network failure, with the request URL stripped from the message.
pub(crate) fn connection_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Connection(e.without_url().to_string())
}

/// Turn a non-success upstream response into an API error.
pub(crate) async fn read_error_body(status: StatusCode, response: Response) -> GatewayError {
    let message = response.text().await.unwrap_or_default();
    GatewayError::Api {
        status: status.as_u16(),
        message,
    }
}
