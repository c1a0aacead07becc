//! LLM streaming types - the request, provider tag and canonical event model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// A validated streaming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub model: String,
    pub prompt: String,
}

impl StreamRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

/// Opaque per-request token used to correlate log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// 8 random bytes, hex encoded.
    pub fn generate() -> Self {
        Self(format!("{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Upstream provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    OpenAI,
    Google,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
            Provider::Google => "google",
            Provider::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage for a completed generation.
///
/// `output` only counts newly generated tokens, whatever convention the
/// provider uses to report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
}

impl Usage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Build usage from a prompt count and a running total that includes it.
    pub fn from_cumulative(prompt: u64, total: u64) -> Self {
        Self {
            input: prompt,
            output: total.saturating_sub(prompt),
        }
    }
}

/// Canonical stream event. Serializes to the wire JSON sent to clients:
/// `{"type":"delta","text":..}`, `{"type":"done","usage":..}`,
/// `{"type":"error","error":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NormalizedEvent {
    Delta {
        text: String,
    },
    Done {
        usage: Option<Usage>,
    },
    Error {
        #[serde(rename = "error")]
        message: String,
    },
}

impl NormalizedEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta { text: text.into() }
    }

    pub fn done(usage: Option<Usage>) -> Self {
        Self::Done { usage }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// `Done` and `Error` end a stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta { .. })
    }

    /// Render as one server-sent-events frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","error":"internal error"}"#.to_string());
        format!("data: {json}\n\n")
    }
}
