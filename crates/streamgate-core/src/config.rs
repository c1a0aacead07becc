//! Gateway configuration types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token accepted when `API_TOKEN` is not set.
pub const DEFAULT_API_TOKEN: &str = "default_token";

/// Main gateway configuration, loaded once at startup and shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Bearer token expected on the streaming route
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_api_token")]
    pub api_token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_token: default_api_token(),
        }
    }
}

impl AuthConfig {
    pub fn uses_default_token(&self) -> bool {
        self.api_token == DEFAULT_API_TOKEN
    }

    /// An explicitly blank token matches no request.
    pub fn rejects_all(&self) -> bool {
        self.api_token.trim().is_empty()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

fn default_api_token() -> String {
    DEFAULT_API_TOKEN.to_string()
}

/// Per-provider credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub google: ProviderConfig,
}

/// Provider configuration
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Endpoint override; the provider's public API when unset
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn new(api_key: Option<String>, api_base: Option<String>) -> Self {
        Self { api_key, api_base }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GatewayConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// Empty values count as unset, except `API_TOKEN`: a blank token is kept
    /// so that every authenticated request is refused rather than falling back
    /// to the default token.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = |key_var: &str, base_var: &str| ProviderConfig {
            api_key: var(key_var),
            api_base: var(base_var),
        };

        Self {
            server: ServerConfig {
                host: var("GATEWAY_HOST").unwrap_or_else(default_host),
                port: var("GATEWAY_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or_else(default_port),
            },
            auth: AuthConfig {
                api_token: lookup("API_TOKEN").unwrap_or_else(default_api_token),
            },
            providers: ProvidersConfig {
                anthropic: provider("ANTHROPIC_API_KEY", "ANTHROPIC_API_BASE"),
                openai: provider("OPENAI_API_KEY", "OPENAI_API_BASE"),
                google: provider("GOOGLE_API_KEY", "GOOGLE_API_BASE"),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
