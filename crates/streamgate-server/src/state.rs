//! Application state

use std::sync::Arc;
use streamgate_core::GatewayConfig;
use streamgate_llm::{ProviderRegistry, Router};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub llm_router: Arc<Router>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let registry = ProviderRegistry::from_config(&config.providers);
        Self::with_registry(config, registry)
    }

    /// State with explicitly supplied adapters.
    pub fn with_registry(config: GatewayConfig, registry: ProviderRegistry) -> Self {
        Self {
            config: Arc::new(config),
            llm_router: Arc::new(Router::new(registry)),
        }
    }
}
