//! Streamgate - unified LLM streaming gateway
//!
//! Accepts a model name and prompt, routes to Anthropic, OpenAI or Google
//! and relays the answer as a uniform SSE event stream.

use anyhow::Result;
use std::net::SocketAddr;
use streamgate_core::GatewayConfig;
use streamgate_server::{create_router, AppState};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Streamgate v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_env();
    if config.auth.uses_default_token() {
        warn!("API_TOKEN is not set; accepting the default token");
    } else if config.auth.rejects_all() {
        warn!("API_TOKEN is blank; every /stream request will be rejected");
    }
    for (provider, configured) in [
        ("anthropic", config.providers.anthropic.api_key.is_some()),
        ("openai", config.providers.openai.api_key.is_some()),
        ("google", config.providers.google.api_key.is_some()),
    ] {
        if !configured {
            warn!(provider, "No API key configured; requests for this provider will fail");
        }
    }

    let addr: SocketAddr = config.bind_address().parse()?;
    let state = AppState::new(config);

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
