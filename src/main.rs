//! # AI Provider Gateway
//!
//! HTTP gateway that routes completion requests across AI providers with
//! automatic fallback, per-client rate limiting, and SSE streaming.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (Anthropic, OpenAI, Gemini keys from the environment)
//! ai-provider-gateway
//!
//! # Start with a config file
//! GATEWAY_CONFIG=/etc/gateway/config.yaml ai-provider-gateway
//!
//! # Start with environment overrides
//! GATEWAY_PORT=9000 ai-provider-gateway
//! ```

use gateway_config::{load_config, LogFormat};
use gateway_server::{AppState, Server, ServerConfig};
use gateway_telemetry::{init_logging, LoggingConfig};
use tracing::{error, info, warn};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be installed if configuration failed
        eprintln!("ai-provider-gateway: {e}");
        error!(error = %e, "Application failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config().await?;

    init_logging(
        &LoggingConfig::new()
            .with_level(config.logging.level.clone())
            .with_json(config.logging.format == LogFormat::Json),
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting AI provider gateway"
    );

    let server_config = ServerConfig::from_gateway(&config);
    let state = AppState::from_config(config)?;

    let configured = state.registry().configured_count();
    info!(
        providers = state.registry().len(),
        configured, "Provider registry initialized"
    );
    if configured == 0 {
        warn!("No provider has credentials; every completion will be exhausted");
    }

    Server::new(server_config, state).run().await?;
    Ok(())
}
