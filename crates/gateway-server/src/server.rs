//! HTTP server lifecycle.

use crate::{routes::create_router, shutdown::shutdown_signal, state::AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Time allowed for in-flight requests after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Period of the rate limiter sweep
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(600),
        }
    }
}

impl ServerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Take listener and sweep settings from the gateway configuration
    pub fn from_gateway(config: &gateway_config::GatewayConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            shutdown_timeout: config.server.shutdown_timeout,
            sweep_interval: config.rate_limit.sweep_interval,
        }
    }

    /// Set the host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Server stopped with an I/O error
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    /// Server task panicked or was cancelled
    #[error("Server task failed: {0}")]
    Task(String),
}

/// HTTP server
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until Ctrl+C or SIGTERM, then drain in-flight requests for up to
    /// `shutdown_timeout`. The rate limiter sweep runs for the server's
    /// lifetime.
    ///
    /// # Errors
    /// Returns error if the listener cannot be bound or the server fails
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local: Option<SocketAddr> = listener.local_addr().ok();
        info!(address = ?local, "Gateway listening");

        let sweeper = self
            .state
            .limiter
            .as_ref()
            .map(|limiter| limiter.spawn_sweeper(self.config.sweep_interval));

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let app = create_router(self.state);
        let mut serving = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        let outcome = tokio::select! {
            joined = &mut serving => Some(joined),
            _ = shutdown_signal() => None,
        };

        let result = match outcome {
            Some(joined) => flatten(joined),
            None => {
                let _ = stop_tx.send(true);
                info!(
                    timeout_secs = self.config.shutdown_timeout.as_secs(),
                    "Draining in-flight requests"
                );
                match tokio::time::timeout(self.config.shutdown_timeout, &mut serving).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!("Shutdown timeout elapsed, aborting open connections");
                        serving.abort();
                        Ok(())
                    }
                }
            }
        };

        if let Some(sweeper) = sweeper {
            sweeper.shutdown();
        }
        info!("Gateway stopped");
        result
    }
}

fn flatten(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match joined {
        Ok(served) => served.map_err(ServerError::from),
        Err(e) => Err(ServerError::Task(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::GatewayConfig;

    #[test]
    fn test_config_from_gateway() {
        let mut gateway = GatewayConfig::default();
        gateway.server.port = 9090;

        let config = ServerConfig::from_gateway(&gateway);
        assert_eq!(config.port, 9090);
        assert_eq!(config.sweep_interval, gateway.rate_limit.sweep_interval);
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new().with_host("127.0.0.1").with_port(3000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
    }
}
