//! Portal server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::auth::KeyProvider;
use crate::config::Config;
use crate::content::ContentClient;
use crate::directory::UserDirectory;
use crate::registry::RegistryClient;
use crate::{Error, Result};

/// Registrant portal server
pub struct Portal {
    /// Configuration
    config: Config,
}

impl Portal {
    /// Create a new portal
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the portal
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        // Signing key: fetch once at startup, then on the configured
        // interval. A failed initial fetch is not fatal; logins fail
        // closed until a refresh succeeds.
        let key_provider = Arc::new(KeyProvider::new(
            self.config.oidc.jwks_url(),
            self.config.oidc.timeout,
        )?);
        if key_provider.refresh().await.is_err() {
            warn!("Initial signing-key fetch failed, logins unavailable until refresh succeeds");
        }

        let refresh_provider = Arc::clone(&key_provider);
        let refresh_interval = self.config.oidc.jwks_refresh_interval;
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.tick().await; // the startup fetch already happened
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let _ = refresh_provider.refresh().await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        let oidc_http = reqwest::Client::builder()
            .timeout(self.config.oidc.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build OIDC client: {e}")))?;
        let registry = Arc::new(
            RegistryClient::new(&self.config.registry)
                .map_err(|e| Error::Internal(format!("Failed to build registry client: {e}")))?,
        );
        let content = Arc::new(
            ContentClient::new(&self.config.content)
                .map_err(|e| Error::Internal(format!("Failed to build content client: {e}")))?,
        );

        let directory = if self.config.directory.enabled {
            let directory =
                UserDirectory::new(&self.config.directory, &self.config.business_registry)?;
            info!("User directory enabled");
            Some(Arc::new(directory))
        } else {
            None
        };

        let state = Arc::new(AppState {
            config: self.config.clone(),
            key_provider,
            oidc_http,
            registry,
            content,
            directory,
        });

        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("REGISTRANT PORTAL v{}", env!("CARGO_PKG_VERSION"));
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(issuer = %self.config.oidc.issuer, "Identity provider");
        info!(registry = %self.config.registry.api_url, "Upstream registry");

        // Bound the connection drain: once the signal fires, open
        // connections get shutdown_timeout to finish before the server
        // is abandoned.
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let mut drain_rx = shutdown_tx.subscribe();
        let drain_deadline = async move {
            let _ = drain_rx.recv().await;
            tokio::time::sleep(shutdown_timeout).await;
        };

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

        tokio::select! {
            result = server => {
                result.map_err(|e| Error::Internal(e.to_string()))?;
            }
            () = drain_deadline => {
                warn!("Graceful shutdown timed out, dropping open connections");
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
