use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use custody_ledger::Ledger;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Custody ledger HTTP server.
pub struct CustodyServer {
    config: ServerConfig,
    ledger: Arc<Ledger>,
}

impl CustodyServer {
    pub fn new(config: ServerConfig, ledger: Arc<Ledger>) -> Self {
        Self { config, ledger }
    }

    /// Open and initialize the file-backed ledger named by `config`.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        let ledger = Ledger::open(config.ledger.clone())?;
        ledger.initialize()?;
        Ok(Self::new(config, Arc::new(ledger)))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState {
            ledger: Arc::clone(&self.ledger),
            default_page_size: self.config.default_page_size,
            max_page_size: self.config.max_page_size,
        })
    }

    /// Serve on the configured address until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve on `listener` until `shutdown` resolves, then sync the ledger.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        tracing::info!(addr = %listener.local_addr()?, "custody server listening");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

        self.ledger.shutdown()?;
        tracing::info!("custody server stopped");
        Ok(())
    }
}
