//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::dispatcher::Dispatcher;
use crate::drainer::QueueDrainer;
use crate::error::{DaemonError, DaemonResult};
use crate::execution::IntegratorClient;
use crate::storage::{InMemoryStore, PostgresStore, Records, RestStore, StoreClient};
use axum::Router;
use conductor_types::{ConfigEntry, ConfigKey};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Conductor daemon server
pub struct Server {
    config: DaemonConfig,
    dispatcher: Arc<Dispatcher>,
    drainer: Option<(Arc<QueueDrainer>, mpsc::Receiver<()>)>,
}

/// Open the configured store backend
pub async fn connect_store(config: &StorageConfig) -> DaemonResult<Arc<dyn StoreClient>> {
    let store: Arc<dyn StoreClient> = match config {
        StorageConfig::Memory => Arc::new(InMemoryStore::new()),
        StorageConfig::Rest {
            url,
            service_key,
            timeout_secs,
        } => Arc::new(RestStore::new(url, service_key, *timeout_secs)?),
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => Arc::new(PostgresStore::new(url, *max_connections, *connect_timeout_secs).await?),
    };

    tracing::info!(backend = store.backend(), "Store connected");
    Ok(store)
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let store = connect_store(&config.storage).await?;
        let records = Records::new(store);

        // Hosted stores are seeded externally; a fresh memory store needs its config row.
        if matches!(config.storage, StorageConfig::Memory) {
            records
                .seed_config(&ConfigEntry::new(
                    ConfigKey::MaxConcurrent,
                    config.dispatch.default_max_concurrent,
                ))
                .await?;
        }

        let api = Arc::new(IntegratorClient::new(
            &config.execution.api_url,
            config.execution.timeout_secs,
        )?);

        let dispatcher = Dispatcher::new(
            records.clone(),
            api,
            config.execution.defaults.clone(),
            config.dispatch.default_max_concurrent,
        );

        let (dispatcher, drainer) = if config.drainer.enabled {
            let (drainer, nudge_rx) = QueueDrainer::new(
                config.drainer.clone(),
                records,
                dispatcher.admission().clone(),
                dispatcher.orchestrator(),
            );
            (
                dispatcher.with_drainer(drainer.clone()),
                Some((drainer, nudge_rx)),
            )
        } else {
            tracing::warn!("Queue drainer disabled; queued workflows will not be promoted");
            (dispatcher, None)
        };

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            drainer,
        })
    }

    /// Router with all routes and middleware attached
    pub fn router(&self) -> Router {
        create_router(AppState::new(self.dispatcher.clone()), &self.config.server)
    }

    /// Run the server
    pub async fn run(mut self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = self.router();

        // Create listener
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Conductor daemon listening on {}", addr);
        tracing::info!(
            api_url = %self.config.execution.api_url,
            default_max_concurrent = self.config.dispatch.default_max_concurrent,
            "Execution settings"
        );

        // Start drainer in background
        let drainer = self.drainer.take().map(|(drainer, nudge_rx)| {
            let handle = tokio::spawn(drainer.clone().start(nudge_rx));
            (drainer, handle)
        });

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Conductor daemon shutting down");

        if let Some((drainer, handle)) = drainer {
            drainer.stop().await;
            drainer.nudge();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Queue drainer task ended abnormally");
            }
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
