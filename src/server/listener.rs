//! Coordinator TCP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::info;

use crate::auth::MessageAuthenticator;
use crate::config::Settings;
use crate::error::HeartbeatError;
use crate::session::{SessionObserver, SessionRegistry};

use super::{create_router, BeatHandler, BeatMetrics};

/// Bound coordinator, ready to serve beats.
pub struct CoordinatorServer {
    listener: TcpListener,
    router: Router,
    handler: Arc<BeatHandler>,
    local_addr: SocketAddr,
}

impl CoordinatorServer {
    /// Load the shared secret, build the registry, and bind the listener.
    pub async fn bind(
        settings: &Settings,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, HeartbeatError> {
        let secret = MessageAuthenticator::load_secret(&settings.security.hmac_secret_path)?;
        let registry = SessionRegistry::new(settings.security.session_timeout(), observer);
        let handler = Arc::new(BeatHandler::new(
            MessageAuthenticator::new(&secret),
            registry,
            Arc::new(BeatMetrics::new()),
        ));
        let router = create_router(Arc::clone(&handler), &settings.coordinator.path);

        let listener = TcpListener::bind(settings.coordinator.listen_addr)
            .await
            .map_err(|e| HeartbeatError::Server {
                message: format!(
                    "Failed to bind to {}: {}",
                    settings.coordinator.listen_addr, e
                ),
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            path = %settings.coordinator.path,
            session_timeout_secs = settings.security.session_timeout_seconds,
            "Coordinator listener bound"
        );

        Ok(Self {
            listener,
            router,
            handler,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> SessionRegistry {
        self.handler.registry().clone()
    }

    pub fn metrics(&self) -> Arc<BeatMetrics> {
        Arc::clone(self.handler.metrics())
    }

    /// Serve until `shutdown` is notified. In-flight requests are allowed to
    /// finish; live sessions are dropped with the runtime.
    pub async fn run(self, shutdown: Arc<Notify>) -> Result<(), HeartbeatError> {
        info!(addr = %self.local_addr, "Coordinator running, waiting for beats...");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.notified().await;
                info!("Shutdown signal received, stopping listener");
            })
            .await
            .map_err(|e| HeartbeatError::Server {
                message: format!("Listener failed: {}", e),
            })
    }
}
