//! Listener and HTTP routing
//!
//! Binds the TCP listener, starts the Hub actor and serves two routes: the
//! WebSocket upgrade path and the read-only snapshot path. Anything else is
//! answered with `404 Not Found` by the router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::ServerConfig;
use crate::document::{Document, SharedDocument};
use crate::error::AppError;
use crate::handler::ws_upgrade;
use crate::hub::{Hub, HubCommand};
use crate::snapshot::document_snapshot;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub cmd_tx: mpsc::Sender<HubCommand>,
    pub config: Arc<ServerConfig>,
    pub document: SharedDocument,
}

impl FromRef<AppState> for SharedDocument {
    fn from_ref(state: &AppState) -> Self {
        state.document.clone()
    }
}

/// A bound server with its Hub running
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    /// Validate the config, bind the listener and start the Hub
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_addr).await?;
        let document = Document::shared(config.initial_document.clone());

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        tokio::spawn(Hub::new(cmd_rx, document.clone()).run());

        Ok(Self {
            listener,
            state: AppState {
                cmd_tx,
                config: Arc::new(config),
                document,
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Read-only handle to the authoritative document
    pub fn document(&self) -> SharedDocument {
        self.state.document.clone()
    }

    /// Serve connections; only returns on error
    pub async fn run(self) -> Result<(), AppError> {
        info!(
            "Listening on {} (WebSocket {}, snapshot {})",
            self.local_addr()?,
            self.state.config.ws_path,
            self.state.config.snapshot_path
        );

        let app = router(self.state);
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}

/// Routes for the configured WebSocket and snapshot paths
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&state.config.ws_path, get(ws_upgrade))
        .route(&state.config.snapshot_path, get(document_snapshot))
        .with_state(state)
}
