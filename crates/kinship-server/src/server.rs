//! `ChatServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use kinship_store::ChatStore;

use crate::api;
use crate::auth::IdentityVerifier;
use crate::config::ServerConfig;
use crate::hub::{ChatHub, HubConfig};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Arc<ServerConfig>,
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .merge(api::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Permissive when no origins are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub struct ChatServer {
    config: Arc<ServerConfig>,
    hub: Arc<ChatHub>,
    verifier: Arc<dyn IdentityVerifier>,
    shutdown: ShutdownCoordinator,
}

impl ChatServer {
    pub fn new(config: ServerConfig, store: Arc<dyn ChatStore>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let hub = Arc::new(ChatHub::new(HubConfig::from(&config), store));
        Self {
            config: Arc::new(config),
            hub,
            verifier,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn router(&self) -> Router {
        build_router(AppState {
            hub: Arc::clone(&self.hub),
            verifier: Arc::clone(&self.verifier),
            config: Arc::clone(&self.config),
            shutdown: self.shutdown.token(),
        })
    }

    pub fn hub(&self) -> &Arc<ChatHub> {
        &self.hub
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Bind and start serving. Port 0 picks a free port; the bound address
    /// is on the returned handle.
    pub async fn listen(self) -> Result<ServerHandle, std::io::Error> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "kinship server started");

        let router = self.router();
        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server terminated");
            }
        });

        Ok(ServerHandle {
            addr: local_addr,
            hub: self.hub,
            shutdown: self.shutdown,
            server,
        })
    }
}

/// Handle returned by [`ChatServer::listen`]; keeps the serve task alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    hub: Arc<ChatHub>,
    shutdown: ShutdownCoordinator,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn hub(&self) -> &Arc<ChatHub> {
        &self.hub
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Stop accepting, close every socket and wait for the serve task.
    pub async fn shutdown(self) {
        self.shutdown.graceful_shutdown(vec![self.server], None).await;
        info!("kinship server stopped");
    }
}
