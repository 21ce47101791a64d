//! Main webserver implementation
//!
//! Wires the shared state into an axum router and runs it until ctrl-c. On
//! the way out supervision is stopped, which releases the sweep's hardware,
//! and every stream consumer is dropped.

use axum::{
    routing::{get, post},
    Router,
};
use shared::logging::{self, Component};
use shared::component_info;
use std::net::SocketAddr;
use supervisor::{HostProbe, ProcessControl};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{WebServerError, WebServerResult};
use crate::state::AppState;
use crate::web::handlers::{
    acquire_hardware, emergency_stop, force_release_hardware, hardware_status, health_check, release_hardware,
    start_sweep, stop_sweep, sweep_status, sweep_stream,
};

pub struct WebServer<P, H> {
    state: AppState<P, H>,
    bind_address: SocketAddr,
}

impl<P, H> WebServer<P, H>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    pub fn new(state: AppState<P, H>, bind_address: SocketAddr) -> Self {
        Self { state, bind_address }
    }

    /// Build the Axum router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            // Sweep control
            .route("/api/sweep/stream", get(sweep_stream::<P, H>))
            .route("/api/sweep/start", post(start_sweep::<P, H>))
            .route("/api/sweep/stop", post(stop_sweep::<P, H>))
            .route("/api/sweep/emergency-stop", post(emergency_stop::<P, H>))
            .route("/api/sweep/status", get(sweep_status::<P, H>))
            // Hardware arbitration
            .route("/api/hardware/status", get(hardware_status::<P, H>))
            .route("/api/hardware/acquire", post(acquire_hardware::<P, H>))
            .route("/api/hardware/release", post(release_hardware::<P, H>))
            .route("/api/hardware/force-release", post(force_release_hardware::<P, H>))
            // Health check
            .route("/health", get(health_check::<P, H>))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive())
                    .into_inner(),
            )
            .with_state(self.state.clone())
    }

    /// Serve until ctrl-c, then stop supervision and drop every consumer
    pub async fn run(&self) -> WebServerResult<()> {
        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| WebServerError::ServerStartup(format!("Failed to bind to {}: {}", self.bind_address, e)))?;

        self.state.broadcaster.start_sweeper();
        component_info!(Component::WebServer, "🌐 Listening on http://{}", self.bind_address);

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Err(e) = self.state.supervisor.stop().await {
            logging::log_error(Component::WebServer, "Stopping supervision", &e);
        }
        self.state.broadcaster.shutdown();

        served.map_err(|e| WebServerError::ServerStartup(format!("Server error: {}", e)))
    }

    pub fn state(&self) -> &AppState<P, H> {
        &self.state
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => logging::log_shutdown(Component::WebServer, "Received Ctrl+C signal"),
        Err(e) => {
            logging::log_error(Component::WebServer, "Signal handling", &e);
            // Without a signal handler the server runs until killed
            std::future::pending::<()>().await;
        }
    }
}
