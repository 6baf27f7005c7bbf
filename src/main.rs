// Main entry point - Dependency injection and server setup
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dcu_telemetry::application::report_store::ReportStore;
use dcu_telemetry::application::telemetry_hub::TelemetryHub;
use dcu_telemetry::infrastructure::config::load_telemetry_config;
use dcu_telemetry::infrastructure::file_store::FileKeyValueStore;
use dcu_telemetry::infrastructure::websocket_transport::WebSocketTransport;
use dcu_telemetry::presentation::app_state::AppState;
use dcu_telemetry::presentation::handlers::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_telemetry_config()?;
    let addr = config.bind_address()?;

    // Report store (infrastructure layer)
    let backend = Arc::new(FileKeyValueStore::new(config.store.directory.clone()));
    let store = match ReportStore::open(backend.clone()).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(
                error = %e,
                directory = %config.store.directory.display(),
                "Could not load daily reports, starting empty"
            );
            ReportStore::empty(backend)
        }
    };

    // Telemetry hub (application layer)
    let transport = Arc::new(WebSocketTransport::new(config.transport.url.clone()));
    let hub = Arc::new(TelemetryHub::new(
        transport,
        Arc::new(store),
        config.hub_settings(),
        config.report_zone(),
    ));
    hub.start().await;

    // Build router (presentation layer)
    let state = Arc::new(AppState { hub: hub.clone() });
    let router = routes(state).layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!(%addr, controller = %config.transport.url, "Starting dcu-telemetry service");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    hub.stop().await;
    tracing::info!("Shut down");
    Ok(())
}
