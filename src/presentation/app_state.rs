// Application state for HTTP handlers
use crate::application::telemetry_hub::TelemetryHub;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<TelemetryHub>,
}
