// HTTP request handlers
use crate::application::connection_manager::ConnectionState;
use crate::application::report_store::ReportMap;
use crate::application::telemetry_hub::HubError;
use crate::domain::alert::Alert;
use crate::domain::report::DailyReport;
use crate::domain::telemetry::TelemetrySample;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub is_connected: bool,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/telemetry/current", get(current_sample))
        .route("/telemetry/history", get(history))
        .route("/telemetry/alerts", get(alerts))
        .route("/telemetry/connection", get(connection_status))
        .route("/reports", get(list_reports))
        .route("/reports/aggregate", post(aggregate_now))
        .route("/reports/:date", get(get_report))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn current_sample(State(state): State<Arc<AppState>>) -> Json<TelemetrySample> {
    Json(state.hub.current_sample())
}

/// Recent samples, oldest first
pub async fn history(State(state): State<Arc<AppState>>) -> Json<Vec<TelemetrySample>> {
    Json(state.hub.history())
}

pub async fn alerts(State(state): State<Arc<AppState>>) -> Json<Vec<Alert>> {
    Json(state.hub.alerts())
}

pub async fn connection_status(State(state): State<Arc<AppState>>) -> Json<ConnectionStatus> {
    let connection = state.hub.connection_state();
    Json(ConnectionStatus {
        state: connection,
        is_connected: connection == ConnectionState::Connected,
    })
}

/// Reports keyed by date; an open-ended range covers every stored day
pub async fn list_reports(
    Query(query): Query<DateRangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Json<ReportMap> {
    let start = query.start.unwrap_or(NaiveDate::MIN);
    let end = query.end.unwrap_or(NaiveDate::MAX);
    Json(state.hub.reports_by_date_range(start, end).await)
}

pub async fn get_report(
    Path(date): Path<NaiveDate>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DailyReport>, StatusCode> {
    state.hub.report(date).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Aggregate today's samples immediately
pub async fn aggregate_now(State(state): State<Arc<AppState>>) -> Response {
    match state.hub.aggregate_now().await {
        Ok(Some((_, report))) => Json(report).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(HubError::NotRunning) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "On-demand aggregation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connection_manager::HubSettings;
    use crate::application::report_store::ReportStore;
    use crate::application::telemetry_hub::TelemetryHub;
    use crate::domain::calendar::ReportTimeZone;
    use crate::domain::report::{SystemModeCounts, TemperatureStats};
    use crate::infrastructure::file_store::MemoryKeyValueStore;
    use crate::infrastructure::websocket_transport::WebSocketTransport;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn report(critical: u64) -> DailyReport {
        DailyReport {
            critical_alerts_count: critical,
            system_modes_counts: SystemModeCounts::default(),
            temperature_stats: TemperatureStats::default(),
            sample_count: 10,
        }
    }

    /// State around a hub that is never started.
    async fn idle_state() -> (Arc<AppState>, Arc<ReportStore>) {
        let store = Arc::new(
            ReportStore::open(Arc::new(MemoryKeyValueStore::default()))
                .await
                .unwrap(),
        );
        let hub = TelemetryHub::new(
            Arc::new(WebSocketTransport::new("ws://127.0.0.1:1/")),
            store.clone(),
            HubSettings::default(),
            ReportTimeZone::utc(),
        );
        (Arc::new(AppState { hub: Arc::new(hub) }), store)
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "ok");
    }

    #[tokio::test]
    async fn test_connection_status_before_start() {
        let (state, _) = idle_state().await;
        let Json(status) = connection_status(State(state)).await;
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.is_connected);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isConnected"], false);
        assert_eq!(json["state"], "disconnected");
    }

    #[tokio::test]
    async fn test_telemetry_reads_return_seed() {
        let (state, _) = idle_state().await;
        let Json(current) = current_sample(State(state.clone())).await;
        assert_eq!(current.temperatures.motor, Some(55.2));
        assert!(history(State(state.clone())).await.0.is_empty());
        assert!(alerts(State(state)).await.0.is_empty());
    }

    #[tokio::test]
    async fn test_report_lookup_and_range() {
        let (state, store) = idle_state().await;
        store.put(date("2026-06-20"), report(1)).await.unwrap();
        store.put(date("2026-06-22"), report(2)).await.unwrap();

        let found = get_report(Path(date("2026-06-22")), State(state.clone())).await;
        assert_eq!(found.unwrap().0, report(2));

        let missing = get_report(Path(date("2026-06-21")), State(state.clone())).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);

        let query = DateRangeQuery {
            start: Some(date("2026-06-21")),
            end: Some(date("2026-06-30")),
        };
        let Json(range) = list_reports(Query(query), State(state.clone())).await;
        assert_eq!(range.keys().copied().collect::<Vec<_>>(), vec![date("2026-06-22")]);

        let open = DateRangeQuery {
            start: None,
            end: None,
        };
        assert_eq!(list_reports(Query(open), State(state)).await.0.len(), 2);
    }

    #[tokio::test]
    async fn test_aggregate_requires_running_hub() {
        let (state, _) = idle_state().await;
        let response = aggregate_now(State(state)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
