// Telemetry hub - owned entry point for consumers of live telemetry and reports
use crate::application::clock::{SystemClock, WallClock};
use crate::application::connection_manager::{
    Command, ConnectionManager, ConnectionState, HubSettings, TelemetrySnapshot,
};
use crate::application::daily_aggregator::DailyAggregator;
use crate::application::key_value_store::StoreError;
use crate::application::report_store::{ReportMap, ReportStore};
use crate::application::transport::FrameTransport;
use crate::domain::alert::Alert;
use crate::domain::calendar::ReportTimeZone;
use crate::domain::report::DailyReport;
use crate::domain::telemetry::TelemetrySample;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("telemetry hub is not running")]
    NotRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Pending {
    manager: ConnectionManager,
    commands: mpsc::Receiver<Command>,
}

pub struct TelemetryHub {
    snapshot: watch::Receiver<TelemetrySnapshot>,
    store: Arc<ReportStore>,
    commands: mpsc::Sender<Command>,
    shutdown: watch::Sender<bool>,
    pending: Mutex<Option<Pending>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryHub {
    pub fn new(
        transport: Arc<dyn FrameTransport>,
        store: Arc<ReportStore>,
        settings: HubSettings,
        zone: ReportTimeZone,
    ) -> Self {
        Self::with_clock(transport, store, settings, zone, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: Arc<dyn FrameTransport>,
        store: Arc<ReportStore>,
        settings: HubSettings,
        zone: ReportTimeZone,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        let aggregator = DailyAggregator::new(store.clone(), zone);
        let (manager, snapshot) = ConnectionManager::new(transport, aggregator, &settings, clock);
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (shutdown, _) = watch::channel(false);

        Self {
            snapshot,
            store,
            commands,
            shutdown,
            pending: Mutex::new(Some(Pending {
                manager,
                commands: command_rx,
            })),
            task: Mutex::new(None),
        }
    }

    /// Spawn the connection manager. Later calls do nothing.
    pub async fn start(&self) {
        let Some(pending) = self.pending.lock().await.take() else {
            tracing::debug!("Telemetry hub already started");
            return;
        };
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(pending.manager.run(shutdown, pending.commands));
        *self.task.lock().await = Some(handle);
    }

    /// Stop the connection manager and wait for it to release the link.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        self.pending.lock().await.take();

        let Some(handle) = self.task.lock().await.take() else {
            return;
        };
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Connection manager task failed");
        }
    }

    pub fn current_sample(&self) -> TelemetrySample {
        self.snapshot.borrow().current.clone()
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<TelemetrySample> {
        self.snapshot.borrow().history.clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.snapshot.borrow().alerts.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot.borrow().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot.clone()
    }

    pub async fn reports_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> ReportMap {
        self.store.get_range(start, end).await
    }

    pub async fn report(&self, date: NaiveDate) -> Option<DailyReport> {
        self.store.get(date).await
    }

    pub async fn latest_report_date(&self) -> Option<NaiveDate> {
        self.store.latest_date().await
    }

    /// Aggregate today's samples now. `None` when nothing arrived today.
    pub async fn aggregate_now(&self) -> Result<Option<(NaiveDate, DailyReport)>, HubError> {
        if self.task.lock().await.is_none() {
            return Err(HubError::NotRunning);
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::AggregateNow(reply))
            .await
            .map_err(|_| HubError::NotRunning)?;
        let result = response.await.map_err(|_| HubError::NotRunning)?;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::producer::SampleOrigin;
    use crate::application::transport::{FrameStream, TransportError};
    use crate::domain::report::{SystemModeCounts, TemperatureStats};
    use crate::infrastructure::file_store::MemoryKeyValueStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    const COOL: &str = r#"{"temp616": {"MtrTemp": 61.0, "CtlrTemp1": 44.0, "CtlrTemp2": 45.0}}"#;
    const HOT: &str = r#"{"temp616": {"MtrTemp": 72.5, "CtlrTemp1": 44.0, "CtlrTemp2": 45.0}}"#;

    /// Wall clock that advances with tokio's (possibly paused) clock.
    struct TokioClock {
        anchor: DateTime<Utc>,
        start: Instant,
    }

    impl TokioClock {
        fn at(rfc3339: &str) -> Arc<Self> {
            Arc::new(Self {
                anchor: DateTime::parse_from_rfc3339(rfc3339)
                    .unwrap()
                    .with_timezone(&Utc),
                start: Instant::now(),
            })
        }
    }

    impl WallClock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            self.anchor + TimeDelta::from_std(Instant::now() - self.start).unwrap()
        }
    }

    struct RefusingTransport {
        attempts: Arc<std::sync::Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl FrameTransport for RefusingTransport {
        async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
            self.attempts.lock().unwrap().push(Instant::now());
            Err(TransportError::Connect("connection refused".into()))
        }
    }

    /// What one connect attempt yields.
    enum Session {
        Refused,
        /// Deliver the frames, then either end the stream or stay open.
        Open(Vec<&'static str>, bool),
    }

    /// Plays one session per connect; refuses once the script runs out.
    struct ScriptedTransport {
        sessions: std::sync::Mutex<VecDeque<Session>>,
        connects: Arc<std::sync::Mutex<Vec<Instant>>>,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn new(sessions: Vec<Session>) -> Self {
            Self {
                sessions: std::sync::Mutex::new(sessions.into()),
                connects: Arc::default(),
                closed: Arc::default(),
            }
        }
    }

    struct ScriptedStream {
        frames: VecDeque<&'static str>,
        ends: bool,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FrameTransport for ScriptedTransport {
        async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
            self.connects.lock().unwrap().push(Instant::now());
            match self.sessions.lock().unwrap().pop_front() {
                Some(Session::Open(frames, ends)) => Ok(Box::new(ScriptedStream {
                    frames: frames.into(),
                    ends,
                    closed: self.closed.clone(),
                })),
                Some(Session::Refused) | None => {
                    Err(TransportError::Connect("connection refused".into()))
                }
            }
        }
    }

    #[async_trait]
    impl FrameStream for ScriptedStream {
        async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
            match self.frames.pop_front() {
                Some(frame) => Some(Ok(frame.as_bytes().to_vec())),
                None if self.ends => None,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn memory_store() -> Arc<ReportStore> {
        Arc::new(
            ReportStore::open(Arc::new(MemoryKeyValueStore::default()))
                .await
                .unwrap(),
        )
    }

    async fn hub_with(transport: Arc<dyn FrameTransport>) -> TelemetryHub {
        TelemetryHub::new(
            transport,
            memory_store().await,
            HubSettings::default(),
            ReportTimeZone::utc(),
        )
    }

    fn scripted() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::new(vec![Session::Open(
            vec![COOL, "not json", HOT],
            false,
        )]))
    }

    fn gaps(connects: &[Instant]) -> Vec<u128> {
        connects
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connects_back_off_and_fall_back_to_synthetic() {
        let attempts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let hub = hub_with(Arc::new(RefusingTransport {
            attempts: attempts.clone(),
        }))
        .await;

        hub.start().await;
        tokio::time::sleep(Duration::from_millis(7500)).await;

        let attempts = attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 4);
        assert_eq!(gaps(&attempts), vec![1000, 2000, 4000]);

        assert!(!hub.is_connected());
        let snapshot = hub.snapshot();
        assert!(snapshot.history.len() >= 3);
        assert_eq!(snapshot.origin, Some(SampleOrigin::Synthetic));
        assert_eq!(snapshot.history.last(), Some(&snapshot.current));

        hub.stop().await;
        assert_eq!(hub.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_frames_reach_consumers() {
        let transport = scripted();
        let closed = transport.closed.clone();
        let hub = hub_with(transport).await;
        let mut updates = hub.subscribe();

        hub.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(hub.is_connected());
        let history = hub.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].temperatures.motor, Some(61.0));
        assert_eq!(hub.current_sample().temperatures.motor, Some(72.5));
        assert!(hub.alerts().iter().any(|a| a.is_critical()));
        assert!(updates.has_changed().unwrap());
        assert_eq!(
            updates.borrow_and_update().origin,
            Some(SampleOrigin::Live)
        );

        hub.stop().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!hub.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_link_falls_back_and_reconnects() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Session::Open(vec![COOL, HOT], true),
            Session::Refused,
            Session::Open(vec![COOL], true),
            Session::Refused,
            Session::Open(vec![r#"{"temp616": {"MtrTemp": 77.7}}"#], false),
        ]));
        let connects = transport.connects.clone();
        let closed = transport.closed.clone();
        let settings = HubSettings {
            synthetic_interval: Duration::from_millis(400),
            ..HubSettings::default()
        };
        let hub = TelemetryHub::new(
            transport,
            memory_store().await,
            settings,
            ReportTimeZone::utc(),
        );

        hub.start().await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        // The stream ended right after its frames.
        assert_eq!(hub.connection_state(), ConnectionState::Disconnected);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(hub.history().len(), 2);
        assert_eq!(hub.snapshot().origin, Some(SampleOrigin::Live));

        // One synthetic period later the fallback takes over.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hub.history().len(), 3);
        assert_eq!(hub.snapshot().origin, Some(SampleOrigin::Synthetic));

        tokio::time::sleep(Duration::from_millis(6000)).await;
        assert!(hub.is_connected());
        assert_eq!(hub.snapshot().origin, Some(SampleOrigin::Live));
        assert_eq!(hub.current_sample().temperatures.motor, Some(77.7));
        assert_eq!(closed.load(Ordering::SeqCst), 2);

        // Each successful open starts the backoff from the floor again.
        let connects = connects.lock().unwrap().clone();
        assert_eq!(gaps(&connects), vec![1000, 2000, 1000, 2000]);

        hub.stop().await;
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_midnight_finalizes_the_previous_day() {
        let store = memory_store().await;
        let hub = TelemetryHub::with_clock(
            Arc::new(ScriptedTransport::new(vec![Session::Open(vec![HOT], false)])),
            store.clone(),
            HubSettings::default(),
            ReportTimeZone::utc(),
            TokioClock::at("2026-06-20T23:59:58Z"),
        );

        hub.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let yesterday: NaiveDate = "2026-06-20".parse().unwrap();
        assert!(store.get(yesterday).await.is_none());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let report = store.get(yesterday).await.unwrap();
        assert_eq!(report.sample_count, 1);
        assert_eq!(report.critical_alerts_count, 1);

        // The new day has no samples yet.
        assert!(hub.aggregate_now().await.unwrap().is_none());
        hub.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_continues_todays_report() {
        let store = memory_store().await;
        let today: NaiveDate = "2026-06-21".parse().unwrap();
        store
            .put(
                today,
                DailyReport {
                    critical_alerts_count: 7,
                    system_modes_counts: SystemModeCounts::default(),
                    temperature_stats: TemperatureStats::default(),
                    sample_count: 500,
                },
            )
            .await
            .unwrap();

        let hub = TelemetryHub::with_clock(
            Arc::new(ScriptedTransport::new(vec![Session::Open(vec![COOL], false)])),
            store.clone(),
            HubSettings::default(),
            ReportTimeZone::utc(),
            TokioClock::at("2026-06-21T12:00:00Z"),
        );

        hub.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Startup leaves the stored totals in place.
        assert_eq!(store.get(today).await.map(|r| r.sample_count), Some(500));

        let (date, report) = hub.aggregate_now().await.unwrap().unwrap();
        assert_eq!(date, today);
        assert_eq!(report.sample_count, 501);
        assert_eq!(report.critical_alerts_count, 7);
        assert_eq!(report.temperature_stats.motor.max, Some(61.0));
        assert_eq!(store.get(today).await, Some(report));

        hub.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_now_writes_todays_report() {
        let hub = hub_with(scripted()).await;

        assert!(matches!(hub.aggregate_now().await, Err(HubError::NotRunning)));

        hub.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (date, report) = hub.aggregate_now().await.unwrap().unwrap();
        assert_eq!(date, Utc::now().date_naive());
        assert_eq!(report.sample_count, 2);
        assert_eq!(report.critical_alerts_count, 1);
        assert_eq!(report.temperature_stats.motor.max, Some(72.5));
        assert_eq!(hub.report(date).await, Some(report.clone()));
        assert_eq!(hub.latest_report_date().await, Some(date));
        assert_eq!(hub.reports_by_date_range(date, date).await.len(), 1);

        hub.stop().await;
        assert!(matches!(hub.aggregate_now().await, Err(HubError::NotRunning)));
    }

    #[tokio::test]
    async fn test_consumers_see_seed_before_start() {
        let hub = hub_with(scripted()).await;
        assert!(hub.history().is_empty());
        assert!(hub.alerts().is_empty());
        assert_eq!(hub.current_sample().temperatures.motor, Some(55.2));
        assert_eq!(hub.connection_state(), ConnectionState::Disconnected);
    }
}
