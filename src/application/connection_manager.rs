// Connection manager - single owner of the controller link and live telemetry state
use crate::application::clock::WallClock;
use crate::application::daily_aggregator::DailyAggregator;
use crate::application::key_value_store::StoreError;
use crate::application::producer::{LiveProducer, SampleOrigin, SampleProducer, SyntheticProducer};
use crate::application::transport::{FrameStream, FrameTransport, TransportError};
use crate::domain::alert::{derive_alerts, Alert};
use crate::domain::history::{HistoryBuffer, HISTORY_CAPACITY};
use crate::domain::report::DailyReport;
use crate::domain::telemetry::TelemetrySample;
use chrono::NaiveDate;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, sleep_until, Instant, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Reconnect delay that doubles after every failure, between a floor and a ceiling.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(Duration::from_millis(1));
        Self {
            floor,
            ceiling: ceiling.max(floor),
            current: floor,
        }
    }

    /// Delay to wait before the next attempt; the one after it is doubled.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub connect_timeout: Duration,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    pub synthetic_interval: Duration,
    pub flip_probability: f64,
    pub history_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            backoff_floor: Duration::from_millis(1000),
            backoff_ceiling: Duration::from_millis(30000),
            synthetic_interval: Duration::from_millis(1000),
            flip_probability: 0.5,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

/// Everything consumers may read, published after every change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub current: TelemetrySample,
    /// Oldest first.
    pub history: Vec<TelemetrySample>,
    pub alerts: Vec<Alert>,
    pub connection: ConnectionState,
    /// Producer of `current`; `None` while it is still the startup seed.
    pub origin: Option<SampleOrigin>,
}

impl TelemetrySnapshot {
    fn seeded(current: TelemetrySample) -> Self {
        Self {
            current,
            history: Vec::new(),
            alerts: Vec::new(),
            connection: ConnectionState::Disconnected,
            origin: None,
        }
    }
}

pub type AggregateReply = Result<Option<(NaiveDate, DailyReport)>, StoreError>;

pub enum Command {
    /// Write today's report from what has been observed so far.
    AggregateNow(oneshot::Sender<AggregateReply>),
}

type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn FrameStream>, TransportError>> + Send>>;

enum Link {
    Waiting(Pin<Box<Sleep>>),
    Connecting(ConnectFuture),
    /// Samples come from the live producer until it ends.
    Open,
}

enum Event {
    Shutdown,
    Opened(Box<dyn FrameStream>),
    ConnectFailed(TransportError),
    RetryDue,
    Sample(TelemetrySample, SampleOrigin),
    LinkLost,
    Midnight,
    Command(Command),
}

async fn poll_link(link: &mut Link) -> Event {
    match link {
        Link::Waiting(retry) => {
            retry.as_mut().await;
            Event::RetryDue
        }
        Link::Connecting(attempt) => match attempt.as_mut().await {
            Ok(stream) => Event::Opened(stream),
            Err(e) => Event::ConnectFailed(e),
        },
        Link::Open => std::future::pending().await,
    }
}

/// Only the live producer ever finishes; that ends the link.
async fn poll_producer(producer: &mut dyn SampleProducer, previous: &TelemetrySample) -> Event {
    let origin = producer.origin();
    match producer.next_sample(previous).await {
        Some(sample) => Event::Sample(sample, origin),
        None => Event::LinkLost,
    }
}

pub struct ConnectionManager {
    transport: Arc<dyn FrameTransport>,
    clock: Arc<dyn WallClock>,
    connect_timeout: Duration,
    backoff: ReconnectBackoff,
    synthetic: SyntheticProducer,
    aggregator: DailyAggregator,
    history: HistoryBuffer,
    current: TelemetrySample,
    alerts: Vec<Alert>,
    state: ConnectionState,
    origin: Option<SampleOrigin>,
    snapshot: watch::Sender<TelemetrySnapshot>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn FrameTransport>,
        aggregator: DailyAggregator,
        settings: &HubSettings,
        clock: Arc<dyn WallClock>,
    ) -> (Self, watch::Receiver<TelemetrySnapshot>) {
        let seed = TelemetrySample::baseline(clock.now());
        let (snapshot, receiver) = watch::channel(TelemetrySnapshot::seeded(seed.clone()));

        let manager = Self {
            transport,
            connect_timeout: settings.connect_timeout,
            backoff: ReconnectBackoff::new(settings.backoff_floor, settings.backoff_ceiling),
            synthetic: SyntheticProducer::new(
                settings.synthetic_interval,
                settings.flip_probability,
                clock.clone(),
            ),
            clock,
            aggregator,
            history: HistoryBuffer::new(settings.history_capacity),
            current: seed,
            alerts: Vec::new(),
            state: ConnectionState::Disconnected,
            origin: None,
            snapshot,
        };
        (manager, receiver)
    }

    /// Drive the link until `shutdown` flips or its sender is dropped.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        tracing::info!("Connection manager started");

        let now = self.clock.now();
        self.aggregator.resume(&now).await;
        let today = self.aggregator.date_of(&now);
        if let Err(e) = self.aggregator.run_for(today).await {
            tracing::error!(error = %e, "Startup aggregation failed");
        }

        let mut midnight = Box::pin(sleep_until(self.next_midnight_deadline()));
        self.synthetic.restart();
        let mut live: Option<LiveProducer> = None;
        let mut link = self.begin_connect();

        loop {
            let producer: &mut dyn SampleProducer = match live.as_mut() {
                Some(open) => open,
                None => &mut self.synthetic,
            };
            let event = tokio::select! {
                _ = shutdown.changed() => Event::Shutdown,
                event = poll_link(&mut link) => event,
                event = poll_producer(producer, &self.current) => event,
                () = &mut midnight => Event::Midnight,
                Some(command) = commands.recv() => Event::Command(command),
            };

            match event {
                Event::Shutdown => break,
                Event::Opened(stream) => {
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    tracing::info!("Controller connected");
                    live = Some(LiveProducer::new(stream, self.clock.clone()));
                    link = Link::Open;
                }
                Event::ConnectFailed(e) => {
                    tracing::warn!(error = %e, "Controller connect failed");
                    link = self.schedule_reconnect();
                }
                Event::RetryDue => link = self.begin_connect(),
                Event::Sample(sample, origin) => self.record(sample, origin),
                Event::LinkLost => {
                    if let Some(mut lost) = live.take() {
                        tracing::info!(dropped_frames = lost.dropped_frames(), "Controller link lost");
                        lost.close().await;
                    }
                    self.synthetic.restart();
                    link = self.schedule_reconnect();
                }
                Event::Midnight => {
                    if let Err(e) = self.aggregator.roll_over(&self.clock.now()).await {
                        tracing::error!(error = %e, "Midnight aggregation failed");
                    }
                    midnight.as_mut().reset(self.next_midnight_deadline());
                }
                Event::Command(Command::AggregateNow(reply)) => {
                    let today = self.aggregator.date_of(&self.clock.now());
                    let result = self
                        .aggregator
                        .run_for(today)
                        .await
                        .map(|report| report.map(|r| (today, r)));
                    let _ = reply.send(result);
                }
            }
        }

        if let Some(mut open) = live.take() {
            open.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Connection manager stopped");
    }

    fn begin_connect(&mut self) -> Link {
        self.set_state(ConnectionState::Connecting);

        let transport = self.transport.clone();
        let limit = self.connect_timeout;
        Link::Connecting(Box::pin(async move {
            match tokio::time::timeout(limit, transport.connect()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(limit)),
            }
        }))
    }

    fn schedule_reconnect(&mut self) -> Link {
        let delay = self.backoff.next_delay();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        Link::Waiting(Box::pin(sleep(delay)))
    }

    fn record(&mut self, sample: TelemetrySample, origin: SampleOrigin) {
        self.aggregator.observe(&sample);
        self.alerts = derive_alerts(&sample);
        self.history.push(sample.clone());
        self.current = sample;
        self.origin = Some(origin);
        tracing::debug!(?origin, alerts = self.alerts.len(), "Sample recorded");

        self.snapshot.send_replace(TelemetrySnapshot {
            current: self.current.clone(),
            history: self.history.to_vec(),
            alerts: self.alerts.clone(),
            connection: self.state,
            origin: self.origin,
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.snapshot.send_if_modified(|snapshot| {
            let changed = snapshot.connection != state;
            snapshot.connection = state;
            changed
        });
    }

    /// Tokio deadline of the next report-zone midnight on the wall clock.
    fn next_midnight_deadline(&self) -> Instant {
        let now = self.clock.now();
        let next = self.aggregator.next_midnight_after(&now);
        Instant::now() + (next - now).to_std().unwrap_or_default()
    }
}
