// Sample producers - live controller frames or synthetic fallback data
use crate::application::clock::WallClock;
use crate::application::transport::FrameStream;
use crate::domain::synthetic::synthesize;
use crate::domain::telemetry::TelemetrySample;
use crate::infrastructure::frame_decoder::decode_frame;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrigin {
    Live,
    Synthetic,
}

/// Source of telemetry samples. Consumers never need to know which one is active.
#[async_trait]
pub trait SampleProducer: Send {
    fn origin(&self) -> SampleOrigin;

    /// Wait for the next sample. `None` means this producer is finished.
    ///
    /// Cancel safe: dropping the future never loses a produced sample.
    async fn next_sample(&mut self, previous: &TelemetrySample) -> Option<TelemetrySample>;
}

/// Decodes frames from an open controller connection.
pub struct LiveProducer {
    stream: Box<dyn FrameStream>,
    clock: Arc<dyn WallClock>,
    dropped_frames: u64,
}

impl LiveProducer {
    pub fn new(stream: Box<dyn FrameStream>, clock: Arc<dyn WallClock>) -> Self {
        Self {
            stream,
            clock,
            dropped_frames: 0,
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub async fn close(&mut self) {
        self.stream.close().await;
    }
}

#[async_trait]
impl SampleProducer for LiveProducer {
    fn origin(&self) -> SampleOrigin {
        SampleOrigin::Live
    }

    async fn next_sample(&mut self, _previous: &TelemetrySample) -> Option<TelemetrySample> {
        loop {
            match self.stream.next_frame().await? {
                Ok(frame) => match decode_frame(&frame, self.clock.now()) {
                    Ok(sample) => return Some(sample),
                    Err(e) => {
                        self.dropped_frames += 1;
                        tracing::warn!(
                            error = %e,
                            dropped = self.dropped_frames,
                            "Dropping undecodable frame"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Controller link failed");
                    return None;
                }
            }
        }
    }
}

/// Random-walks the previous sample on a fixed tick.
pub struct SyntheticProducer {
    ticker: Interval,
    period: Duration,
    flip_probability: f64,
    rng: StdRng,
    clock: Arc<dyn WallClock>,
}

impl SyntheticProducer {
    pub fn new(period: Duration, flip_probability: f64, clock: Arc<dyn WallClock>) -> Self {
        Self::with_rng(period, flip_probability, StdRng::from_entropy(), clock)
    }

    pub fn with_rng(
        period: Duration,
        flip_probability: f64,
        rng: StdRng,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            ticker: Self::ticker(period),
            period,
            flip_probability,
            rng,
            clock,
        }
    }

    /// Restart the tick so the first synthetic sample comes one period from now.
    pub fn restart(&mut self) {
        self.ticker = Self::ticker(self.period);
    }

    fn ticker(period: Duration) -> Interval {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

#[async_trait]
impl SampleProducer for SyntheticProducer {
    fn origin(&self) -> SampleOrigin {
        SampleOrigin::Synthetic
    }

    async fn next_sample(&mut self, previous: &TelemetrySample) -> Option<TelemetrySample> {
        self.ticker.tick().await;
        Some(synthesize(previous, self.clock.now(), self.flip_probability, &mut self.rng))
    }
}
