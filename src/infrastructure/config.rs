use crate::application::connection_manager::HubSettings;
use crate::domain::calendar::ReportTimeZone;
use crate::domain::history::HISTORY_CAPACITY;
use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub transport: TransportSettings,
    pub backoff: BackoffSettings,
    pub synthetic: SyntheticSettings,
    pub history: HistorySettings,
    pub reports: ReportSettings,
    pub store: StoreSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransportSettings {
    pub url: String,
    pub connect_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            url: "ws://192.168.4.1:81/".to_string(),
            connect_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackoffSettings {
    pub floor_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            floor_ms: 1000,
            ceiling_ms: 30000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyntheticSettings {
    pub interval_ms: u64,
    pub flip_probability: f64,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            flip_probability: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistorySettings {
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: HISTORY_CAPACITY,
        }
    }
}

/// Unset offset means the host's local time zone.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReportSettings {
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreSettings {
    pub directory: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            connect_timeout: Duration::from_millis(self.transport.connect_timeout_ms),
            backoff_floor: Duration::from_millis(self.backoff.floor_ms),
            backoff_ceiling: Duration::from_millis(self.backoff.ceiling_ms),
            synthetic_interval: Duration::from_millis(self.synthetic.interval_ms),
            flip_probability: self.synthetic.flip_probability,
            history_capacity: self.history.capacity,
        }
    }

    pub fn report_zone(&self) -> ReportTimeZone {
        self.reports
            .utc_offset_minutes
            .map(ReportTimeZone::from_offset_minutes)
            .unwrap_or_default()
    }

    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("invalid server.bind address {:?}", self.server.bind))
    }
}

/// `config/telemetry.*` if present, overridden by `DCU__SECTION__KEY` variables.
pub fn load_telemetry_config() -> anyhow::Result<TelemetryConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/telemetry").required(false))
        .add_source(
            config::Environment::with_prefix("DCU")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read telemetry configuration")?;

    settings
        .try_deserialize()
        .context("invalid telemetry configuration")
}
