// Daily report domain model and aggregation
use super::alert::critical_alert_count;
use super::calendar::ReportTimeZone;
use super::telemetry::{StatusFlag, TelemetrySample};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemModeCounts {
    pub regen: u64,
    pub asc: u64,
    pub hill_hold: u64,
    pub limp: u64,
    pub idle_shutdown: u64,
}

/// Lowest and highest reading of one quantity over a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl TemperatureRange {
    fn observe(&mut self, reading: Option<f64>) {
        let Some(value) = reading.filter(|v| v.is_finite()) else {
            return;
        };
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureStats {
    pub motor: TemperatureRange,
    /// Both controller channels pooled together.
    pub controller: TemperatureRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub critical_alerts_count: u64,
    pub system_modes_counts: SystemModeCounts,
    pub temperature_stats: TemperatureStats,
    #[serde(default)]
    pub sample_count: u64,
}

/// Running totals for one calendar day.
///
/// Every statistic is a count or an extreme, so folding order does not
/// change the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayAccumulator {
    samples: u64,
    critical_alerts: u64,
    modes: SystemModeCounts,
    temperatures: TemperatureStats,
}

impl DayAccumulator {
    pub fn observe(&mut self, sample: &TelemetrySample) {
        self.samples += 1;
        self.critical_alerts += critical_alert_count(sample);

        let status = &sample.status;
        let modes = &mut self.modes;
        modes.regen += u64::from(status.get(StatusFlag::RegeMode));
        modes.asc += u64::from(status.get(StatusFlag::AscMode));
        modes.hill_hold += u64::from(status.get(StatusFlag::HillholdMode));
        modes.limp += u64::from(status.get(StatusFlag::LimpHomeMode));
        modes.idle_shutdown += u64::from(status.get(StatusFlag::IdleShutdown));

        let temps = &sample.temperatures;
        self.temperatures.motor.observe(temps.motor);
        self.temperatures.controller.observe(temps.controller_1);
        self.temperatures.controller.observe(temps.controller_2);
    }

    /// Resume a day from its stored report; every report field is part of the running state.
    pub fn from_report(report: &DailyReport) -> Self {
        Self {
            samples: report.sample_count,
            critical_alerts: report.critical_alerts_count,
            modes: report.system_modes_counts,
            temperatures: report.temperature_stats,
        }
    }

    /// `None` when nothing was observed.
    pub fn report(&self) -> Option<DailyReport> {
        if self.samples == 0 {
            return None;
        }
        Some(DailyReport {
            critical_alerts_count: self.critical_alerts,
            system_modes_counts: self.modes,
            temperature_stats: self.temperatures,
            sample_count: self.samples,
        })
    }
}

/// Fold the samples that fall on `date` in `zone` into a report.
pub fn aggregate<'a>(
    date: NaiveDate,
    samples: impl IntoIterator<Item = &'a TelemetrySample>,
    zone: &ReportTimeZone,
) -> Option<DailyReport> {
    let mut day = DayAccumulator::default();
    samples
        .into_iter()
        .filter(|s| zone.date_of(&s.timestamp) == date)
        .for_each(|s| day.observe(s));
    day.report()
}
