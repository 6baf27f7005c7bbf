// Alert derivation rules
use super::telemetry::{StatusFlag, TelemetrySample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MOTOR_TEMP_CRITICAL: f64 = 70.0;
pub const CONTROLLER_TEMP_WARNING: f64 = 65.0;
pub const BUS_OVERVOLTAGE: f64 = 450.0;
pub const BUS_UNDERVOLTAGE: f64 = 250.0;
pub const AC_CURRENT_WARNING: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertCategory {
    Temperature,
    Electrical,
    System,
    Sensors,
    Fault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub severity: Severity,
    pub category: AlertCategory,
    pub message: String,
    pub observed_value: Option<f64>,
    pub threshold: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    fn new(
        severity: Severity,
        category: AlertCategory,
        message: String,
        observed_value: Option<f64>,
        threshold: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            category,
            message,
            observed_value,
            threshold,
            timestamp,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Evaluate every rule against one sample, in rule order.
///
/// Each call yields a fresh list; nothing carries over between samples.
/// Rules whose reading is missing from the sample do not fire.
pub fn derive_alerts(sample: &TelemetrySample) -> Vec<Alert> {
    let at = sample.timestamp;
    let mut alerts = Vec::new();

    if let Some(motor) = sample.temperatures.motor {
        if motor > MOTOR_TEMP_CRITICAL {
            alerts.push(Alert::new(
                Severity::Critical,
                AlertCategory::Temperature,
                format!("Motor temperature critical: {motor:.1}°C"),
                Some(motor),
                Some(MOTOR_TEMP_CRITICAL),
                at,
            ));
        }
    }

    if let Some(controller) = sample.temperatures.controller_max() {
        if controller > CONTROLLER_TEMP_WARNING {
            alerts.push(Alert::new(
                Severity::Warning,
                AlertCategory::Temperature,
                format!("Controller temperature high: {controller:.1}°C"),
                Some(controller),
                Some(CONTROLLER_TEMP_WARNING),
                at,
            ));
        }
    }

    if let Some(volts) = sample.measurements.dc_bus_voltage {
        if volts > BUS_OVERVOLTAGE {
            alerts.push(Alert::new(
                Severity::Critical,
                AlertCategory::Electrical,
                format!("DC bus overvoltage: {volts:.1}V"),
                Some(volts),
                Some(BUS_OVERVOLTAGE),
                at,
            ));
        } else if volts < BUS_UNDERVOLTAGE {
            alerts.push(Alert::new(
                Severity::Warning,
                AlertCategory::Electrical,
                format!("DC bus undervoltage: {volts:.1}V"),
                Some(volts),
                Some(BUS_UNDERVOLTAGE),
                at,
            ));
        }
    }

    if let Some(current) = sample.measurements.ac_current_rms {
        if current > AC_CURRENT_WARNING {
            alerts.push(Alert::new(
                Severity::Warning,
                AlertCategory::Electrical,
                format!("AC RMS current high: {current:.1}A"),
                Some(current),
                Some(AC_CURRENT_WARNING),
                at,
            ));
        }
    }

    if sample.status.get(StatusFlag::LimpHomeMode) {
        alerts.push(Alert::new(
            Severity::Critical,
            AlertCategory::System,
            "Limp home mode active".to_string(),
            None,
            None,
            at,
        ));
    }

    let failing = sample.status.failing_sensors();
    if !failing.is_empty() {
        let names: Vec<&str> = failing.iter().filter_map(|f| f.sensor_name()).collect();
        alerts.push(Alert::new(
            Severity::Warning,
            AlertCategory::Sensors,
            format!("Sensor health check failed: {}", names.join(", ")),
            None,
            None,
            at,
        ));
    }

    for bit in sample.faults.active() {
        alerts.push(Alert::new(
            Severity::Critical,
            AlertCategory::Fault,
            format!("Fault active: {} ({})", bit.description(), bit.wire_name()),
            None,
            None,
            at,
        ));
    }

    alerts
}

/// Number of critical alerts the sample raises.
pub fn critical_alert_count(sample: &TelemetrySample) -> u64 {
    derive_alerts(sample).iter().filter(|a| a.is_critical()).count() as u64
}
