// Telemetry sample domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Boolean status flags reported by the drive control unit.
///
/// Variant names are the firmware's wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusFlag {
    EcoPost,
    LimpHomeMode,
    Brake,
    Forward,
    Reverse,
    Neutral,
    HillholdMode,
    RegeMode,
    ThrotMode,
    AscMode,
    SnsrHealthStatus,
    SnsrHealthStatusDcBus,
    SnsrHealthStatus12V,
    SnsrHealthStatus5V,
    SnsrHealthStatusPhBCurr,
    SnsrHealthStatusPhCCurr,
    SnsrHealthStatusThrot1,
    SnsrHealthStatusQep,
    SnsrHealthStatusCtlrTemp1,
    SnsrHealthStatusMtrTemp,
    SnsrHealthStatusThrot2,
    SnsrHealthStatusCtlrTemp2,
    PcModeEnable,
    StartStop,
    DcuControlModeStatus,
    IdleShutdown,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 26] = [
        StatusFlag::EcoPost,
        StatusFlag::LimpHomeMode,
        StatusFlag::Brake,
        StatusFlag::Forward,
        StatusFlag::Reverse,
        StatusFlag::Neutral,
        StatusFlag::HillholdMode,
        StatusFlag::RegeMode,
        StatusFlag::ThrotMode,
        StatusFlag::AscMode,
        StatusFlag::SnsrHealthStatus,
        StatusFlag::SnsrHealthStatusDcBus,
        StatusFlag::SnsrHealthStatus12V,
        StatusFlag::SnsrHealthStatus5V,
        StatusFlag::SnsrHealthStatusPhBCurr,
        StatusFlag::SnsrHealthStatusPhCCurr,
        StatusFlag::SnsrHealthStatusThrot1,
        StatusFlag::SnsrHealthStatusQep,
        StatusFlag::SnsrHealthStatusCtlrTemp1,
        StatusFlag::SnsrHealthStatusMtrTemp,
        StatusFlag::SnsrHealthStatusThrot2,
        StatusFlag::SnsrHealthStatusCtlrTemp2,
        StatusFlag::PcModeEnable,
        StatusFlag::StartStop,
        StatusFlag::DcuControlModeStatus,
        StatusFlag::IdleShutdown,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            StatusFlag::EcoPost => "EcoPost",
            StatusFlag::LimpHomeMode => "LimpHomeMode",
            StatusFlag::Brake => "Brake",
            StatusFlag::Forward => "Forward",
            StatusFlag::Reverse => "Reverse",
            StatusFlag::Neutral => "Neutral",
            StatusFlag::HillholdMode => "HillholdMode",
            StatusFlag::RegeMode => "RegeMode",
            StatusFlag::ThrotMode => "ThrotMode",
            StatusFlag::AscMode => "AscMode",
            StatusFlag::SnsrHealthStatus => "SnsrHealthStatus",
            StatusFlag::SnsrHealthStatusDcBus => "SnsrHealthStatusDcBus",
            StatusFlag::SnsrHealthStatus12V => "SnsrHealthStatus12V",
            StatusFlag::SnsrHealthStatus5V => "SnsrHealthStatus5V",
            StatusFlag::SnsrHealthStatusPhBCurr => "SnsrHealthStatusPhBCurr",
            StatusFlag::SnsrHealthStatusPhCCurr => "SnsrHealthStatusPhCCurr",
            StatusFlag::SnsrHealthStatusThrot1 => "SnsrHealthStatusThrot1",
            StatusFlag::SnsrHealthStatusQep => "SnsrHealthStatusQep",
            StatusFlag::SnsrHealthStatusCtlrTemp1 => "SnsrHealthStatusCtlrTemp1",
            StatusFlag::SnsrHealthStatusMtrTemp => "SnsrHealthStatusMtrTemp",
            StatusFlag::SnsrHealthStatusThrot2 => "SnsrHealthStatusThrot2",
            StatusFlag::SnsrHealthStatusCtlrTemp2 => "SnsrHealthStatusCtlrTemp2",
            StatusFlag::PcModeEnable => "PcModeEnable",
            StatusFlag::StartStop => "StartStop",
            StatusFlag::DcuControlModeStatus => "DcuControlModeStatus",
            StatusFlag::IdleShutdown => "IdleShutdown",
        }
    }

    /// Sensor-health flags are the `SnsrHealthStatus*` family.
    pub fn is_sensor_health(self) -> bool {
        self.wire_name().starts_with(SENSOR_HEALTH_PREFIX)
    }

    /// Sensor name reported in alerts, e.g. `DcBus` for `SnsrHealthStatusDcBus`.
    pub fn sensor_name(self) -> Option<&'static str> {
        let suffix = self.wire_name().strip_prefix(SENSOR_HEALTH_PREFIX)?;
        if suffix.is_empty() {
            Some("General")
        } else {
            Some(suffix)
        }
    }
}

const SENSOR_HEALTH_PREFIX: &str = "SnsrHealthStatus";

/// Every known status flag with its value; flags missing from a frame are `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusFlags(BTreeMap<StatusFlag, bool>);

impl StatusFlags {
    pub fn from_fn(mut value_of: impl FnMut(StatusFlag) -> bool) -> Self {
        Self(StatusFlag::ALL.into_iter().map(|f| (f, value_of(f))).collect())
    }

    pub fn get(&self, flag: StatusFlag) -> bool {
        self.0.get(&flag).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatusFlag, bool)> + '_ {
        StatusFlag::ALL.into_iter().map(|f| (f, self.get(f)))
    }

    /// Sensor-health flags currently reporting a failure.
    pub fn failing_sensors(&self) -> Vec<StatusFlag> {
        self.iter()
            .filter(|(flag, ok)| flag.is_sensor_health() && !ok)
            .map(|(flag, _)| flag)
            .collect()
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::from_fn(|_| false)
    }
}

/// Fault bits carried by firmware revisions that publish a fault group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FaultBit {
    OverCurr,
    DcBusOverVolt,
    DcBusUnderVolt,
    CtlrOverTemp,
    MtrOverTemp,
    ThrotFault,
    QepFault,
    PrechargeFault,
}

impl FaultBit {
    pub const ALL: [FaultBit; 8] = [
        FaultBit::OverCurr,
        FaultBit::DcBusOverVolt,
        FaultBit::DcBusUnderVolt,
        FaultBit::CtlrOverTemp,
        FaultBit::MtrOverTemp,
        FaultBit::ThrotFault,
        FaultBit::QepFault,
        FaultBit::PrechargeFault,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            FaultBit::OverCurr => "OverCurr",
            FaultBit::DcBusOverVolt => "DcBusOverVolt",
            FaultBit::DcBusUnderVolt => "DcBusUnderVolt",
            FaultBit::CtlrOverTemp => "CtlrOverTemp",
            FaultBit::MtrOverTemp => "MtrOverTemp",
            FaultBit::ThrotFault => "ThrotFault",
            FaultBit::QepFault => "QepFault",
            FaultBit::PrechargeFault => "PrechargeFault",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FaultBit::OverCurr => "phase overcurrent",
            FaultBit::DcBusOverVolt => "DC bus overvoltage",
            FaultBit::DcBusUnderVolt => "DC bus undervoltage",
            FaultBit::CtlrOverTemp => "controller overtemperature",
            FaultBit::MtrOverTemp => "motor overtemperature",
            FaultBit::ThrotFault => "throttle signal fault",
            FaultBit::QepFault => "encoder (QEP) fault",
            FaultBit::PrechargeFault => "precharge failure",
        }
    }
}

/// Fault bits present in the frame. Older firmware sends none, so this may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultFlags(BTreeMap<FaultBit, bool>);

impl FaultFlags {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (FaultBit, bool)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn get(&self, bit: FaultBit) -> bool {
        self.0.get(&bit).copied().unwrap_or(false)
    }

    /// Active bits in declaration order.
    pub fn active(&self) -> impl Iterator<Item = FaultBit> + '_ {
        FaultBit::ALL.into_iter().filter(|b| self.get(*b))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Temperatures in °C. `None` means the frame carried no reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    #[serde(rename = "CtlrTemp1")]
    pub controller_1: Option<f64>,
    #[serde(rename = "CtlrTemp2")]
    pub controller_2: Option<f64>,
    #[serde(rename = "CtlrTemp")]
    pub controller_avg: Option<f64>,
    #[serde(rename = "MtrTemp")]
    pub motor: Option<f64>,
}

impl Temperatures {
    /// Hottest of the two controller channels.
    pub fn controller_max(&self) -> Option<f64> {
        match (self.controller_1, self.controller_2) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(rename = "AcCurrMeaRms")]
    pub ac_current_rms: Option<f64>,
    #[serde(rename = "DcCurrEstd")]
    pub dc_current_estimated: Option<f64>,
    #[serde(rename = "DcBusVolt")]
    pub dc_bus_voltage: Option<f64>,
    #[serde(rename = "Mtrspd")]
    pub motor_speed: Option<i64>,
    #[serde(rename = "ThrotVolt")]
    pub throttle_voltage: Option<f64>,
}

/// One decoded snapshot of the vehicle at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub status: StatusFlags,
    pub temperatures: Temperatures,
    pub measurements: Measurements,
    #[serde(default)]
    pub faults: FaultFlags,
}

impl TelemetrySample {
    /// Idle reference values the controller reports right after power-up.
    pub fn baseline(timestamp: DateTime<Utc>) -> Self {
        use StatusFlag::*;

        let status = StatusFlags::from_fn(|flag| match flag {
            EcoPost | Brake | Forward | Neutral | RegeMode | AscMode | PcModeEnable
            | DcuControlModeStatus => true,
            LimpHomeMode | Reverse | HillholdMode | ThrotMode | StartStop | IdleShutdown => false,
            sensor => sensor.is_sensor_health(),
        });

        Self {
            timestamp,
            status,
            temperatures: Temperatures {
                controller_1: Some(45.3),
                controller_2: Some(47.8),
                controller_avg: Some(46.5),
                motor: Some(55.2),
            },
            measurements: Measurements {
                ac_current_rms: Some(65.4),
                dc_current_estimated: Some(40.2),
                dc_bus_voltage: Some(350.7),
                motor_speed: Some(1800),
                throttle_voltage: Some(3.2),
            },
            faults: FaultFlags::default(),
        }
    }
}
