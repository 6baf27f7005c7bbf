// Wire frame decoding - normalizes every known firmware schema into TelemetrySample
use crate::domain::telemetry::{
    FaultBit, FaultFlags, Measurements, StatusFlags, TelemetrySample, Temperatures,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

type Object = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame carries no telemetry group")]
    NoRecognizedGroups,
    #[error("non-finite reading for {field}")]
    NonFinite { field: &'static str },
}

/// Logical groups of a frame, each published under its own CAN id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Status,
    Temperature,
    Measurement,
    Fault,
}

impl Group {
    const ALL: [Group; 4] = [Group::Status, Group::Temperature, Group::Measurement, Group::Fault];

    fn symbolic_key(self) -> &'static str {
        match self {
            Group::Status => "status615",
            Group::Temperature => "temp616",
            Group::Measurement => "measurement617",
            Group::Fault => "fault618",
        }
    }

    fn code(self) -> u16 {
        match self {
            Group::Status => 0x615,
            Group::Temperature => 0x616,
            Group::Measurement => 0x617,
            Group::Fault => 0x618,
        }
    }
}

/// How a frame names its groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSchema {
    /// `status615`, `temp616`, ...
    Symbolic,
    /// `0x615`, `0x616`, ... (prefix optional, any case)
    NumericCode,
}

impl FrameSchema {
    fn detect(frame: &Object) -> Option<Self> {
        if Group::ALL.iter().any(|g| frame.contains_key(g.symbolic_key())) {
            Some(FrameSchema::Symbolic)
        } else if Group::ALL.iter().any(|g| find_by_code(frame, g.code()).is_some()) {
            Some(FrameSchema::NumericCode)
        } else {
            None
        }
    }

    /// Group lookup: this schema's key first, the other schema's key second.
    fn group<'a>(self, frame: &'a Object, group: Group) -> Option<&'a Object> {
        let symbolic = || frame.get(group.symbolic_key()).and_then(Value::as_object);
        let numeric = || find_by_code(frame, group.code()).and_then(Value::as_object);
        match self {
            FrameSchema::Symbolic => symbolic().or_else(numeric),
            FrameSchema::NumericCode => numeric().or_else(symbolic),
        }
    }
}

fn find_by_code(frame: &Object, code: u16) -> Option<&Value> {
    frame
        .iter()
        .find(|(key, _)| parse_code(key) == Some(code))
        .map(|(_, value)| value)
}

fn parse_code(key: &str) -> Option<u16> {
    let hex = key
        .strip_prefix("0x")
        .or_else(|| key.strip_prefix("0X"))
        .unwrap_or(key);
    u16::from_str_radix(hex, 16).ok()
}

/// The four groups of one frame after schema normalization.
struct NormalizedFrame<'a> {
    status: Option<&'a Object>,
    temperature: Option<&'a Object>,
    measurement: Option<&'a Object>,
    fault: Option<&'a Object>,
}

impl<'a> NormalizedFrame<'a> {
    fn new(frame: &'a Object, schema: FrameSchema) -> Self {
        Self {
            status: schema.group(frame, Group::Status),
            temperature: schema.group(frame, Group::Temperature),
            measurement: schema.group(frame, Group::Measurement),
            fault: schema.group(frame, Group::Fault),
        }
    }

    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.temperature.is_none()
            && self.measurement.is_none()
            && self.fault.is_none()
    }
}

/// How far a frame's own clock may run ahead of the receive instant.
const MAX_CLOCK_LEAD_SECS: i64 = 300;

/// Decode one raw frame.
///
/// `received_at` stands in for frames without a usable `timestamp`, so the
/// same bytes and instant always decode to the same sample. A timestamp more
/// than five minutes ahead of `received_at` is not usable.
pub fn decode_frame(raw: &[u8], received_at: DateTime<Utc>) -> Result<TelemetrySample, DecodeError> {
    let value: Value = serde_json::from_slice(raw)?;
    let frame = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let schema = FrameSchema::detect(frame).ok_or(DecodeError::NoRecognizedGroups)?;
    let groups = NormalizedFrame::new(frame, schema);
    if groups.is_empty() {
        return Err(DecodeError::NoRecognizedGroups);
    }

    let latest_accepted = received_at + TimeDelta::seconds(MAX_CLOCK_LEAD_SECS);
    let timestamp = frame
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| *t <= latest_accepted)
        .unwrap_or(received_at);

    let status = match groups.status {
        Some(group) => StatusFlags::from_fn(|flag| group.get(flag.wire_name()).is_some_and(as_flag)),
        None => StatusFlags::default(),
    };

    let temperatures = match groups.temperature {
        Some(group) => Temperatures {
            controller_1: reading(group, "CtlrTemp1")?,
            controller_2: reading(group, "CtlrTemp2")?,
            controller_avg: reading(group, "CtlrTemp")?,
            motor: reading(group, "MtrTemp")?,
        },
        None => Temperatures::default(),
    };

    let measurements = match groups.measurement {
        Some(group) => Measurements {
            ac_current_rms: reading(group, "AcCurrMeaRms")?,
            dc_current_estimated: reading(group, "DcCurrEstd")?,
            dc_bus_voltage: reading(group, "DcBusVolt")?,
            motor_speed: reading(group, "Mtrspd")?.map(|rpm| rpm.round() as i64),
            throttle_voltage: reading(group, "ThrotVolt")?,
        },
        None => Measurements::default(),
    };

    let faults = match groups.fault {
        Some(group) => FaultFlags::from_pairs(
            FaultBit::ALL
                .into_iter()
                .filter_map(|bit| group.get(bit.wire_name()).map(|v| (bit, as_flag(v)))),
        ),
        None => FaultFlags::default(),
    };

    Ok(TelemetrySample {
        timestamp,
        status,
        temperatures,
        measurements,
        faults,
    })
}

/// Numeric reading; unparseable values become 0.0, non-finite ones reject the frame.
fn reading(group: &Object, field: &'static str) -> Result<Option<f64>, DecodeError> {
    let Some(value) = group.get(field) else {
        return Ok(None);
    };
    let number = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if !number.is_finite() {
        return Err(DecodeError::NonFinite { field });
    }
    Ok(Some(number))
}

fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::StatusFlag;

    const SYMBOLIC: &str = r#"{
        "timestamp": "2026-06-21T10:15:00.000Z",
        "status615": { "LimpHomeMode": false, "RegeMode": true, "SnsrHealthStatus12V": true, "Unknown": true },
        "temp616": { "CtlrTemp1": 45.3, "CtlrTemp2": "47.8", "CtlrTemp": 46.5, "MtrTemp": 55.2 },
        "measurement617": { "AcCurrMeaRms": 65.4, "DcCurrEstd": 40.2, "DcBusVolt": 350.7, "Mtrspd": 1800, "ThrotVolt": 3.2 }
    }"#;

    const NUMERIC: &str = r#"{
        "timestamp": "2026-06-21T10:15:00.000Z",
        "0x615": { "LimpHomeMode": 0, "RegeMode": 1, "SnsrHealthStatus12V": "true" },
        "0X616": { "CtlrTemp1": "45.3", "CtlrTemp2": 47.8, "CtlrTemp": 46.5, "MtrTemp": 55.2 },
        "617": { "AcCurrMeaRms": 65.4, "DcCurrEstd": 40.2, "DcBusVolt": 350.7, "Mtrspd": 1800.2, "ThrotVolt": 3.2 }
    }"#;

    fn received() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-21T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_decode_symbolic_frame() {
        let sample = decode_frame(SYMBOLIC.as_bytes(), received()).unwrap();
        assert_eq!(sample.timestamp.to_rfc3339(), "2026-06-21T10:15:00+00:00");
        assert!(sample.status.get(StatusFlag::RegeMode));
        assert!(!sample.status.get(StatusFlag::AscMode));
        assert_eq!(sample.temperatures.controller_2, Some(47.8));
        assert_eq!(sample.measurements.motor_speed, Some(1800));
        assert!(sample.faults.is_empty());
    }

    #[test]
    fn test_both_schemas_normalize_identically() {
        let symbolic = decode_frame(SYMBOLIC.as_bytes(), received()).unwrap();
        let numeric = decode_frame(NUMERIC.as_bytes(), received()).unwrap();
        assert_eq!(symbolic, numeric);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let raw = br#"{"temp616": {"MtrTemp": 61.0}}"#;
        let first = decode_frame(raw, received()).unwrap();
        let second = decode_frame(raw, received()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.timestamp, received());
    }

    #[test]
    fn test_partial_frame_defaults() {
        let raw = br#"{"measurement617": {"DcBusVolt": 460}}"#;
        let sample = decode_frame(raw, received()).unwrap();
        assert_eq!(sample.measurements.dc_bus_voltage, Some(460.0));
        assert_eq!(sample.measurements.ac_current_rms, None);
        assert_eq!(sample.temperatures, Temperatures::default());
        assert!(StatusFlag::ALL.iter().all(|f| !sample.status.get(*f)));
    }

    #[test]
    fn test_unparseable_number_falls_back_to_zero() {
        let raw = br#"{"temp616": {"MtrTemp": "hot", "CtlrTemp1": null}}"#;
        let sample = decode_frame(raw, received()).unwrap();
        assert_eq!(sample.temperatures.motor, Some(0.0));
        assert_eq!(sample.temperatures.controller_1, Some(0.0));
    }

    #[test]
    fn test_non_finite_reading_rejects_frame() {
        let raw = br#"{"temp616": {"MtrTemp": "NaN"}}"#;
        let err = decode_frame(raw, received()).unwrap_err();
        assert!(matches!(err, DecodeError::NonFinite { field: "MtrTemp" }));

        let raw = br#"{"measurement617": {"DcBusVolt": "inf"}}"#;
        assert!(decode_frame(raw, received()).is_err());
    }

    #[test]
    fn test_fault_group_keeps_only_known_bits() {
        let raw = br#"{"0x618": {"OverCurr": true, "QepFault": false, "Mystery": true}}"#;
        let sample = decode_frame(raw, received()).unwrap();
        assert!(sample.faults.get(FaultBit::OverCurr));
        assert!(!sample.faults.get(FaultBit::QepFault));
        assert_eq!(sample.faults.active().count(), 1);
    }

    #[test]
    fn test_garbage_frames_are_rejected() {
        assert!(matches!(
            decode_frame(b"{not json", received()),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_frame(b"[1, 2, 3]", received()),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            decode_frame(br#"{"hello": "world"}"#, received()),
            Err(DecodeError::NoRecognizedGroups)
        ));
        // A recognized key holding something other than an object carries no group.
        assert!(matches!(
            decode_frame(br#"{"status615": 5}"#, received()),
            Err(DecodeError::NoRecognizedGroups)
        ));
    }

    #[test]
    fn test_invalid_timestamp_uses_receive_instant() {
        let raw = br#"{"timestamp": "yesterday", "temp616": {"MtrTemp": 50}}"#;
        let sample = decode_frame(raw, received()).unwrap();
        assert_eq!(sample.timestamp, received());
    }

    #[test]
    fn test_far_future_timestamp_uses_receive_instant() {
        let raw = br#"{"timestamp": "9999-12-31T23:59:59Z", "temp616": {"MtrTemp": 50}}"#;
        assert_eq!(decode_frame(raw, received()).unwrap().timestamp, received());

        let slightly_ahead = br#"{"timestamp": "2026-06-21T12:02:00Z", "temp616": {"MtrTemp": 50}}"#;
        assert_eq!(
            decode_frame(slightly_ahead, received()).unwrap().timestamp.to_rfc3339(),
            "2026-06-21T12:02:00+00:00"
        );
    }

    #[test]
    fn test_non_object_group_falls_back_to_other_schema_key() {
        let raw = br#"{"temp616": "n/a", "0x616": {"MtrTemp": 61.5}, "status615": {"RegeMode": true}}"#;
        let sample = decode_frame(raw, received()).unwrap();
        assert_eq!(sample.temperatures.motor, Some(61.5));
        assert!(sample.status.get(StatusFlag::RegeMode));
    }
}
