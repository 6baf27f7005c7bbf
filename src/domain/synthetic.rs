// Synthetic sample generation used while the controller link is down
use super::telemetry::{Measurements, StatusFlags, TelemetrySample, Temperatures};
use chrono::{DateTime, Utc};
use rand::Rng;

const TEMPERATURE_RANGE: (f64, f64) = (-40.0, 150.0);
const AC_CURRENT_RANGE: (f64, f64) = (0.0, 400.0);
const DC_CURRENT_RANGE: (f64, f64) = (-200.0, 400.0);
const BUS_VOLTAGE_RANGE: (f64, f64) = (0.0, 800.0);
const THROTTLE_VOLTAGE_RANGE: (f64, f64) = (0.0, 5.0);
const MOTOR_SPEED_RANGE: (i64, i64) = (0, 3000);

/// Random walk one step from `previous`.
///
/// Readings move by at most one unit (throttle 0.1 V, speed 10 rpm), stay in
/// physically plausible bounds and keep one decimal place. Each status flag
/// flips with `flip_probability`. Faults carry over unchanged and missing
/// readings stay missing.
pub fn synthesize<R: Rng>(
    previous: &TelemetrySample,
    timestamp: DateTime<Utc>,
    flip_probability: f64,
    rng: &mut R,
) -> TelemetrySample {
    let flip_probability = if flip_probability.is_finite() {
        flip_probability.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let status = StatusFlags::from_fn(|flag| previous.status.get(flag) ^ rng.gen_bool(flip_probability));

    let t = &previous.temperatures;
    let temperatures = Temperatures {
        controller_1: drift(t.controller_1, 1.0, TEMPERATURE_RANGE, rng),
        controller_2: drift(t.controller_2, 1.0, TEMPERATURE_RANGE, rng),
        controller_avg: drift(t.controller_avg, 1.0, TEMPERATURE_RANGE, rng),
        motor: drift(t.motor, 1.0, TEMPERATURE_RANGE, rng),
    };

    let m = &previous.measurements;
    let measurements = Measurements {
        ac_current_rms: drift(m.ac_current_rms, 1.0, AC_CURRENT_RANGE, rng),
        dc_current_estimated: drift(m.dc_current_estimated, 1.0, DC_CURRENT_RANGE, rng),
        dc_bus_voltage: drift(m.dc_bus_voltage, 1.0, BUS_VOLTAGE_RANGE, rng),
        motor_speed: m.motor_speed.map(|rpm| {
            (rpm + rng.gen_range(-10..=10)).clamp(MOTOR_SPEED_RANGE.0, MOTOR_SPEED_RANGE.1)
        }),
        throttle_voltage: drift(m.throttle_voltage, 0.1, THROTTLE_VOLTAGE_RANGE, rng),
    };

    TelemetrySample {
        timestamp,
        status,
        temperatures,
        measurements,
        faults: previous.faults.clone(),
    }
}

fn drift<R: Rng>(value: Option<f64>, step: f64, (lo, hi): (f64, f64), rng: &mut R) -> Option<f64> {
    let value = value?;
    let next = (value + rng.gen_range(-step..=step)).clamp(lo, hi);
    Some((next * 10.0).round() / 10.0)
}
