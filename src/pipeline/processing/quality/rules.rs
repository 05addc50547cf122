//! Business rules R1-R6.
//!
//! Each rule inspects one record together with the previous kept record of
//! the same vehicle, in chronological order. Deltas are derived first, then
//! the rules fire in numeric order; R6 decides inclusion last so it sees the
//! effects of everything before it.
//!
//! R1  km_delta == 0 with speed > 0: contradictory unless GPS shows real
//!     displacement, in which case the displacement substitutes for the
//!     missing odometer delta.
//! R2  km_delta > 0 with speed == 0: estimate speed from distance over
//!     elapsed time, accepted only below the outlier threshold.
//! R3  fuel consumed while stationary: kept only when the ignition was on
//!     (idling), otherwise the fuel delta is zeroed.
//! R4  distance without fuel: estimate consumption at the configured
//!     km-per-liter rate.
//! R5  speed above the physical hard limit: truncate and flag.
//! R6  anomalous or negative readings: exclude the record from totals.

use std::collections::HashMap;

use crate::common::constants::{SPEED_HARD_LIMIT_KMH, STATIONARY_KM_EPSILON, IGNITION_ON_TOKENS};
use crate::common::geo::{coordinates_valid, haversine_km};
use crate::config::EngineConfig;
use crate::domain::{CanonicalRecord, QualityReport, RuleCode};
use crate::observability::metrics;
use tracing::debug;

/// What the rule pass needs from the previous same-vehicle record.
#[derive(Clone, Copy)]
struct PrevState {
    timestamp: Option<chrono::NaiveDateTime>,
    odometer: Option<f64>,
    coordinates: Option<(f64, f64)>,
    fuel: Option<f64>,
}

#[derive(Default)]
struct RuleTally {
    r1: u64,
    r1_confirmed: u64,
    r2: u64,
    r3: u64,
    r3_rejected: u64,
    r4: u64,
    r5: u64,
    r6: u64,
    odometer_resets: u64,
}

/// Derives deltas and applies R1-R6 over records already sorted by
/// `(vehicle_id, timestamp)`.
pub fn apply(records: &mut [CanonicalRecord], config: &EngineConfig, report: &mut QualityReport) {
    let mut prev_by_vehicle: HashMap<String, PrevState> = HashMap::new();
    let mut tally = RuleTally::default();

    for record in records.iter_mut() {
        let prev = prev_by_vehicle.get(&record.vehicle_id).copied();
        derive_deltas(record, prev.as_ref(), &mut tally);
        rule_r1(record, prev.as_ref(), &mut tally);
        rule_r2(record, prev.as_ref(), config, &mut tally);
        rule_r3(record, &mut tally);
        rule_r4(record, config, &mut tally);
        rule_r5(record, &mut tally);
        rule_r6(record, report, &mut tally);

        prev_by_vehicle.insert(
            record.vehicle_id.clone(),
            PrevState {
                timestamp: record.timestamp,
                odometer: record.odometer,
                coordinates: record.coordinates().filter(|&(lat, lon)| {
                    coordinates_valid(lat, lon)
                }),
                fuel: record.fuel,
            },
        );
    }

    summarize(&tally, report);
}

/// km_delta and fuel_delta against the previous same-vehicle record. Odometer
/// resets (negative diffs) clamp to zero instead of poisoning the total; the
/// record then falls under R1 when its speed disagrees.
fn derive_deltas(record: &mut CanonicalRecord, prev: Option<&PrevState>, tally: &mut RuleTally) {
    record.km_delta = 0.0;
    record.fuel_delta = 0.0;
    let Some(prev) = prev else { return };

    match (prev.odometer, record.odometer) {
        (Some(o1), Some(o2)) => {
            let diff = o2 - o1;
            if diff >= 0.0 {
                record.km_delta = diff;
            } else {
                tally.odometer_resets += 1;
                debug!(
                    vehicle = %record.vehicle_id,
                    from = o1,
                    to = o2,
                    "odometer reset, delta clamped to zero"
                );
            }
        }
        _ => {
            if let (Some((lat1, lon1)), Some((lat2, lon2))) = (prev.coordinates, record.coordinates())
            {
                if coordinates_valid(lat2, lon2) {
                    record.km_delta = haversine_km(lat1, lon1, lat2, lon2);
                }
            }
        }
    }

    if let (Some(f1), Some(f2)) = (prev.fuel, record.fuel) {
        record.fuel_delta = (f2 - f1).max(0.0);
    }
}

/// R1: no odometer movement but a positive speed reading. GPS displacement
/// above the stationary epsilon corroborates the speed sensor; the
/// displacement becomes the km_delta and the record stays usable, marked
/// estimated. Without corroboration the record is anomalous.
fn rule_r1(record: &mut CanonicalRecord, prev: Option<&PrevState>, tally: &mut RuleTally) {
    if record.km_delta != 0.0 || record.speed <= 0.0 {
        return;
    }

    let displacement = prev
        .and_then(|p| p.coordinates)
        .zip(record.coordinates())
        .filter(|&(_, (lat, lon))| coordinates_valid(lat, lon))
        .map(|((lat1, lon1), (lat2, lon2))| haversine_km(lat1, lon1, lat2, lon2));

    match displacement {
        Some(km) if km > STATIONARY_KM_EPSILON => {
            record.km_delta = km;
            record.estimated_flag = true;
            tally.r1_confirmed += 1;
        }
        _ => {
            record.apply_rule(RuleCode::R1);
            record.anomaly_flag = true;
            tally.r1 += 1;
            metrics::quality::rule_applied("R1");
        }
    }
}

/// R2: movement with a zero speed reading. The distance-over-time estimate
/// replaces the reading only when it stays below the outlier threshold.
fn rule_r2(
    record: &mut CanonicalRecord,
    prev: Option<&PrevState>,
    config: &EngineConfig,
    tally: &mut RuleTally,
) {
    if record.km_delta <= 0.0 || record.speed != 0.0 {
        return;
    }
    let Some((t1, t2)) = prev.and_then(|p| p.timestamp).zip(record.timestamp) else {
        return;
    };
    let hours = (t2 - t1).num_seconds() as f64 / 3600.0;
    if hours <= 0.0 {
        return;
    }
    let estimate = record.km_delta / hours;
    if estimate <= config.speed_outlier_threshold_kmh {
        record.speed = estimate;
        record.estimated_flag = true;
        record.apply_rule(RuleCode::R2);
        tally.r2 += 1;
        metrics::quality::rule_applied("R2");
    }
}

/// R3: fuel consumed without movement. Plausible while idling with the
/// ignition on; otherwise the reading is rejected and the delta zeroed.
fn rule_r3(record: &mut CanonicalRecord, tally: &mut RuleTally) {
    if record.fuel_delta <= 0.0 || record.km_delta > STATIONARY_KM_EPSILON {
        return;
    }
    let ignition_on = record
        .ignition
        .as_deref()
        .map(|token| {
            let token = token.trim().to_lowercase();
            IGNITION_ON_TOKENS.contains(&token.as_str())
        })
        .unwrap_or(false);

    if ignition_on {
        record.apply_rule(RuleCode::R3);
        tally.r3 += 1;
        metrics::quality::rule_applied("R3");
    } else {
        record.fuel_delta = 0.0;
        tally.r3_rejected += 1;
    }
}

/// R4: distance covered with no fuel reading change. Consumption is
/// estimated at the configured average rate.
fn rule_r4(record: &mut CanonicalRecord, config: &EngineConfig, tally: &mut RuleTally) {
    if record.fuel_delta != 0.0 || record.km_delta <= 0.0 {
        return;
    }
    record.fuel_delta = record.km_delta / config.default_consumption_km_per_liter;
    record.estimated_flag = true;
    record.apply_rule(RuleCode::R4);
    tally.r4 += 1;
    metrics::quality::rule_applied("R4");
}

/// R5: physically impossible speed. Truncated to the hard limit and marked
/// anomalous regardless of source.
fn rule_r5(record: &mut CanonicalRecord, tally: &mut RuleTally) {
    if record.speed <= SPEED_HARD_LIMIT_KMH {
        return;
    }
    record.speed = SPEED_HARD_LIMIT_KMH;
    record.anomaly_flag = true;
    record.apply_rule(RuleCode::R5);
    tally.r5 += 1;
    metrics::quality::rule_applied("R5");
}

/// R6: the exclusion gate. Anomalous records and negative readings stay in
/// the output for inspection but never count toward totals.
fn rule_r6(record: &mut CanonicalRecord, report: &mut QualityReport, tally: &mut RuleTally) {
    let negative_reading = record.speed < 0.0 || record.fuel.is_some_and(|f| f < 0.0);
    if record.anomaly_flag || negative_reading {
        record.include_in_totals = false;
        record.apply_rule(RuleCode::R6);
        report.inconsistent_excluded += 1;
        tally.r6 += 1;
        metrics::quality::rule_applied("R6");
    } else {
        record.include_in_totals = true;
    }
}

fn summarize(tally: &RuleTally, report: &mut QualityReport) {
    let mut push = |count: u64, text: String| {
        if count > 0 {
            report.anomalies.push(text);
        }
    };
    push(
        tally.r1,
        format!("R1: {} records with zero km delta and positive speed", tally.r1),
    );
    push(
        tally.r1_confirmed,
        format!(
            "R1: {} zero-odometer records confirmed moving by GPS",
            tally.r1_confirmed
        ),
    );
    push(
        tally.r2,
        format!("R2: {} speeds estimated from distance over time", tally.r2),
    );
    push(
        tally.r3,
        format!("R3: {} idle fuel consumptions accepted", tally.r3),
    );
    push(
        tally.r3_rejected,
        format!(
            "R3: {} stationary fuel readings rejected (ignition off)",
            tally.r3_rejected
        ),
    );
    push(
        tally.r4,
        format!("R4: {} fuel consumptions estimated from distance", tally.r4),
    );
    push(
        tally.r5,
        format!("R5: {} speeds truncated at the hard limit", tally.r5),
    );
    push(
        tally.r6,
        format!("R6: {} inconsistent records excluded from totals", tally.r6),
    );
    push(
        tally.odometer_resets,
        format!("{} odometer resets clamped to zero delta", tally.odometer_resets),
    );
}
