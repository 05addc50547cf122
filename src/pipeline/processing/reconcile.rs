//! Distance/Speed Reconciler.
//!
//! Arbitrates between the odometer and GPS for the authoritative distance,
//! and resolves the classic sensor contradiction of a vehicle that covered
//! hundreds of kilometers while its speed sensor never left zero. Only
//! records that survived the quality gate with `include_in_totals` feed the
//! figures here.

use crate::common::constants::{MIN_PLAUSIBLE_ESTIMATE_KMH, SENSOR_CONTRADICTION_MIN_KM};
use crate::common::geo::{coordinates_valid, haversine_km};
use crate::config::EngineConfig;
use crate::domain::{CanonicalRecord, DistanceSource, ReconciledMetrics, SpeedSource};
use crate::observability::metrics;
use tracing::{info, warn};

pub struct Reconciler {
    config: EngineConfig,
}

impl Reconciler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Computes batch-level distance and speed figures. `speed_synthesized`
    /// records whether the speed column itself was a mapper fallback, which
    /// downgrades the speed source even when no contradiction shows up.
    pub fn reconcile(
        &self,
        records: &[CanonicalRecord],
        speed_synthesized: bool,
    ) -> ReconciledMetrics {
        let included: Vec<&CanonicalRecord> =
            records.iter().filter(|r| r.include_in_totals).collect();

        let (total_km_odometer, odometer_readings) = odometer_span(&included);
        let (total_km_haversine, coordinate_pairs) = haversine_total(&included);

        let (total_km, distance_source) = if odometer_readings >= 2 {
            (total_km_odometer, DistanceSource::Odometer)
        } else if coordinate_pairs >= 1 {
            (total_km_haversine, DistanceSource::Haversine)
        } else {
            (0.0, DistanceSource::Unknown)
        };

        let max_speed_raw = included
            .iter()
            .map(|r| r.speed)
            .filter(|&s| s <= self.config.speed_outlier_threshold_kmh)
            .fold(0.0_f64, f64::max);

        let mut reconciled = ReconciledMetrics {
            total_km,
            total_km_odometer,
            total_km_haversine,
            distance_source,
            max_speed: max_speed_raw,
            max_speed_raw,
            speed_source: if speed_synthesized {
                SpeedSource::InstantSpeed
            } else {
                SpeedSource::RawSpeed
            },
            sensor_issue: false,
        };

        // A dead speed sensor over a real distance must be resolved, not
        // reported as "the fleet never moved".
        if max_speed_raw == 0.0 && total_km >= SENSOR_CONTRADICTION_MIN_KM {
            self.resolve_contradiction(&included, &mut reconciled);
        }

        metrics::reconcile::batch_reconciled();
        info!(
            total_km = reconciled.total_km,
            distance_source = ?reconciled.distance_source,
            max_speed = reconciled.max_speed,
            speed_source = ?reconciled.speed_source,
            sensor_issue = reconciled.sensor_issue,
            "batch reconciled"
        );
        reconciled
    }

    /// Zero speed over a significant distance: rebuild a maximum from
    /// instantaneous GPS speeds, falling back to the total distance as a
    /// stand-in upper bound when even those are implausible.
    fn resolve_contradiction(
        &self,
        included: &[&CanonicalRecord],
        reconciled: &mut ReconciledMetrics,
    ) {
        let estimate = percentile(&instantaneous_speeds(included), 0.95);
        if estimate >= MIN_PLAUSIBLE_ESTIMATE_KMH {
            reconciled.max_speed = estimate;
            reconciled.speed_source = SpeedSource::InstantSpeed;
            warn!(
                estimate,
                total_km = reconciled.total_km,
                "zero raw max speed contradicts distance; using GPS instantaneous estimate"
            );
        } else {
            reconciled.max_speed = reconciled.total_km;
            reconciled.speed_source = SpeedSource::OdometerBased;
            reconciled.sensor_issue = true;
            metrics::reconcile::sensor_issue_detected();
            warn!(
                total_km = reconciled.total_km,
                "speed sensor issue: no plausible GPS estimate, distance used as upper bound"
            );
        }
    }
}

/// Odometer span across the batch: `max - min` over valid readings, with the
/// reading count so the caller can tell "one reading" from "none".
fn odometer_span(included: &[&CanonicalRecord]) -> (f64, usize) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut count = 0usize;
    for record in included {
        if let Some(odo) = record.odometer {
            min = min.min(odo);
            max = max.max(odo);
            count += 1;
        }
    }
    if count >= 2 {
        ((max - min).max(0.0), count)
    } else {
        (0.0, count)
    }
}

/// Cumulative great-circle distance over consecutive same-vehicle coordinate
/// pairs, with the pair count.
fn haversine_total(included: &[&CanonicalRecord]) -> (f64, usize) {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for window in included.windows(2) {
        let (prev, cur) = (window[0], window[1]);
        if prev.vehicle_id != cur.vehicle_id {
            continue;
        }
        let (Some((lat1, lon1)), Some((lat2, lon2))) = (prev.coordinates(), cur.coordinates())
        else {
            continue;
        };
        if coordinates_valid(lat1, lon1) && coordinates_valid(lat2, lon2) {
            total += haversine_km(lat1, lon1, lat2, lon2);
            pairs += 1;
        }
    }
    (total, pairs)
}

/// Distance-over-time speeds between consecutive same-vehicle GPS fixes.
fn instantaneous_speeds(included: &[&CanonicalRecord]) -> Vec<f64> {
    let mut speeds = Vec::new();
    for window in included.windows(2) {
        let (prev, cur) = (window[0], window[1]);
        if prev.vehicle_id != cur.vehicle_id {
            continue;
        }
        let (Some((lat1, lon1)), Some((lat2, lon2)), Some(t1), Some(t2)) =
            (prev.coordinates(), cur.coordinates(), prev.timestamp, cur.timestamp)
        else {
            continue;
        };
        if !coordinates_valid(lat1, lon1) || !coordinates_valid(lat2, lon2) {
            continue;
        }
        let hours = (t2 - t1).num_seconds() as f64 / 3600.0;
        if hours > 0.0 {
            speeds.push(haversine_km(lat1, lon1, lat2, lon2) / hours);
        }
    }
    speeds
}

/// Linear-interpolation percentile over an unsorted sample. Empty -> 0.
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(m: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, m, 0)
            .unwrap()
    }

    fn record(m: u32) -> CanonicalRecord {
        CanonicalRecord {
            timestamp: Some(ts(m)),
            vehicle_id: "V1".to_string(),
            ..CanonicalRecord::default()
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(EngineConfig::default())
    }

    #[test]
    fn odometer_span_wins_over_haversine() {
        let mut a = record(0);
        a.odometer = Some(1000.0);
        a.speed = 60.0;
        let mut b = record(30);
        b.odometer = Some(1045.0);
        b.speed = 80.0;

        let metrics = reconciler().reconcile(&[a, b], false);
        assert_eq!(metrics.distance_source, DistanceSource::Odometer);
        assert!((metrics.total_km - 45.0).abs() < 1e-9);
        assert_eq!(metrics.max_speed, 80.0);
        assert_eq!(metrics.speed_source, SpeedSource::RawSpeed);
        assert!(!metrics.sensor_issue);
    }

    #[test]
    fn haversine_fallback_without_odometer() {
        let mut a = record(0);
        a.lat = Some(0.0);
        a.lon = Some(0.0);
        a.speed = 40.0;
        let mut b = record(30);
        b.lat = Some(0.2);
        b.lon = Some(0.0);
        b.speed = 40.0;

        let metrics = reconciler().reconcile(&[a, b], false);
        assert_eq!(metrics.distance_source, DistanceSource::Haversine);
        assert!(metrics.total_km > 20.0 && metrics.total_km < 25.0);
    }

    #[test]
    fn no_usable_signal_yields_unknown() {
        let metrics = reconciler().reconcile(&[record(0), record(1)], false);
        assert_eq!(metrics.distance_source, DistanceSource::Unknown);
        assert_eq!(metrics.total_km, 0.0);
    }

    #[test]
    fn excluded_records_do_not_feed_totals() {
        let mut a = record(0);
        a.odometer = Some(1000.0);
        let mut b = record(10);
        b.odometer = Some(1500.0);
        b.include_in_totals = false;
        let mut c = record(20);
        c.odometer = Some(1010.0);

        let metrics = reconciler().reconcile(&[a, b, c], false);
        assert!((metrics.total_km - 10.0).abs() < 1e-9);
    }

    #[test]
    fn dead_speed_sensor_recovers_via_gps_estimate() {
        // ~22 km in 30 minutes with speed stuck at zero
        let mut records = Vec::new();
        for (i, lat) in [0.0_f64, 0.1, 0.2].iter().enumerate() {
            let mut r = record(i as u32 * 15);
            r.odometer = Some(1000.0 + i as f64 * 11.0);
            r.lat = Some(*lat);
            r.lon = Some(0.0);
            records.push(r);
        }

        let metrics = reconciler().reconcile(&records, false);
        assert_eq!(metrics.max_speed_raw, 0.0);
        assert!(metrics.max_speed > 40.0);
        assert_eq!(metrics.speed_source, SpeedSource::InstantSpeed);
        assert!(!metrics.sensor_issue);
    }

    #[test]
    fn implausible_estimate_falls_back_to_distance_bound() {
        // 25 km on the odometer but GPS barely moves: estimate under 5 km/h
        let mut a = record(0);
        a.odometer = Some(1000.0);
        a.lat = Some(0.0);
        a.lon = Some(0.0);
        let mut b = record(30);
        b.odometer = Some(1025.0);
        b.lat = Some(0.001);
        b.lon = Some(0.0);

        let metrics = reconciler().reconcile(&[a, b], false);
        assert!(metrics.sensor_issue);
        assert_eq!(metrics.speed_source, SpeedSource::OdometerBased);
        assert!((metrics.max_speed - metrics.total_km).abs() < 1e-9);
    }

    #[test]
    fn outlier_speeds_do_not_set_the_raw_maximum() {
        let mut a = record(0);
        a.odometer = Some(0.0);
        a.speed = 300.0;
        let mut b = record(10);
        b.odometer = Some(5.0);
        b.speed = 90.0;

        let metrics = reconciler().reconcile(&[a, b], false);
        assert_eq!(metrics.max_speed_raw, 90.0);
    }

    #[test]
    fn synthesized_speed_column_downgrades_the_source() {
        let mut a = record(0);
        a.speed = 30.0;
        let metrics = reconciler().reconcile(&[a], true);
        assert_eq!(metrics.speed_source, SpeedSource::InstantSpeed);
    }
}
