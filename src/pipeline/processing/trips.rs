//! Trip Segmenter.
//!
//! Splits each vehicle's cleaned, time-ordered records into contiguous
//! intervals of motion. A trip opens when the speed first rises above the
//! moving threshold, closes when it falls back to it (or the stream ends),
//! and is emitted only when long and far enough to mean anything.

use crate::common::constants::MIN_TRIP_DISTANCE_KM;
use crate::common::geo::{coordinates_valid, haversine_km};
use crate::config::EngineConfig;
use crate::domain::{CanonicalRecord, DistanceSource, Trip};
use crate::observability::metrics;
use tracing::{debug, info};

pub struct TripSegmenter {
    config: EngineConfig,
}

impl TripSegmenter {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Walks the records (already sorted by vehicle and time) and emits the
    /// qualifying trips. A trip still open when its vehicle's records run out
    /// closes at the vehicle's last record.
    pub fn segment(&self, records: &[CanonicalRecord]) -> Vec<Trip> {
        let mut trips = Vec::new();
        let mut discarded = 0usize;
        let mut open: Option<usize> = None;

        for i in 0..records.len() {
            let vehicle_changed =
                i > 0 && records[i - 1].vehicle_id != records[i].vehicle_id;
            if vehicle_changed {
                if let Some(start) = open.take() {
                    self.close_trip(&records[start..i], &mut trips, &mut discarded);
                }
            }

            let moving = records[i].speed > self.config.trip_speed_threshold_kmh;
            match (open, moving) {
                (None, true) => open = Some(i),
                (Some(start), false) => {
                    // The closing record bounds the trip in time even though
                    // it is itself below the moving threshold.
                    self.close_trip(&records[start..=i], &mut trips, &mut discarded);
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            self.close_trip(&records[start..], &mut trips, &mut discarded);
        }

        metrics::trips::trips_emitted(trips.len());
        metrics::trips::trips_discarded(discarded);
        info!(emitted = trips.len(), discarded, "trip segmentation finished");
        trips
    }

    /// Validates a candidate span and emits it when it qualifies.
    fn close_trip(&self, span: &[CanonicalRecord], trips: &mut Vec<Trip>, discarded: &mut usize) {
        let (Some(first), Some(last)) = (span.first(), span.last()) else {
            return;
        };
        let (Some(start_time), Some(end_time)) = (first.timestamp, last.timestamp) else {
            *discarded += 1;
            return;
        };
        let duration_seconds = (end_time - start_time).num_seconds();
        if duration_seconds < self.config.trip_min_duration_s {
            *discarded += 1;
            return;
        }

        let Some((distance_km, distance_source)) = span_distance(span) else {
            *discarded += 1;
            return;
        };
        if distance_km <= MIN_TRIP_DISTANCE_KM {
            *discarded += 1;
            return;
        }

        let moving_speeds: Vec<f64> = span
            .iter()
            .map(|r| r.speed)
            .filter(|&s| s > self.config.trip_speed_threshold_kmh)
            .collect();
        let avg_moving_speed = if moving_speeds.is_empty() {
            0.0
        } else {
            moving_speeds.iter().sum::<f64>() / moving_speeds.len() as f64
        };
        let max_speed = moving_speeds.iter().copied().fold(0.0_f64, f64::max);

        debug!(
            vehicle = %first.vehicle_id,
            %start_time,
            %end_time,
            distance_km,
            "trip emitted"
        );
        trips.push(Trip {
            vehicle_id: first.vehicle_id.clone(),
            start_time,
            end_time,
            duration_seconds,
            distance_km,
            distance_source,
            avg_moving_speed,
            max_speed,
        });
    }
}

/// Trip distance: start/end odometer delta when both sides read and the delta
/// is non-negative, else cumulative haversine over the span's coordinate
/// pairs. Neither computable -> `None`, the trip is discarded.
fn span_distance(span: &[CanonicalRecord]) -> Option<(f64, DistanceSource)> {
    if let (Some(first), Some(last)) = (
        span.first().and_then(|r| r.odometer),
        span.last().and_then(|r| r.odometer),
    ) {
        let delta = last - first;
        if delta >= 0.0 {
            return Some((delta, DistanceSource::Odometer));
        }
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for window in span.windows(2) {
        let (Some((lat1, lon1)), Some((lat2, lon2))) =
            (window[0].coordinates(), window[1].coordinates())
        else {
            continue;
        };
        if coordinates_valid(lat1, lon1) && coordinates_valid(lat2, lon2) {
            total += haversine_km(lat1, lon1, lat2, lon2);
            pairs += 1;
        }
    }
    if pairs > 0 {
        Some((total, DistanceSource::Haversine))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(m: u32, s: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, m, s)
            .unwrap()
    }

    fn record(vehicle: &str, m: u32, speed: f64, odometer: f64) -> CanonicalRecord {
        CanonicalRecord {
            timestamp: Some(ts(m, 0)),
            vehicle_id: vehicle.to_string(),
            speed,
            odometer: Some(odometer),
            ..CanonicalRecord::default()
        }
    }

    fn segmenter() -> TripSegmenter {
        TripSegmenter::new(EngineConfig::default())
    }

    #[test]
    fn motion_between_stops_becomes_one_trip() {
        let records = vec![
            record("V1", 0, 0.0, 1000.0),
            record("V1", 1, 40.0, 1000.5),
            record("V1", 3, 60.0, 1002.0),
            record("V1", 5, 0.0, 1003.0),
            record("V1", 7, 0.0, 1003.0),
        ];
        let trips = segmenter().segment(&records);
        assert_eq!(trips.len(), 1);

        let trip = &trips[0];
        assert_eq!(trip.start_time, ts(1, 0));
        assert_eq!(trip.end_time, ts(5, 0));
        assert_eq!(trip.duration_seconds, 240);
        assert!((trip.distance_km - 2.5).abs() < 1e-9);
        assert_eq!(trip.distance_source, DistanceSource::Odometer);
        assert!((trip.avg_moving_speed - 50.0).abs() < 1e-9);
        assert_eq!(trip.max_speed, 60.0);
    }

    #[test]
    fn short_trips_are_discarded() {
        // 30 seconds of motion, under the minimum duration
        let records = vec![
            CanonicalRecord {
                timestamp: Some(ts(0, 0)),
                vehicle_id: "V1".to_string(),
                speed: 40.0,
                odometer: Some(1000.0),
                ..CanonicalRecord::default()
            },
            CanonicalRecord {
                timestamp: Some(ts(0, 30)),
                vehicle_id: "V1".to_string(),
                speed: 0.0,
                odometer: Some(1000.3),
                ..CanonicalRecord::default()
            },
        ];
        assert!(segmenter().segment(&records).is_empty());
    }

    #[test]
    fn negligible_distance_is_discarded() {
        let records = vec![
            record("V1", 0, 10.0, 1000.0),
            record("V1", 5, 0.0, 1000.05),
        ];
        assert!(segmenter().segment(&records).is_empty());
    }

    #[test]
    fn trailing_open_trip_closes_at_the_last_record() {
        let records = vec![
            record("V1", 0, 50.0, 1000.0),
            record("V1", 2, 55.0, 1002.0),
            record("V1", 4, 52.0, 1004.0),
        ];
        let trips = segmenter().segment(&records);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].end_time, ts(4, 0));
        assert!((trips[0].distance_km - 4.0).abs() < 1e-9);
    }

    #[test]
    fn vehicle_boundary_closes_an_open_trip() {
        let records = vec![
            record("A", 0, 50.0, 100.0),
            record("A", 3, 50.0, 103.0),
            record("B", 0, 0.0, 500.0),
        ];
        let trips = segmenter().segment(&records);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].vehicle_id, "A");
    }

    #[test]
    fn haversine_covers_a_span_without_odometer() {
        let mut a = CanonicalRecord {
            timestamp: Some(ts(0, 0)),
            vehicle_id: "V1".to_string(),
            speed: 50.0,
            ..CanonicalRecord::default()
        };
        a.lat = Some(0.0);
        a.lon = Some(0.0);
        let mut b = a.clone();
        b.timestamp = Some(ts(5, 0));
        b.speed = 0.0;
        b.lat = Some(0.05);

        let trips = segmenter().segment(&[a, b]);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].distance_source, DistanceSource::Haversine);
        assert!(trips[0].distance_km > 5.0);
    }
}
