//! Quality & Sanity Engine: removes or flags implausible records and builds
//! the batch quality report.
//!
//! Processing order is fixed: coordinate validity, temporal dedup, GPS-jump
//! detection, speed-outlier flagging, then the business rules R1-R6. Every
//! per-vehicle comparison relies on `(vehicle_id, timestamp)` ordering, so
//! the sort is enforced here rather than left to the caller.

pub mod rules;

use crate::common::constants::GPS_JUMP_MAX_HOURS;
use crate::common::geo::{coordinates_valid, haversine_km};
use crate::config::EngineConfig;
use crate::domain::{CanonicalRecord, QualityReport};
use crate::observability::metrics;
use tracing::info;

pub struct QualityEngine {
    config: EngineConfig,
}

impl QualityEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Runs the full quality pass, consuming the mapped records and
    /// returning the cleaned, annotated sequence plus the report.
    pub fn apply(&self, records: Vec<CanonicalRecord>) -> (Vec<CanonicalRecord>, QualityReport) {
        let mut report = QualityReport::default();
        let initial = records.len();

        let mut kept = self.drop_invalid_coordinates(records, &mut report);
        Self::sort_by_vehicle_and_time(&mut kept);
        kept = Self::drop_duplicate_timestamps(kept, &mut report);
        self.mark_gps_jumps(&mut kept, &mut report);
        self.mark_speed_outliers(&mut kept, &mut report);
        rules::apply(&mut kept, &self.config, &mut report);

        report.anomalies.push(format!(
            "quality pass: {} rows in, {} kept, {} removed",
            initial,
            kept.len(),
            initial - kept.len()
        ));

        metrics::quality::records_removed(report.outliers_removed + report.duplicates_removed);
        metrics::quality::records_flagged(
            report.gps_jumps_marked + report.speed_outliers_marked,
        );
        info!(
            rows_in = initial,
            rows_kept = kept.len(),
            outliers = report.outliers_removed,
            duplicates = report.duplicates_removed,
            gps_jumps = report.gps_jumps_marked,
            speed_outliers = report.speed_outliers_marked,
            excluded = report.inconsistent_excluded,
            "quality pass finished"
        );

        (kept, report)
    }

    /// Step 1: records with coordinates outside the WGS84 range are dropped.
    /// Records without coordinates pass through untouched.
    fn drop_invalid_coordinates(
        &self,
        records: Vec<CanonicalRecord>,
        report: &mut QualityReport,
    ) -> Vec<CanonicalRecord> {
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            match record.coordinates() {
                Some((lat, lon)) if !coordinates_valid(lat, lon) => {
                    report.outliers_removed += 1;
                }
                _ => kept.push(record),
            }
        }
        kept
    }

    /// Step 2a: the `(vehicle_id, timestamp)` ordering every sequential scan
    /// depends on. Records without a timestamp sort first within their
    /// vehicle group; the sort is stable so their relative order survives.
    fn sort_by_vehicle_and_time(records: &mut [CanonicalRecord]) {
        records.sort_by(|a, b| {
            a.vehicle_id
                .cmp(&b.vehicle_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });
    }

    /// Step 2b: within a vehicle, a record whose timestamp exactly repeats
    /// the prior kept record's timestamp is dropped.
    fn drop_duplicate_timestamps(
        records: Vec<CanonicalRecord>,
        report: &mut QualityReport,
    ) -> Vec<CanonicalRecord> {
        let mut kept: Vec<CanonicalRecord> = Vec::with_capacity(records.len());
        for record in records {
            let duplicate = kept.last().is_some_and(|prev: &CanonicalRecord| {
                prev.vehicle_id == record.vehicle_id
                    && prev.timestamp.is_some()
                    && prev.timestamp == record.timestamp
            });
            if duplicate {
                report.duplicates_removed += 1;
            } else {
                kept.push(record);
            }
        }
        kept
    }

    /// Step 3: consecutive same-vehicle fixes farther apart than the jump
    /// threshold within an hour get flagged, never removed.
    fn mark_gps_jumps(&self, records: &mut [CanonicalRecord], report: &mut QualityReport) {
        for i in 1..records.len() {
            if records[i - 1].vehicle_id != records[i].vehicle_id {
                continue;
            }
            let (prev_coords, prev_ts) = (records[i - 1].coordinates(), records[i - 1].timestamp);
            let (cur_coords, cur_ts) = (records[i].coordinates(), records[i].timestamp);
            let (Some((lat1, lon1)), Some((lat2, lon2)), Some(t1), Some(t2)) =
                (prev_coords, cur_coords, prev_ts, cur_ts)
            else {
                continue;
            };
            let distance = haversine_km(lat1, lon1, lat2, lon2);
            let hours = (t2 - t1).num_seconds() as f64 / 3600.0;
            if distance > self.config.gps_jump_distance_km && hours < GPS_JUMP_MAX_HOURS {
                records[i].gps_jump = true;
                report.gps_jumps_marked += 1;
                report.anomalies.push(format!(
                    "gps jump: vehicle '{}' moved {:.1} km in {:.2} h at {}",
                    records[i].vehicle_id, distance, hours, t2
                ));
            }
        }
    }

    /// Step 4: speeds above the outlier threshold are flagged, never removed.
    fn mark_speed_outliers(&self, records: &mut [CanonicalRecord], report: &mut QualityReport) {
        for record in records.iter_mut() {
            if record.speed > self.config.speed_outlier_threshold_kmh {
                record.speed_outlier = true;
                report.speed_outliers_marked += 1;
            }
        }
    }
}
