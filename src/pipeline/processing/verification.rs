//! Verification Reporter.
//!
//! The audit trail for one processed batch: volume counts, what the quality
//! gate did, the column mapping actually used, the thresholds in force, and
//! a content checksum so two runs over the same data can be compared at a
//! glance. Pure aggregation over upstream outputs; it never fails.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{CanonicalRecord, ColumnMapping, QualityReport};

/// Hex characters kept from the SHA-256 digest.
const CHECKSUM_LEN: usize = 16;

/// The thresholds a batch was processed under, echoed verbatim so a report
/// is interpretable without the config file that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedThresholds {
    pub speed_outlier_threshold_kmh: f64,
    pub trip_speed_threshold_kmh: f64,
    pub trip_min_duration_s: i64,
    pub gps_jump_distance_km: f64,
    pub default_consumption_km_per_liter: f64,
}

impl From<&EngineConfig> for AppliedThresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            speed_outlier_threshold_kmh: config.speed_outlier_threshold_kmh,
            trip_speed_threshold_kmh: config.trip_speed_threshold_kmh,
            trip_min_duration_s: config.trip_min_duration_s,
            gps_jump_distance_km: config.gps_jump_distance_km,
            default_consumption_km_per_liter: config.default_consumption_km_per_liter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub batch_id: String,
    pub source: String,
    pub generated_at: NaiveDateTime,
    pub rows_read: u64,
    pub rows_kept: u64,
    pub rows_removed: u64,
    pub quality: QualityReport,
    pub mapping: ColumnMapping,
    pub thresholds: AppliedThresholds,
    pub trip_count: u64,
    pub distinct_vehicles: u64,
    /// Truncated SHA-256 over `distinct_vehicles|rows_kept`
    pub checksum: String,
}

pub struct VerificationReporter;

impl VerificationReporter {
    /// Assembles the report for one batch run.
    pub fn build(
        source: &str,
        rows_read: usize,
        records: &[CanonicalRecord],
        quality: &QualityReport,
        mapping: &ColumnMapping,
        trip_count: usize,
        config: &EngineConfig,
    ) -> VerificationReport {
        let rows_kept = records.len() as u64;
        let distinct_vehicles = records
            .iter()
            .map(|r| r.vehicle_id.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u64;

        VerificationReport {
            batch_id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            generated_at: Utc::now().naive_utc(),
            rows_read: rows_read as u64,
            rows_kept,
            rows_removed: (rows_read as u64).saturating_sub(rows_kept),
            quality: quality.clone(),
            mapping: mapping.clone(),
            thresholds: AppliedThresholds::from(config),
            trip_count: trip_count as u64,
            distinct_vehicles,
            checksum: content_checksum(distinct_vehicles, rows_kept),
        }
    }
}

/// Deterministic per-content fingerprint: same records in, same checksum out,
/// regardless of batch id or wall clock.
fn content_checksum(distinct_vehicles: u64, rows_kept: u64) -> String {
    let digest = Sha256::digest(format!("{distinct_vehicles}|{rows_kept}").as_bytes());
    let mut hexed = hex::encode(digest);
    hexed.truncate(CHECKSUM_LEN);
    hexed
}
