//! The telemetry engine: one synchronous pass over a raw batch.
//!
//! Stages run strictly left to right — schema detection, column mapping,
//! quality and sanity rules, distance/speed reconciliation, trip
//! segmentation, verification reporting. The engine owns nothing but its
//! configuration; every batch gets fresh state, so independent batches can
//! be processed concurrently from separate engines without shared mutation.

pub mod processing;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::domain::{
    CanonicalField, CanonicalRecord, ColumnMapping, QualityReport, RawBatch, ReconciledMetrics,
    SchemaDescriptor, Trip,
};
use crate::error::{Result, TelemetryError};
use processing::mapper::ColumnMapper;
use processing::quality::QualityEngine;
use processing::reconcile::Reconciler;
use processing::schema::SchemaDetector;
use processing::trips::TripSegmenter;
use processing::verification::{VerificationReport, VerificationReporter};

/// Everything one batch run produced. The only contract downstream
/// consumers (reports, exports, APIs) may depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOutput {
    pub schema: SchemaDescriptor,
    pub mapping: ColumnMapping,
    pub quality_report: QualityReport,
    pub reconciled_metrics: ReconciledMetrics,
    pub trips: Vec<Trip>,
    pub cleaned_records: Vec<CanonicalRecord>,
    pub verification: VerificationReport,
}

pub struct TelemetryEngine {
    config: EngineConfig,
}

impl TelemetryEngine {
    /// Builds an engine around a sanitized configuration. All thresholds are
    /// fixed at construction; nothing is read lazily afterwards.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    /// Runs the full pipeline over one batch. An empty batch is a hard
    /// error; everything past that point degrades gracefully instead of
    /// failing.
    pub fn process_batch(&self, batch: &RawBatch) -> Result<EngineOutput> {
        if batch.is_empty() {
            return Err(TelemetryError::EmptyBatch {
                source_name: batch.source.clone(),
            });
        }
        info!(
            source = %batch.source,
            columns = batch.columns.len(),
            rows = batch.rows.len(),
            "processing batch"
        );

        let schema = SchemaDetector::detect(batch);
        let (records, mapping) = ColumnMapper::map(batch);
        let (cleaned_records, quality_report) =
            QualityEngine::new(self.config.clone()).apply(records);
        let reconciled_metrics = Reconciler::new(self.config.clone()).reconcile(
            &cleaned_records,
            mapping.was_synthesized(CanonicalField::Speed),
        );
        let trips = TripSegmenter::new(self.config.clone()).segment(&cleaned_records);
        let verification = VerificationReporter::build(
            &batch.source,
            batch.rows.len(),
            &cleaned_records,
            &quality_report,
            &mapping,
            trips.len(),
            &self.config,
        );

        info!(
            batch_id = %verification.batch_id,
            rows_kept = verification.rows_kept,
            trips = trips.len(),
            total_km = reconciled_metrics.total_km,
            "batch processed"
        );
        Ok(EngineOutput {
            schema,
            mapping,
            quality_report,
            reconciled_metrics,
            trips,
            cleaned_records,
            verification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(columns: &[&str], rows: &[&[&str]]) -> RawBatch {
        RawBatch {
            source: "unit.csv".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn empty_batch_is_a_hard_error() {
        let engine = TelemetryEngine::new(EngineConfig::default());
        let empty = batch(&["timestamp", "speed"], &[]);
        assert!(matches!(
            engine.process_batch(&empty),
            Err(TelemetryError::EmptyBatch { .. })
        ));
    }

    #[test]
    fn clean_batch_flows_through_every_stage() {
        let engine = TelemetryEngine::new(EngineConfig::default());
        let input = batch(
            &["timestamp", "vehicle_id", "odometer", "speed"],
            &[
                &["2024-03-01 08:00:00", "V1", "1000.0", "0"],
                &["2024-03-01 08:05:00", "V1", "1004.0", "55"],
                &["2024-03-01 08:10:00", "V1", "1009.0", "62"],
                &["2024-03-01 08:15:00", "V1", "1012.0", "0"],
            ],
        );

        let output = engine.process_batch(&input).unwrap();
        assert_eq!(output.cleaned_records.len(), 4);
        assert_eq!(output.verification.rows_kept, 4);
        assert!((output.reconciled_metrics.total_km - 12.0).abs() < 1e-9);
        assert_eq!(output.trips.len(), 1);
        assert!(output.mapping.missing_canonical_fields.contains(&"lat".to_string()));
    }
}
