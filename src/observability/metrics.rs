//! Phase counters for the telemetry pipeline.
//!
//! Thin helpers over the `metrics` facade so stages never deal with metric
//! name strings directly. Recording is a no-op unless the embedding process
//! installs a recorder; the engine itself ships no exporter.

/// Schema detection phase
pub mod schema {
    pub fn columns_classified(count: usize) {
        ::metrics::counter!("telemetry_schema_columns_classified_total").increment(count as u64);
    }

    pub fn columns_unknown(count: usize) {
        ::metrics::counter!("telemetry_schema_columns_unknown_total").increment(count as u64);
    }
}

/// Column mapping phase
pub mod mapper {
    pub fn records_mapped(count: usize) {
        ::metrics::counter!("telemetry_mapper_records_mapped_total").increment(count as u64);
    }

    pub fn fallback_applied() {
        ::metrics::counter!("telemetry_mapper_fallbacks_applied_total").increment(1);
    }
}

/// Quality and sanity phase
pub mod quality {
    pub fn records_removed(count: u64) {
        ::metrics::counter!("telemetry_quality_records_removed_total").increment(count);
    }

    pub fn records_flagged(count: u64) {
        ::metrics::counter!("telemetry_quality_records_flagged_total").increment(count);
    }

    pub fn rule_applied(rule: &str) {
        ::metrics::counter!("telemetry_quality_rule_applied_total", "rule" => rule.to_string())
            .increment(1);
    }
}

/// Distance/speed reconciliation phase
pub mod reconcile {
    pub fn sensor_issue_detected() {
        ::metrics::counter!("telemetry_reconcile_sensor_issues_total").increment(1);
    }

    pub fn batch_reconciled() {
        ::metrics::counter!("telemetry_reconcile_batches_total").increment(1);
    }
}

/// Trip segmentation phase
pub mod trips {
    pub fn trips_emitted(count: usize) {
        ::metrics::counter!("telemetry_trips_emitted_total").increment(count as u64);
    }

    pub fn trips_discarded(count: usize) {
        ::metrics::counter!("telemetry_trips_discarded_total").increment(count as u64);
    }
}
