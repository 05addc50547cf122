//! Schema Detector: assigns a semantic type to every column of a raw batch.
//!
//! Column names are matched against a fixed alias table first; columns that
//! miss the table fall through to value-based heuristics on a small sample.
//! Detection is read-only and infallible: anything unclassifiable resolves
//! to `unknown` rather than failing the batch.

use crate::common::constants::{BOOLEAN_TOKENS, NUMERIC_SAMPLE_RATIO, SCHEMA_SAMPLE_SIZE};
use crate::common::time::{parse_number, parse_timestamp};
use crate::domain::{ColumnDescriptor, RawBatch, SchemaDescriptor, SemanticType};
use crate::observability::metrics;
use tracing::debug;

/// Alias table for name-based detection, checked in order; the first alias
/// contained in the normalized column name wins. Speed is checked before
/// Odometer so that names like "Velocidade (Km)" are not swallowed by the
/// bare "km" substring.
const NAME_ALIASES: &[(SemanticType, &[&str])] = &[
    (SemanticType::Timestamp, &["timestamp", "time", "data", "dt", "datetime"]),
    (SemanticType::Latitude, &["lat", "latitude"]),
    (SemanticType::Longitude, &["lon", "lng", "longitude"]),
    (SemanticType::Speed, &["speed", "velocidade", "vel_km_h"]),
    (SemanticType::Odometer, &["odo", "odometer", "km", "odômetro"]),
    (SemanticType::Ignition, &["ignition", "ig", "engine_status"]),
    (SemanticType::VehicleId, &["vehicle_id", "id_veiculo", "placa"]),
    (SemanticType::ClientId, &["client_id", "cliente", "id_cliente"]),
    (SemanticType::Battery, &["bateria", "battery"]),
];

pub struct SchemaDetector;

impl SchemaDetector {
    /// Inspects a raw batch and returns its per-column schema.
    pub fn detect(batch: &RawBatch) -> SchemaDescriptor {
        let mut columns = Vec::with_capacity(batch.columns.len());
        let mut unknown = 0usize;

        for (idx, name) in batch.columns.iter().enumerate() {
            let samples: Vec<&str> = batch.column_values(idx).take(SCHEMA_SAMPLE_SIZE).collect();
            let semantic_type = Self::classify_column(name, &samples);
            if semantic_type == SemanticType::Unknown {
                unknown += 1;
            }
            debug!(column = %name, ?semantic_type, "classified column");
            columns.push(ColumnDescriptor {
                name: name.clone(),
                semantic_type,
                example_value: samples.first().map(|v| v.to_string()),
            });
        }

        metrics::schema::columns_classified(columns.len());
        metrics::schema::columns_unknown(unknown);

        SchemaDescriptor {
            source: batch.source.clone(),
            columns,
        }
    }

    fn classify_column(name: &str, samples: &[&str]) -> SemanticType {
        let normalized = name.to_lowercase();
        let normalized = normalized.trim();

        for (semantic_type, aliases) in NAME_ALIASES {
            if aliases.iter().any(|alias| normalized.contains(alias)) {
                return *semantic_type;
            }
        }

        if samples.is_empty() {
            return SemanticType::Unknown;
        }

        if Self::looks_like_timestamp(samples) {
            return SemanticType::Timestamp;
        }

        if Self::looks_like_numeric(samples) {
            return Self::classify_numeric(normalized, samples);
        }

        if Self::looks_like_boolean(samples) {
            return SemanticType::Boolean;
        }

        SemanticType::String
    }

    /// At least two of the first three samples must parse as timestamps.
    fn looks_like_timestamp(samples: &[&str]) -> bool {
        let head: Vec<&&str> = samples.iter().take(3).collect();
        if head.is_empty() {
            return false;
        }
        let parsed = head.iter().filter(|v| parse_timestamp(v).is_some()).count();
        parsed as f64 / head.len() as f64 >= 0.67
    }

    fn looks_like_numeric(samples: &[&str]) -> bool {
        let parsed = samples.iter().filter(|v| parse_number(v).is_some()).count();
        parsed as f64 / samples.len() as f64 >= NUMERIC_SAMPLE_RATIO
    }

    fn looks_like_boolean(samples: &[&str]) -> bool {
        samples
            .iter()
            .all(|v| BOOLEAN_TOKENS.contains(&v.to_lowercase().as_str()))
    }

    /// Range-based sub-classification for numeric columns whose name missed
    /// the alias table but still hints at a measurement.
    fn classify_numeric(name: &str, samples: &[&str]) -> SemanticType {
        let values: Vec<f64> = samples.iter().filter_map(|v| parse_number(v)).collect();
        if values.is_empty() {
            return SemanticType::Numeric;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        if (0.0..=90.0).contains(&mean) && name.contains("lat") {
            SemanticType::Latitude
        } else if (-180.0..=180.0).contains(&mean) && name.contains("lon") {
            SemanticType::Longitude
        } else if mean >= 0.0 && (name.contains("speed") || name.contains("velocidade")) {
            SemanticType::Speed
        } else if mean >= 0.0 && (name.contains("odo") || name.contains("km")) {
            SemanticType::Odometer
        } else if (0.0..=100.0).contains(&mean)
            && (name.contains("bateria") || name.contains("battery"))
        {
            SemanticType::Battery
        } else {
            SemanticType::Numeric
        }
    }
}
