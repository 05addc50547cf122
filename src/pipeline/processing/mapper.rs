//! Column Mapper: rewrites raw columns into canonical telemetry fields and
//! synthesizes the ones the input never carried.
//!
//! Mapping order is fixed and deterministic; for each canonical field the
//! first exact alias match (case-insensitive) wins. Missing `odometer` is
//! rebuilt from GPS displacement, missing `speed` from odometer deltas over
//! elapsed time. Every synthesis is recorded as a human-readable fallback
//! entry so downstream reports can disclose it.

use std::collections::BTreeMap;

use crate::common::geo::{coordinates_valid, haversine_km};
use crate::common::time::{parse_number, parse_timestamp};
use crate::domain::{CanonicalField, CanonicalRecord, ColumnMapping, RawBatch};
use crate::observability::metrics;
use tracing::info;

/// Alias table for canonical fields, in the fixed mapping order.
const CANONICAL_ALIASES: &[(CanonicalField, &[&str])] = &[
    (CanonicalField::Timestamp, &["timestamp", "time", "data", "dt", "datetime"]),
    (CanonicalField::Lat, &["lat", "latitude"]),
    (CanonicalField::Lon, &["lon", "lng", "longitude"]),
    (CanonicalField::Odometer, &["odo", "odometer", "km", "odômetro"]),
    (CanonicalField::Speed, &["speed", "velocidade", "vel_km_h"]),
    (CanonicalField::Ignition, &["ignition", "ig", "engine_status"]),
    (CanonicalField::VehicleId, &["vehicle_id", "id_veiculo", "placa"]),
    (CanonicalField::ClientId, &["client_id", "cliente", "id_cliente"]),
    (CanonicalField::Fuel, &["fuel", "combustivel", "fuel_consumed", "fuel_used"]),
];

pub struct ColumnMapper;

impl ColumnMapper {
    /// Maps a raw batch into canonical records plus the mapping description.
    pub fn map(batch: &RawBatch) -> (Vec<CanonicalRecord>, ColumnMapping) {
        let mut mapping = ColumnMapping::default();
        let mut indices: BTreeMap<&'static str, usize> = BTreeMap::new();

        for (field, aliases) in CANONICAL_ALIASES {
            match Self::find_column(batch, aliases) {
                Some(idx) => {
                    indices.insert(field.as_str(), idx);
                    mapping
                        .original_to_canonical
                        .insert(batch.columns[idx].clone(), field.as_str().to_string());
                }
                None => {
                    mapping
                        .missing_canonical_fields
                        .push(field.as_str().to_string());
                }
            }
        }

        let mut records: Vec<CanonicalRecord> = batch
            .rows
            .iter()
            .enumerate()
            .map(|(row, _)| Self::build_record(batch, row, &indices))
            .collect();

        if !indices.contains_key(CanonicalField::Odometer.as_str()) {
            Self::synthesize_odometer(&mut records);
            mapping
                .fallbacks_applied
                .push("odometer: accumulated haversine distance between consecutive GPS fixes".to_string());
            metrics::mapper::fallback_applied();
        }

        if !indices.contains_key(CanonicalField::Speed.as_str()) {
            Self::synthesize_speed(&mut records);
            mapping
                .fallbacks_applied
                .push("speed: derived from odometer delta over elapsed time".to_string());
            metrics::mapper::fallback_applied();
        }

        metrics::mapper::records_mapped(records.len());
        info!(
            source = %batch.source,
            mapped = mapping.original_to_canonical.len(),
            missing = mapping.missing_canonical_fields.len(),
            fallbacks = mapping.fallbacks_applied.len(),
            "mapped columns"
        );

        (records, mapping)
    }

    /// First column whose name equals an alias, case-insensitively, in alias
    /// order.
    fn find_column(batch: &RawBatch, aliases: &[&str]) -> Option<usize> {
        for alias in aliases {
            if let Some(idx) = batch
                .columns
                .iter()
                .position(|c| c.to_lowercase() == alias.to_lowercase())
            {
                return Some(idx);
            }
        }
        None
    }

    fn build_record(
        batch: &RawBatch,
        row: usize,
        indices: &BTreeMap<&'static str, usize>,
    ) -> CanonicalRecord {
        let cell = |field: CanonicalField| indices.get(field.as_str()).and_then(|&c| batch.value(row, c));

        CanonicalRecord {
            timestamp: cell(CanonicalField::Timestamp).and_then(parse_timestamp),
            lat: cell(CanonicalField::Lat).and_then(parse_number),
            lon: cell(CanonicalField::Lon).and_then(parse_number),
            odometer: cell(CanonicalField::Odometer).and_then(parse_number),
            speed: cell(CanonicalField::Speed)
                .and_then(parse_number)
                .unwrap_or(0.0),
            ignition: cell(CanonicalField::Ignition).map(|v| v.to_string()),
            vehicle_id: cell(CanonicalField::VehicleId)
                .map(|v| v.to_string())
                .unwrap_or_default(),
            client_id: cell(CanonicalField::ClientId).map(|v| v.to_string()),
            fuel: cell(CanonicalField::Fuel).and_then(parse_number),
            ..CanonicalRecord::default()
        }
    }

    /// Accumulated great-circle distance per vehicle, seeded at 0; steps with
    /// invalid or missing coordinates contribute 0.
    fn synthesize_odometer(records: &mut [CanonicalRecord]) {
        let mut state: BTreeMap<String, (f64, Option<(f64, f64)>)> = BTreeMap::new();

        for record in records.iter_mut() {
            let entry = state
                .entry(record.vehicle_id.clone())
                .or_insert((0.0, None));
            let current = record
                .coordinates()
                .filter(|(lat, lon)| coordinates_valid(*lat, *lon));

            if let (Some((lat1, lon1)), Some((lat2, lon2))) = (entry.1, current) {
                entry.0 += haversine_km(lat1, lon1, lat2, lon2);
            }
            if current.is_some() {
                entry.1 = current;
            }
            record.odometer = Some(entry.0);
        }
    }

    /// Speed from odometer delta over elapsed hours; 0 when elapsed time is
    /// not positive, either endpoint is missing, or the counter reset
    /// between readings.
    fn synthesize_speed(records: &mut [CanonicalRecord]) {
        let mut previous: BTreeMap<String, (Option<chrono::NaiveDateTime>, Option<f64>)> =
            BTreeMap::new();

        for record in records.iter_mut() {
            let prev = previous
                .entry(record.vehicle_id.clone())
                .or_insert((None, None));

            record.speed = match (prev.0, prev.1, record.timestamp, record.odometer) {
                (Some(t1), Some(o1), Some(t2), Some(o2)) => {
                    let hours = (t2 - t1).num_seconds() as f64 / 3600.0;
                    if hours > 0.0 {
                        (o2 - o1).max(0.0) / hours
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            };

            *prev = (record.timestamp, record.odometer);
        }
    }
}
