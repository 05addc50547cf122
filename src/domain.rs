//! Domain data shapes shared across pipeline stages.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One uploaded log: an ordered sequence of raw rows sharing a column set.
/// Values are kept as the decoded strings; typing happens downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBatch {
    /// Source identifier, usually the file name
    pub source: String,
    /// Column names, whitespace-trimmed, in file order
    pub columns: Vec<String>,
    /// Row values aligned with `columns`; absent cells are empty strings
    pub rows: Vec<Vec<String>>,
}

impl RawBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value for a row/column pair; empty cells read as `None`.
    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Non-empty values of one column, in row order.
    pub fn column_values(&self, col: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |r| r.get(col))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Closed set of semantic column types the detector can assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Timestamp,
    Latitude,
    Longitude,
    Odometer,
    Speed,
    Ignition,
    VehicleId,
    ClientId,
    Battery,
    Numeric,
    Boolean,
    String,
    Unknown,
}

/// One detected column: original name, inferred type, and an example value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    pub example_value: Option<String>,
}

/// Per-batch schema detection result. Created once, read-only afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub source: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// The fixed canonical telemetry fields, in mapping order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Timestamp,
    Lat,
    Lon,
    Odometer,
    Speed,
    Ignition,
    VehicleId,
    ClientId,
    Fuel,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 9] = [
        CanonicalField::Timestamp,
        CanonicalField::Lat,
        CanonicalField::Lon,
        CanonicalField::Odometer,
        CanonicalField::Speed,
        CanonicalField::Ignition,
        CanonicalField::VehicleId,
        CanonicalField::ClientId,
        CanonicalField::Fuel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Timestamp => "timestamp",
            CanonicalField::Lat => "lat",
            CanonicalField::Lon => "lon",
            CanonicalField::Odometer => "odometer",
            CanonicalField::Speed => "speed",
            CanonicalField::Ignition => "ignition",
            CanonicalField::VehicleId => "vehicle_id",
            CanonicalField::ClientId => "client_id",
            CanonicalField::Fuel => "fuel",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How raw columns were rewritten into canonical fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// original column name -> canonical field name
    pub original_to_canonical: BTreeMap<String, String>,
    /// Canonical fields absent from the input, in canonical order
    pub missing_canonical_fields: Vec<String>,
    /// Human-readable descriptions of synthesized fields, in application order
    pub fallbacks_applied: Vec<String>,
}

impl ColumnMapping {
    pub fn was_synthesized(&self, field: CanonicalField) -> bool {
        let prefix = format!("{}:", field.as_str());
        self.fallbacks_applied.iter().any(|f| f.starts_with(&prefix))
    }
}

/// Business rule codes applied by the quality engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCode {
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
}

impl fmt::Display for RuleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One telemetry row keyed by canonical fields, plus the quality-engine
/// annotations. Mutated in place by the quality engine and reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub odometer: Option<f64>,
    /// Speed in km/h; unparseable or absent readings default to 0
    pub speed: f64,
    /// Raw ignition token as reported by the device
    pub ignition: Option<String>,
    /// Empty when the input carries no vehicle column; the whole batch then
    /// forms a single vehicle group
    pub vehicle_id: String,
    pub client_id: Option<String>,
    pub fuel: Option<f64>,

    // Derived by the quality engine
    pub km_delta: f64,
    pub fuel_delta: f64,
    pub anomaly_flag: bool,
    pub applied_rules: Vec<RuleCode>,
    pub estimated_flag: bool,
    pub include_in_totals: bool,
    pub gps_jump: bool,
    pub speed_outlier: bool,
}

impl Default for CanonicalRecord {
    fn default() -> Self {
        Self {
            timestamp: None,
            lat: None,
            lon: None,
            odometer: None,
            speed: 0.0,
            ignition: None,
            vehicle_id: String::new(),
            client_id: None,
            fuel: None,
            km_delta: 0.0,
            fuel_delta: 0.0,
            anomaly_flag: false,
            applied_rules: Vec::new(),
            estimated_flag: false,
            include_in_totals: true,
            gps_jump: false,
            speed_outlier: false,
        }
    }
}

impl CanonicalRecord {
    /// Records a rule code, keeping `applied_rules` an ordered set.
    pub fn apply_rule(&mut self, rule: RuleCode) {
        if !self.applied_rules.contains(&rule) {
            self.applied_rules.push(rule);
        }
    }

    pub fn has_rule(&self, rule: RuleCode) -> bool {
        self.applied_rules.contains(&rule)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Counts of what the quality engine removed or flagged. Append-only while
/// the stage runs; never mutated afterward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub outliers_removed: u64,
    pub duplicates_removed: u64,
    pub gps_jumps_marked: u64,
    pub speed_outliers_marked: u64,
    pub inconsistent_excluded: u64,
    /// Free-form anomaly descriptions, in detection order
    pub anomalies: Vec<String>,
}

/// Which signal fed the authoritative distance figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceSource {
    Odometer,
    Haversine,
    Unknown,
}

/// Which signal fed the authoritative maximum speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedSource {
    RawSpeed,
    InstantSpeed,
    OdometerBased,
}

/// Batch-level distance and speed figures after source arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciledMetrics {
    pub total_km: f64,
    pub total_km_odometer: f64,
    pub total_km_haversine: f64,
    pub distance_source: DistanceSource,
    pub max_speed: f64,
    pub max_speed_raw: f64,
    pub speed_source: SpeedSource,
    pub sensor_issue: bool,
}

/// A contiguous interval of motion for one vehicle. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub vehicle_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub duration_seconds: i64,
    pub distance_km: f64,
    pub distance_source: DistanceSource,
    pub avg_moving_speed: f64,
    pub max_speed: f64,
}
