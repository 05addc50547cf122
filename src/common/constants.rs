//! Fixed engine constants. Tunable thresholds live in `EngineConfig`; the
//! values here are part of the rule definitions themselves and never vary
//! per deployment.

/// Mean Earth radius used by the haversine formula (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Hard physical ceiling for speed readings; R5 truncates above this (km/h).
pub const SPEED_HARD_LIMIT_KMH: f64 = 250.0;

/// Total distance above which a zero maximum speed is treated as a sensor
/// contradiction rather than a parked vehicle (km).
pub const SENSOR_CONTRADICTION_MIN_KM: f64 = 20.0;

/// Minimum plausible instantaneous-speed estimate; below this the reconciler
/// declares a sensor issue instead of trusting the estimate (km/h).
pub const MIN_PLAUSIBLE_ESTIMATE_KMH: f64 = 5.0;

/// A km_delta at or below this counts as "no movement" for fuel rule R3 and
/// for GPS corroboration of R1 (km).
pub const STATIONARY_KM_EPSILON: f64 = 0.1;

/// Trips whose displacement does not exceed this are discarded (km).
pub const MIN_TRIP_DISTANCE_KM: f64 = 0.1;

/// GPS-jump flagging requires the displacement to happen in under this many
/// hours.
pub const GPS_JUMP_MAX_HOURS: f64 = 1.0;

/// How many non-empty values the schema detector samples per column.
pub const SCHEMA_SAMPLE_SIZE: usize = 10;

/// Share of sampled values that must parse as numbers for a column to be
/// classified numeric.
pub const NUMERIC_SAMPLE_RATIO: f64 = 0.8;

/// Tokens meaning "ignition on" across the device vendors we ingest.
pub const IGNITION_ON_TOKENS: &[&str] = &["1", "l", "lm", "lp", "ligado", "on"];

/// Tokens accepted by the boolean column heuristic.
pub const BOOLEAN_TOKENS: &[&str] = &["0", "1", "true", "false", "sim", "não", "yes", "no"];
