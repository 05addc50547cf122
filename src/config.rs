use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Tunable thresholds for the reconciliation and quality engine.
///
/// Every option is optional in the file form; anything absent or
/// non-positive falls back to the stated default, so the engine can always
/// assume sane values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Speeds above this are flagged as outliers and ignored by the
    /// reconciler when picking a maximum (km/h).
    pub speed_outlier_threshold_kmh: f64,
    /// A trip opens when speed rises above this and closes when it falls
    /// back to or below it (km/h).
    pub trip_speed_threshold_kmh: f64,
    /// Minimum elapsed time between trip start and end (seconds).
    pub trip_min_duration_s: i64,
    /// Displacement beyond this within one hour is marked as a GPS jump (km).
    pub gps_jump_distance_km: f64,
    /// Consumption used when estimating fuel from distance (km per liter).
    pub default_consumption_km_per_liter: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed_outlier_threshold_kmh: 220.0,
            trip_speed_threshold_kmh: 3.0,
            trip_min_duration_s: 60,
            gps_jump_distance_km: 500.0,
            default_consumption_km_per_liter: 12.0,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Clamps non-positive thresholds back to their defaults.
    pub fn sanitized(self) -> Self {
        let defaults = EngineConfig::default();
        let mut out = self;
        if out.speed_outlier_threshold_kmh <= 0.0 {
            warn!(
                value = out.speed_outlier_threshold_kmh,
                "speed_outlier_threshold_kmh not positive, using default"
            );
            out.speed_outlier_threshold_kmh = defaults.speed_outlier_threshold_kmh;
        }
        if out.trip_speed_threshold_kmh <= 0.0 {
            warn!(
                value = out.trip_speed_threshold_kmh,
                "trip_speed_threshold_kmh not positive, using default"
            );
            out.trip_speed_threshold_kmh = defaults.trip_speed_threshold_kmh;
        }
        if out.trip_min_duration_s <= 0 {
            warn!(
                value = out.trip_min_duration_s,
                "trip_min_duration_s not positive, using default"
            );
            out.trip_min_duration_s = defaults.trip_min_duration_s;
        }
        if out.gps_jump_distance_km <= 0.0 {
            warn!(
                value = out.gps_jump_distance_km,
                "gps_jump_distance_km not positive, using default"
            );
            out.gps_jump_distance_km = defaults.gps_jump_distance_km;
        }
        if out.default_consumption_km_per_liter <= 0.0 {
            warn!(
                value = out.default_consumption_km_per_liter,
                "default_consumption_km_per_liter not positive, using default"
            );
            out.default_consumption_km_per_liter = defaults.default_consumption_km_per_liter;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.speed_outlier_threshold_kmh, 220.0);
        assert_eq!(config.trip_speed_threshold_kmh, 3.0);
        assert_eq!(config.trip_min_duration_s, 60);
        assert_eq!(config.gps_jump_distance_km, 500.0);
        assert_eq!(config.default_consumption_km_per_liter, 12.0);
    }

    #[test]
    fn negative_thresholds_clamp_to_defaults() {
        let config = EngineConfig {
            speed_outlier_threshold_kmh: -5.0,
            trip_min_duration_s: 0,
            ..EngineConfig::default()
        }
        .sanitized();
        assert_eq!(config.speed_outlier_threshold_kmh, 220.0);
        assert_eq!(config.trip_min_duration_s, 60);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: EngineConfig = toml::from_str("trip_speed_threshold_kmh = 5.0").unwrap();
        assert_eq!(config.trip_speed_threshold_kmh, 5.0);
        assert_eq!(config.gps_jump_distance_km, 500.0);
    }

    #[test]
    fn load_reads_and_sanitizes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(
            &path,
            "speed_outlier_threshold_kmh = 180.0\ngps_jump_distance_km = -1.0\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.speed_outlier_threshold_kmh, 180.0);
        assert_eq!(config.gps_jump_distance_km, 500.0);
    }
}
