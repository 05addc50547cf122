use crate::common::constants::EARTH_RADIUS_KM;

/// Great-circle distance between two latitude/longitude points in km,
/// using the haversine formula.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// True when a coordinate pair lies inside the valid WGS84 range.
pub fn coordinates_valid(lat: f64, lon: f64) -> bool {
    lat.abs() <= 90.0 && lon.abs() <= 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert!(haversine_km(-12.97, -38.51, -12.97, -38.51) < 1e-9);
    }

    #[test]
    fn salvador_to_feira_de_santana_is_about_100_km() {
        // Salvador (-12.9714, -38.5014) to Feira de Santana (-12.2664, -38.9663)
        let d = haversine_km(-12.9714, -38.5014, -12.2664, -38.9663);
        assert!((d - 93.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.2).abs() < 1.0, "got {d}");
    }

    #[test]
    fn coordinate_range_check() {
        assert!(coordinates_valid(89.9, 179.9));
        assert!(!coordinates_valid(90.1, 0.0));
        assert!(!coordinates_valid(0.0, -180.5));
    }
}
