//! Great-circle distance on a spherical earth

use crate::error::ValidationError;
use crate::models::GeoPoint;

/// Mean earth radius used for every distance computation
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Reject non-finite or out-of-range coordinates. Never wraps longitudes.
pub fn validate_point(point: &GeoPoint) -> Result<(), ValidationError> {
    let valid = point.lat.is_finite()
        && point.lon.is_finite()
        && point.lat.abs() <= 90.0
        && point.lon.abs() <= 180.0;
    if !valid {
        return Err(ValidationError::InvalidCoordinates { lat: point.lat, lon: point.lon });
    }
    Ok(())
}

/// Haversine distance in kilometres. Callers validate both points first.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // h can drift just above 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}
