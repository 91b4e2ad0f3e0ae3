//! Great-circle geometry on a spherical earth.

use contracts::Position;

use crate::error::{EngineError, EngineResult};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters.
pub fn distance_meters(a: &Position, b: &Position) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let sin_d_lat = (d_lat / 2.0).sin();
    let sin_d_lon = (d_lon / 2.0).sin();
    let h = sin_d_lat * sin_d_lat + lat1.cos() * lat2.cos() * sin_d_lon * sin_d_lon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

pub fn within_radius(center: &Position, candidate: &Position, radius_m: f64) -> bool {
    distance_meters(center, candidate) <= radius_m
}

pub fn validate_position(position: &Position) -> EngineResult<()> {
    if position.is_valid() {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "position out of range: {position}"
        )))
    }
}

pub fn validate_distance(distance_m: Option<f64>) -> EngineResult<()> {
    match distance_m {
        Some(value) if !value.is_finite() || value < 0.0 => Err(EngineError::InvalidInput(
            format!("distance must be a finite, non-negative number of meters (got {value})"),
        )),
        _ => Ok(()),
    }
}

pub fn validate_radius(radius_m: f64) -> EngineResult<()> {
    if radius_m.is_finite() && radius_m >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "radius must be a finite, non-negative number of meters (got {radius_m})"
        )))
    }
}
