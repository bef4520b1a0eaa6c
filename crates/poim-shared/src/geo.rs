//! Radius filter over stored latitude/longitude pairs.
//!
//! A point matches when it passes two tests against the query circle:
//!
//! 1. **Planar**: the offset from the centre, in raw degree space, lies
//!    within a circle of `radius_m * 0.018 / 1000` degrees. Cheap enough to
//!    run on every row, loose enough near 60 degrees north to never drop a
//!    true match there.
//! 2. **Geodesic**: the haversine distance from the centre is at most
//!    `radius_m`. This is the authoritative test.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{EARTH_RADIUS_METERS, GEO_DEGREES_PER_KM};
use crate::error::GeoFilterError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFilter {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

impl GeoFilter {
    pub fn new(latitude: f64, longitude: f64, radius_m: f64) -> Result<Self, GeoFilterError> {
        for (position, value) in [latitude, longitude, radius_m].into_iter().enumerate() {
            if !value.is_finite() {
                return Err(GeoFilterError::NotFinite(position));
            }
        }
        if radius_m < 0.0 {
            return Err(GeoFilterError::NegativeRadius);
        }

        Ok(Self {
            latitude,
            longitude,
            radius_m,
        })
    }

    /// Radius of the planar pre-filter circle, in degrees.
    pub fn planar_radius_deg(&self) -> f64 {
        self.radius_m * GEO_DEGREES_PER_KM / 1000.0
    }

    pub fn within_planar(&self, latitude: f64, longitude: f64) -> bool {
        let d_lat = latitude - self.latitude;
        let d_lon = longitude - self.longitude;
        let r = self.planar_radius_deg();
        d_lat * d_lat + d_lon * d_lon <= r * r
    }

    pub fn within_geodesic(&self, latitude: f64, longitude: f64) -> bool {
        haversine_distance(self.latitude, self.longitude, latitude, longitude) <= self.radius_m
    }

    /// Both tests, planar first.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.within_planar(latitude, longitude) && self.within_geodesic(latitude, longitude)
    }
}

/// Parses `"<lat>,<lon>,<radius_m>"`.
impl FromStr for GeoFilter {
    type Err = GeoFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 3 {
            return Err(GeoFilterError::WrongArity(parts.len()));
        }

        let mut values = [0.0_f64; 3];
        for (position, raw) in parts.iter().enumerate() {
            let raw = raw.trim();
            values[position] = raw.parse::<f64>().map_err(|_| GeoFilterError::NotANumber {
                position,
                value: raw.to_string(),
            })?;
        }

        Self::new(values[0], values[1], values[2])
    }
}

/// Great-circle distance between two points in metres.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}
