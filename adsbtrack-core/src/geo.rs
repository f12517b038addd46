//! Region-of-interest filter: keep positions within a radius of a centre.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{AdsbError, FilteredPosition, Position, Result};

/// Mean Earth radius in statute miles.
const EARTH_RADIUS_MILES: f64 = 3958.7613;

/// Feet per degree of latitude (60 nm of 6076.115 ft).
const FEET_PER_DEGREE_LAT: f64 = 60.0 * 6076.115;

const FEET_PER_MILE: f64 = 5280.0;

/// A latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }
}

/// Great-circle distance in statute miles.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_MILES * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Flat-Earth distance in statute miles, longitude scaled at the first
/// point's latitude. Only meaningful over a few tens of miles.
pub fn flat_earth_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dy = (lat2 - lat1) * FEET_PER_DEGREE_LAT;
    let dx = (lon2 - lon1) * FEET_PER_DEGREE_LAT * lat1.to_radians().cos();
    dx.hypot(dy) / FEET_PER_MILE
}

/// Distance formula used by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    #[default]
    Haversine,
    FlatEarth,
}

impl DistanceModel {
    pub fn miles(self, from: GeoPoint, to: GeoPoint) -> f64 {
        match self {
            DistanceModel::Haversine => haversine_miles(from.lat, from.lon, to.lat, to.lon),
            DistanceModel::FlatEarth => flat_earth_miles(from.lat, from.lon, to.lat, to.lon),
        }
    }
}

impl FromStr for DistanceModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "haversine" => Ok(DistanceModel::Haversine),
            "flat_earth" | "flat" => Ok(DistanceModel::FlatEarth),
            other => Err(format!("unknown distance model: {other}")),
        }
    }
}

/// Bounding box of a filter region, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

/// Circular region filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFilter {
    center: GeoPoint,
    radius_miles: f64,
    model: DistanceModel,
}

impl GeoFilter {
    /// Validates the centre and radius.
    pub fn new(center: GeoPoint, radius_miles: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&center.lat) || !(-180.0..=180.0).contains(&center.lon) {
            return Err(AdsbError::Config(format!(
                "center ({}, {}) out of range",
                center.lat, center.lon
            )));
        }
        if !radius_miles.is_finite() || radius_miles < 0.0 {
            return Err(AdsbError::Config(format!(
                "radius must be a non-negative number of miles, got {radius_miles}"
            )));
        }
        Ok(GeoFilter {
            center,
            radius_miles,
            model: DistanceModel::default(),
        })
    }

    pub fn with_model(mut self, model: DistanceModel) -> Self {
        self.model = model;
        self
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn radius_miles(&self) -> f64 {
        self.radius_miles
    }

    pub fn distance_miles(&self, lat: f64, lon: f64) -> f64 {
        self.model.miles(GeoPoint::new(lat, lon), self.center)
    }

    /// Tag a position if it lies within the radius (inclusive).
    pub fn check(&self, position: Position) -> Option<FilteredPosition> {
        let distance_miles = self.distance_miles(position.latitude, position.longitude);
        (distance_miles <= self.radius_miles).then_some(FilteredPosition {
            position,
            distance_miles,
        })
    }

    /// Keep positions within the radius, preserving input order.
    pub fn filter(&self, positions: impl IntoIterator<Item = Position>) -> Vec<FilteredPosition> {
        positions.into_iter().filter_map(|p| self.check(p)).collect()
    }

    /// Box spanning `radius_miles` around the centre, for framing a map.
    pub fn extent(&self) -> Extent {
        let miles_per_deg_lat = FEET_PER_DEGREE_LAT / FEET_PER_MILE;
        let delta_lat = self.radius_miles / miles_per_deg_lat;
        let delta_lon = self.radius_miles / (miles_per_deg_lat * self.center.lat.to_radians().cos());
        Extent {
            lon_min: self.center.lon - delta_lon,
            lon_max: self.center.lon + delta_lon,
            lat_min: self.center.lat - delta_lat,
            lat_max: self.center.lat + delta_lat,
        }
    }
}

/// One-shot haversine filter around `center`.
pub fn filter(
    positions: impl IntoIterator<Item = Position>,
    center: GeoPoint,
    radius_miles: f64,
) -> Result<Vec<FilteredPosition>> {
    Ok(GeoFilter::new(center, radius_miles)?.filter(positions))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
