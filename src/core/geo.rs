use crate::core::constants::{EARTH_RADIUS_METERS, MAX_LATITUDE};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Clamps latitude to the band covered by the tile grid
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Great-circle distance to another point in meters (haversine on a sphere).
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }

    /// Point reached by travelling `distance_m` meters from here along the
    /// initial bearing `bearing_deg` (degrees clockwise from north).
    ///
    /// The result longitude is normalized to `[-180, 180)`.
    pub fn destination(&self, distance_m: f64, bearing_deg: f64) -> LatLng {
        let lat1 = self.lat.to_radians();
        let lng1 = self.lng.to_radians();
        let bearing = bearing_deg.to_radians();
        let angular = distance_m / EARTH_RADIUS_METERS;

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let delta_lng = (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());
        let lng2 = (lng1 + delta_lng + PI).rem_euclid(2.0 * PI) - PI;

        LatLng::new(lat2.to_degrees(), lng2.to_degrees())
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Truncates both components toward zero, the way pixel positions are drawn.
    pub fn to_i32(&self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Fractional slippy-tile coordinates of a geographic point at `zoom`.
///
/// The integer part is the tile index, the fraction the position inside the tile.
/// Latitude is clamped to the Web-Mercator band first.
pub fn lat_lng_to_tile_units(lat_lng: &LatLng, zoom: u8) -> Point {
    let lat_rad = LatLng::clamp_lat(lat_lng.lat).to_radians();
    let n = 2_f64.powi(zoom as i32);

    let x = (lat_lng.lng + 180.0) / 360.0 * n;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;

    Point::new(x, y)
}

/// Inverse of [`lat_lng_to_tile_units`].
pub fn tile_units_to_lat_lng(point: &Point, zoom: u8) -> LatLng {
    let n = 2_f64.powi(zoom as i32);
    let lng = point.x / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * point.y / n)).sinh().atan();

    LatLng::new(lat_rad.to_degrees(), lng)
}

/// Represents a tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Builds a coordinate from signed indices, as produced by a visible tile range.
    /// Returns `None` when the indices fall outside the `2^z` grid.
    pub fn checked(x: i64, y: i64, z: u8) -> Option<Self> {
        let coord = Self::new(u32::try_from(x).ok()?, u32::try_from(y).ok()?, z);
        coord.is_valid().then_some(coord)
    }

    /// Creates a tile coordinate from a LatLng and zoom level
    pub fn from_lat_lng(lat_lng: &LatLng, zoom: u8) -> Self {
        let units = lat_lng_to_tile_units(lat_lng, zoom);
        let max = Self::grid_size(zoom) - 1;
        Self::new(
            (units.x.floor().max(0.0) as u32).min(max),
            (units.y.floor().max(0.0) as u32).min(max),
            zoom,
        )
    }

    /// Converts tile coordinate to LatLng (northwest corner)
    pub fn to_lat_lng(&self) -> LatLng {
        tile_units_to_lat_lng(&Point::new(self.x as f64, self.y as f64), self.z)
    }

    /// Number of tiles per axis at `zoom`.
    pub fn grid_size(zoom: u8) -> u32 {
        1_u32 << zoom.min(31)
    }

    /// Checks if the tile is valid for the given zoom level.
    /// Zoom levels whose grid does not fit in `u32` indices are never valid.
    pub fn is_valid(&self) -> bool {
        if self.z > 31 {
            return false;
        }
        let max_coord = Self::grid_size(self.z);
        self.x < max_coord && self.y < max_coord
    }

    /// Bing-style quadkey: one base-4 digit per zoom level, most significant first.
    pub fn quadkey(&self) -> String {
        (1..=self.z)
            .rev()
            .map(|level| {
                let mask = 1_u32.checked_shl(u32::from(level) - 1).unwrap_or(0);
                let mut digit = 0_u8;
                if self.x & mask != 0 {
                    digit += 1;
                }
                if self.y & mask != 0 {
                    digit += 2;
                }
                char::from(b'0' + digit)
            })
            .collect()
    }
}
