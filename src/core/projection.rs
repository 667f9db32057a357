//! Geographic ↔ world-pixel ↔ viewport conversions for a single map view.
//!
//! World pixels are slippy-tile units scaled by the tile size, so at zoom `z`
//! the world is `2^z * TILE_SIZE` pixels wide. Viewport pixels are measured
//! from the top-left corner of the drawing rectangle.

use crate::core::constants::{DEFAULT_ZOOM_LIMIT, MIN_ZOOM, TILE_SIZE};
use crate::core::geo::{lat_lng_to_tile_units, tile_units_to_lat_lng, LatLng, Point};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Drawing rectangle the map is projected into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Viewport edges in world pixels at the current zoom
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl PixelBounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Viewport edges in degrees. Assumes a north-up view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat <= self.north
            && point.lat >= self.south
            && point.lng >= self.west
            && point.lng <= self.east
    }
}

/// Half-open ranges of tile indices covering the viewport.
///
/// Indices may fall outside the `2^zoom` grid near the poles or the antimeridian;
/// callers decide whether to skip or wrap them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRange {
    pub x: Range<i64>,
    pub y: Range<i64>,
    pub zoom: u8,
}

impl TileRange {
    /// Iterates `(x, y)` pairs column by column.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.x
            .clone()
            .flat_map(move |x| self.y.clone().map(move |y| (x, y)))
    }

    pub fn len(&self) -> usize {
        let width = (self.x.end - self.x.start).max(0) as usize;
        let height = (self.y.end - self.y.start).max(0) as usize;
        width * height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fields derived from center, zoom and viewport
#[derive(Debug, Clone, Copy, PartialEq)]
struct DerivedState {
    pixel_center: Point,
    pixel_bounds: PixelBounds,
    geo_bounds: GeoBounds,
}

/// Projection state for one map view.
///
/// Derived fields (pixel center, pixel and geographic bounds) exist only once
/// both the viewport and the center have been set. Every mutation of center,
/// zoom or viewport recomputes them; a recomputation requested before the
/// viewport is known is deferred to the first [`set_viewport`](Self::set_viewport).
///
/// Conversions before [`is_ready`](Self::is_ready) is true are caller errors and
/// return [`MapError::NotReady`].
#[derive(Debug, Clone)]
pub struct CoordinateProjection {
    center: Option<LatLng>,
    zoom: u8,
    zoom_limit: u8,
    viewport: Option<ScreenRect>,
    derived: Option<DerivedState>,
    generation: u64,
}

impl CoordinateProjection {
    /// Creates a projection clamping zoom to `1..=zoom_limit`.
    pub fn new(zoom_limit: u8) -> Self {
        Self {
            center: None,
            zoom: MIN_ZOOM,
            zoom_limit: zoom_limit.max(MIN_ZOOM),
            viewport: None,
            derived: None,
            generation: 0,
        }
    }

    /// Records the drawing offset and size and recomputes bounds if a center is known.
    pub fn set_viewport(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.viewport = Some(ScreenRect::new(x, y, width, height));
        self.find_edges();
    }

    /// Moves the map to a geographic location keeping the current zoom.
    pub fn set_center(&mut self, center: LatLng) {
        self.center = Some(center);
        self.find_edges();
    }

    /// Moves the map and changes zoom with a single recomputation.
    pub fn set_center_and_zoom(&mut self, center: LatLng, zoom: i32) {
        self.center = Some(center);
        self.zoom = self.clamp_zoom(zoom);
        self.find_edges();
    }

    /// Sets the zoom level, or shifts it by `value` when `is_adjustment` is true.
    /// The result is clamped to `1..=zoom_limit` and bounds are always recomputed.
    pub fn set_zoom(&mut self, value: i32, is_adjustment: bool) {
        let target = if is_adjustment {
            (self.zoom as i32).saturating_add(value)
        } else {
            value
        };
        self.zoom = self.clamp_zoom(target);
        self.find_edges();
    }

    /// Changes the upper zoom limit, re-clamping the current zoom.
    pub fn set_zoom_limit(&mut self, zoom_limit: u8) {
        self.zoom_limit = zoom_limit.max(MIN_ZOOM);
        if self.zoom > self.zoom_limit {
            self.zoom = self.zoom_limit;
            self.find_edges();
        }
    }

    /// Moves the map by a pixel offset, as a drag does.
    ///
    /// Dragging the content right (`dx > 0`) moves the center west.
    pub fn pan(&mut self, dx: f64, dy: f64) -> Result<()> {
        if dx == 0.0 && dy == 0.0 {
            return Ok(());
        }

        let state = self.state()?;
        let tile_size = TILE_SIZE as f64;
        let new_center = Point::new(
            (state.pixel_center.x - dx) / tile_size,
            (state.pixel_center.y - dy) / tile_size,
        );
        self.center = Some(tile_units_to_lat_lng(&new_center, self.zoom));
        self.find_edges();
        Ok(())
    }

    /// Maps a geographic point to viewport pixels.
    pub fn project(&self, lat_lng: &LatLng) -> Result<Point> {
        let state = self.state()?;
        let world = world_pixel(lat_lng, self.zoom);
        Ok(Point::new(
            world.x - state.pixel_bounds.min_x,
            world.y - state.pixel_bounds.min_y,
        ))
    }

    /// [`project`](Self::project) truncated to integer pixels.
    pub fn project_rounded(&self, lat_lng: &LatLng) -> Result<(i32, i32)> {
        self.project(lat_lng).map(|point| point.to_i32())
    }

    /// Maps viewport pixels back to a geographic point.
    pub fn unproject(&self, x: f64, y: f64) -> Result<LatLng> {
        let state = self.state()?;
        let tile_size = TILE_SIZE as f64;
        let units = Point::new(
            (state.pixel_bounds.min_x + x) / tile_size,
            (state.pixel_bounds.min_y + y) / tile_size,
        );
        Ok(tile_units_to_lat_lng(&units, self.zoom))
    }

    /// Viewport position of the northwest corner of tile `(x, y)` at the current zoom.
    pub fn tile_to_screen(&self, x: i64, y: i64) -> Result<Point> {
        let state = self.state()?;
        let tile_size = TILE_SIZE as f64;
        Ok(Point::new(
            x as f64 * tile_size - state.pixel_bounds.min_x,
            y as f64 * tile_size - state.pixel_bounds.min_y,
        ))
    }

    /// Tile indices covering the viewport.
    pub fn visible_tile_range(&self) -> Result<TileRange> {
        let bounds = self.state()?.pixel_bounds;
        let tile_size = TILE_SIZE as f64;
        Ok(TileRange {
            x: (bounds.min_x / tile_size).floor() as i64..(bounds.max_x / tile_size).ceil() as i64,
            y: (bounds.min_y / tile_size).floor() as i64..(bounds.max_y / tile_size).ceil() as i64,
            zoom: self.zoom,
        })
    }

    /// Whether a viewport pixel lies inside the drawing rectangle.
    pub fn is_on_screen(&self, x: f64, y: f64) -> bool {
        self.viewport
            .map(|rect| x >= 0.0 && x < rect.width && y >= 0.0 && y < rect.height)
            .unwrap_or(false)
    }

    /// Viewport pixel as a fraction of the viewport size.
    pub fn relative_position(&self, x: f64, y: f64) -> Result<Point> {
        let rect = self
            .viewport
            .ok_or_else(|| MapError::NotReady("viewport has not been set".to_string()))?;
        Ok(Point::new(x / rect.width, y / rect.height))
    }

    /// True once both viewport and center have been set.
    pub fn is_ready(&self) -> bool {
        self.derived.is_some()
    }

    pub fn center(&self) -> Option<LatLng> {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn zoom_limit(&self) -> u8 {
        self.zoom_limit
    }

    pub fn viewport(&self) -> Option<ScreenRect> {
        self.viewport
    }

    /// Center in world pixels.
    pub fn pixel_center(&self) -> Result<Point> {
        self.state().map(|state| state.pixel_center)
    }

    pub fn pixel_bounds(&self) -> Result<PixelBounds> {
        self.state().map(|state| state.pixel_bounds)
    }

    pub fn geo_bounds(&self) -> Result<GeoBounds> {
        self.state().map(|state| state.geo_bounds)
    }

    /// Number of times the derived fields have been recomputed.
    pub fn bounds_generation(&self) -> u64 {
        self.generation
    }

    /// Haversine distance in meters between two points.
    pub fn great_circle_distance_meters(a: &LatLng, b: &LatLng) -> f64 {
        a.distance_to(b)
    }

    /// Point `distance_m` meters from `origin` along `bearing_deg` (clockwise from north).
    pub fn destination_point(origin: &LatLng, distance_m: f64, bearing_deg: f64) -> LatLng {
        origin.destination(distance_m, bearing_deg)
    }

    fn clamp_zoom(&self, zoom: i32) -> u8 {
        zoom.clamp(MIN_ZOOM as i32, self.zoom_limit as i32) as u8
    }

    fn state(&self) -> Result<&DerivedState> {
        self.derived.as_ref().ok_or_else(|| {
            MapError::NotReady(match (self.viewport.is_some(), self.center.is_some()) {
                (false, false) => "viewport and center have not been set".to_string(),
                (false, true) => "viewport has not been set".to_string(),
                _ => "center has not been set".to_string(),
            })
        })
    }

    fn find_edges(&mut self) {
        let (Some(center), Some(viewport)) = (self.center, self.viewport) else {
            // Recomputed on the call that supplies the missing half
            self.derived = None;
            return;
        };

        let pixel_center = world_pixel(&center, self.zoom);
        let pixel_bounds = PixelBounds {
            min_x: pixel_center.x - 0.5 * viewport.width,
            max_x: pixel_center.x + 0.5 * viewport.width,
            min_y: pixel_center.y - 0.5 * viewport.height,
            max_y: pixel_center.y + 0.5 * viewport.height,
        };

        let tile_size = TILE_SIZE as f64;
        let north_west = tile_units_to_lat_lng(
            &Point::new(pixel_bounds.min_x / tile_size, pixel_bounds.min_y / tile_size),
            self.zoom,
        );
        let south_east = tile_units_to_lat_lng(
            &Point::new(pixel_bounds.max_x / tile_size, pixel_bounds.max_y / tile_size),
            self.zoom,
        );

        self.derived = Some(DerivedState {
            pixel_center,
            pixel_bounds,
            geo_bounds: GeoBounds {
                north: north_west.lat,
                south: south_east.lat,
                east: south_east.lng,
                west: north_west.lng,
            },
        });
        self.generation += 1;
    }
}

impl Default for CoordinateProjection {
    fn default() -> Self {
        Self::new(DEFAULT_ZOOM_LIMIT)
    }
}

fn world_pixel(lat_lng: &LatLng, zoom: u8) -> Point {
    let units = lat_lng_to_tile_units(lat_lng, zoom);
    Point::new(units.x * TILE_SIZE as f64, units.y * TILE_SIZE as f64)
}
