//! Spatial predicates used by the memory snapshot, persistent mirror, and
//! station resolution (spec §4.3, §4.4, §4.7): great-circle distance and
//! bearing, bounding-box intersection, and arbitrary WKT polygon
//! containment.
//!
//! Grounded on `sx9-foundation-core/src/gis.rs` (`HaversineDistance`,
//! `Contains` from the `geo` crate) and the `Fmi::Geometry::GeoDistance`
//! call sites in `FlashMemoryCache.cpp`; WKT parsing is grounded on the
//! `wkt` crate dependency in `georust-rinex` (same ecosystem as `geo`).

use geo::{Contains, HaversineBearing, HaversineDistance, Point, Polygon};
use wkt::TryFromWkt;

use crate::error::{ObsCacheError, Result};

/// A bounding box in EPSG:4326 (lon/lat degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Great-circle distance in metres between two lon/lat points.
pub fn distance_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.haversine_distance(&b)
}

/// Forward azimuth in degrees (0 = north, clockwise) from `(lon1, lat1)` to
/// `(lon2, lat2)` — the `stationDirection` field in station-resolution
/// post-processing (spec §4.7).
pub fn bearing_deg(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.haversine_bearing(b)
}

/// Whether `(lon, lat)` is within `radius_m` metres of `(center_lon, center_lat)`.
pub fn within_radius(center_lon: f64, center_lat: f64, lon: f64, lat: f64, radius_m: f64) -> bool {
    distance_m(center_lon, center_lat, lon, lat) <= radius_m
}

/// Parse a WKT polygon and test point containment (spec §4.7's "arbitrary
/// WKT polygon" station selector, and the mirror's `ST_Contains` stand-in).
pub struct WktArea {
    polygon: Polygon<f64>,
}

impl WktArea {
    pub fn parse(wkt_text: &str) -> Result<Self> {
        let polygon = Polygon::<f64>::try_from_wkt_str(wkt_text)
            .map_err(|e| ObsCacheError::InvalidFilterSyntax(format!("bad WKT area: {e}")))?;
        Ok(Self { polygon })
    }

    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.polygon.contains(&Point::new(lon, lat))
    }
}
