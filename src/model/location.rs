//! `LocationItem`: a station position valid over a half-open interval.
//! Grounded on `LocationItem.h`.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct LocationItem {
    pub location_id: i32,
    pub fmisid: i32,
    pub country_id: i32,
    /// `[valid_from, valid_to)`.
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub longitude: f64,
    pub latitude: f64,
    pub x: f64,
    pub y: f64,
    pub elevation: f64,
    pub time_zone_name: String,
    pub time_zone_abbrev: String,
}

impl LocationItem {
    /// Whether this interval covers `t` (spec §3: `valid_from <= t < valid_to`).
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && t < self.valid_to
    }
}

/// Per-station, non-overlapping intervals (spec §3 invariant).
#[derive(Debug, Clone, Default)]
pub struct LocationHistory {
    /// Sorted ascending by `valid_from`.
    intervals: Vec<LocationItem>,
}

impl LocationHistory {
    pub fn new(mut intervals: Vec<LocationItem>) -> Self {
        intervals.sort_by_key(|i| i.valid_from);
        Self { intervals }
    }

    /// The interval covering `t`, if any.
    pub fn at(&self, t: DateTime<Utc>) -> Option<&LocationItem> {
        self.intervals.iter().find(|i| i.covers(t))
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loc(from: i64, to: i64, lon: f64) -> LocationItem {
        LocationItem {
            location_id: 1,
            fmisid: 100908,
            country_id: 1,
            valid_from: Utc.timestamp_opt(from, 0).unwrap(),
            valid_to: Utc.timestamp_opt(to, 0).unwrap(),
            longitude: lon,
            latitude: 60.0,
            x: 0.0,
            y: 0.0,
            elevation: 0.0,
            time_zone_name: "Europe/Helsinki".to_string(),
            time_zone_abbrev: "EET".to_string(),
        }
    }

    #[test]
    fn half_open_interval_boundaries() {
        let history = LocationHistory::new(vec![loc(0, 100, 24.0), loc(100, 200, 25.0)]);
        assert_eq!(history.at(Utc.timestamp_opt(0, 0).unwrap()).unwrap().longitude, 24.0);
        assert_eq!(history.at(Utc.timestamp_opt(99, 0).unwrap()).unwrap().longitude, 24.0);
        assert_eq!(history.at(Utc.timestamp_opt(100, 0).unwrap()).unwrap().longitude, 25.0);
    }

    #[test]
    fn uncovered_time_returns_none() {
        let history = LocationHistory::new(vec![loc(0, 100, 24.0)]);
        assert!(history.at(Utc.timestamp_opt(1000, 0).unwrap()).is_none());
    }
}
