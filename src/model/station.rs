//! `Station`: identity-bearing station record. Grounded on the station
//! columns referenced throughout `PostgreSQLCacheDB.cpp`'s station queries.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub fmisid: i32,
    pub wmo: Option<i32>,
    pub geoid: Option<i64>,
    pub lpnn: Option<i32>,
    pub rwsid: Option<i32>,
    pub name: String,
    pub station_type: String,
    /// `[station_start, station_end)`.
    pub station_start: DateTime<Utc>,
    pub station_end: DateTime<Utc>,
    pub longitude: f64,
    pub latitude: f64,
    pub time_zone_name: String,
    pub wsi: Option<String>,
}

impl Station {
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.station_start <= t && t < self.station_end
    }

    /// Overlaps `[window_start, window_end]` at all (used by the `allplaces`
    /// station-selector channel, spec §4.7).
    pub fn overlaps_window(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> bool {
        self.station_start <= window_end && window_start < self.station_end
    }
}
