//! The station registry: stations, station groups, and per-station location
//! history, published atomically (spec §3: "updated by a periodic
//! station-sync task; published atomically like the memory snapshot").
//! Same `RwLock<Arc<_>>` publish pattern as `snapshot.rs`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::model::{LocationHistory, Station, StationGroup};

#[derive(Default)]
pub struct RegistrySnapshot {
    pub stations: Vec<Station>,
    pub groups: Vec<StationGroup>,
    pub locations: HashMap<i32, LocationHistory>,
}

impl RegistrySnapshot {
    pub fn station_by_id(&self, fmisid: i32) -> Option<&Station> {
        self.stations.iter().find(|s| s.fmisid == fmisid)
    }

    pub fn groups_containing(&self, fmisid: i32, t: chrono::DateTime<chrono::Utc>) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|g| g.contains_at(fmisid, t))
            .map(|g| g.code.as_str())
            .collect()
    }
}

pub struct StationRegistry {
    data: RwLock<Arc<RegistrySnapshot>>,
}

impl Default for StationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StationRegistry {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    pub fn current(&self) -> Arc<RegistrySnapshot> {
        self.data.read().unwrap().clone()
    }

    /// Atomically replaces the published registry. Readers holding a
    /// clone of the previous `Arc` keep seeing it unaffected.
    pub fn publish(&self, snapshot: RegistrySnapshot) {
        *self.data.write().unwrap() = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn station(fmisid: i32, lon: f64, lat: f64) -> Station {
        Station {
            fmisid,
            wmo: None,
            geoid: None,
            lpnn: None,
            rwsid: None,
            name: format!("station-{fmisid}"),
            station_type: "weather".to_string(),
            station_start: Utc.timestamp_opt(0, 0).unwrap(),
            station_end: Utc.timestamp_opt(i64::MAX / 2, 0).unwrap(),
            longitude: lon,
            latitude: lat,
            time_zone_name: "UTC".to_string(),
            wsi: None,
        }
    }

    #[test]
    fn publish_is_atomic_for_existing_readers() {
        let registry = StationRegistry::new();
        registry.publish(RegistrySnapshot {
            stations: vec![station(1, 25.0, 60.0)],
            groups: Vec::new(),
            locations: HashMap::new(),
        });
        let held = registry.current();

        registry.publish(RegistrySnapshot {
            stations: vec![station(1, 25.0, 60.0), station(2, 26.0, 61.0)],
            groups: Vec::new(),
            locations: HashMap::new(),
        });

        assert_eq!(held.stations.len(), 1);
        assert_eq!(registry.current().stations.len(), 2);
    }
}
