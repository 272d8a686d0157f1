//! Station resolution logic (spec §4.7): selectors, group filtering,
//! nearest-k search with distance/bearing post-processing, and the two
//! invalidate-on-republish LRU caches.
//!
//! Grounded on `PostgreSQLCacheDB.cpp`'s station/location lookup queries
//! for the join shape, and on `dedup.rs`'s `lru::LruCache` usage for the
//! cache machinery.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::geo_util::{self, BoundingBox, WktArea};
use crate::model::Station;

use super::registry::{RegistrySnapshot, StationRegistry};

pub enum StationSelector {
    /// A geoid or free coordinate plus a radius (spec §4.7's first input
    /// channel); `geoid` drives the nearest-k cache key when present.
    TaggedLocation {
        tag: String,
        geoid: Option<i64>,
        lon: Option<f64>,
        lat: Option<f64>,
        radius_km: f64,
        number_of_stations: Option<usize>,
    },
    Ids {
        fmisid: Vec<i32>,
        wmo: Vec<i32>,
        geoid: Vec<i64>,
        lpnn: Vec<i32>,
        rwsid: Vec<i32>,
    },
    Radius {
        lon: f64,
        lat: f64,
        radius_km: f64,
        number_of_stations: Option<usize>,
    },
    BoundingBox(BoundingBox),
    Wkt(WktArea),
    /// Every station in the requested groups with an interval covering
    /// any part of the time window.
    AllPlaces,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStation {
    pub station: Station,
    pub distance_km: Option<f64>,
    pub direction_deg: Option<f64>,
    pub requested_lat: Option<f64>,
    pub requested_lon: Option<f64>,
    pub tag: Option<String>,
}

pub struct ResolutionRequest {
    pub selectors: Vec<StationSelector>,
    pub station_type: String,
    pub group_codes: Vec<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

type NearestKey = (i64, Option<usize>, String, u64, i64, i64);

pub struct StationResolver {
    registry: std::sync::Arc<StationRegistry>,
    nearest_cache: Mutex<LruCache<NearestKey, Vec<ResolvedStation>>>,
    id_cache: Mutex<LruCache<i32, Station>>,
}

fn day_bucket(t: DateTime<Utc>) -> i64 {
    t.timestamp().div_euclid(86_400)
}

impl StationResolver {
    pub fn new(registry: std::sync::Arc<StationRegistry>, nearest_capacity: usize, id_capacity: usize) -> Self {
        Self {
            registry,
            nearest_cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(nearest_capacity.max(1)).unwrap(),
            )),
            id_cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(id_capacity.max(1)).unwrap())),
        }
    }

    /// Invalidates both caches; called right after `StationRegistry::publish`.
    pub fn invalidate_caches(&self) {
        self.nearest_cache.lock().unwrap().clear();
        self.id_cache.lock().unwrap().clear();
    }

    pub fn station_by_id(&self, fmisid: i32) -> Option<Station> {
        if let Some(hit) = self.id_cache.lock().unwrap().get(&fmisid) {
            return Some(hit.clone());
        }
        let snapshot = self.registry.current();
        let found = snapshot.station_by_id(fmisid).cloned();
        if let Some(station) = &found {
            self.id_cache.lock().unwrap().put(fmisid, station.clone());
        }
        found
    }

    fn group_ok(
        &self,
        snapshot: &RegistrySnapshot,
        fmisid: i32,
        group_codes: &[String],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> bool {
        if group_codes.is_empty() {
            return true;
        }
        snapshot
            .groups
            .iter()
            .filter(|g| group_codes.iter().any(|c| c == &g.code))
            .any(|g| {
                g.members
                    .iter()
                    .any(|m| m.fmisid == fmisid && m.valid_from <= window_end && window_start < m.valid_to)
            })
    }

    fn compute_nearest(
        &self,
        snapshot: &RegistrySnapshot,
        lon: f64,
        lat: f64,
        k: Option<usize>,
        max_distance_km: f64,
        station_type: &str,
        group_codes: &[String],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<ResolvedStation> {
        let max_distance_m = max_distance_km * 1000.0;
        let mut candidates: Vec<(f64, ResolvedStation)> = snapshot
            .stations
            .iter()
            .filter(|s| s.station_type == station_type)
            .filter(|s| s.overlaps_window(window_start, window_end))
            .filter(|s| self.group_ok(snapshot, s.fmisid, group_codes, window_start, window_end))
            .filter_map(|s| {
                let distance_m = geo_util::distance_m(lon, lat, s.longitude, s.latitude);
                if distance_m > max_distance_m {
                    return None;
                }
                let bearing = geo_util::bearing_deg(lon, lat, s.longitude, s.latitude);
                Some((
                    distance_m,
                    ResolvedStation {
                        station: s.clone(),
                        distance_km: Some((distance_m / 100.0).round() / 10.0),
                        direction_deg: Some(bearing),
                        requested_lat: Some(lat),
                        requested_lon: Some(lon),
                        tag: None,
                    },
                ))
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.station.fmisid.cmp(&b.1.station.fmisid))
        });
        if let Some(k) = k {
            candidates.truncate(k);
        }
        candidates.into_iter().map(|(_, r)| r).collect()
    }

    /// Nearest-k search, memoised by `(geoid, k, station-type, max-distance,
    /// day-bucket(start), day-bucket(end))` when a geoid anchors the query
    /// (spec §4.7's cache key); free-coordinate searches bypass the cache.
    #[allow(clippy::too_many_arguments)]
    fn nearest_k(
        &self,
        snapshot: &RegistrySnapshot,
        lon: f64,
        lat: f64,
        geoid: Option<i64>,
        k: Option<usize>,
        max_distance_km: f64,
        station_type: &str,
        group_codes: &[String],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<ResolvedStation> {
        let Some(geoid) = geoid else {
            return self.compute_nearest(
                snapshot,
                lon,
                lat,
                k,
                max_distance_km,
                station_type,
                group_codes,
                window_start,
                window_end,
            );
        };
        let key: NearestKey = (
            geoid,
            k,
            station_type.to_string(),
            max_distance_km.to_bits(),
            day_bucket(window_start),
            day_bucket(window_end),
        );
        if let Some(hit) = self.nearest_cache.lock().unwrap().get(&key) {
            return hit.clone();
        }
        let result = self.compute_nearest(
            snapshot,
            lon,
            lat,
            k,
            max_distance_km,
            station_type,
            group_codes,
            window_start,
            window_end,
        );
        self.nearest_cache.lock().unwrap().put(key, result.clone());
        result
    }

    /// Resolve every selector and union the results, deduplicated by
    /// station id (first occurrence's post-processing fields win).
    pub fn resolve(&self, req: &ResolutionRequest) -> Vec<ResolvedStation> {
        let snapshot = self.registry.current();
        let mut results = Vec::new();
        let mut seen: HashSet<i32> = HashSet::new();

        for selector in &req.selectors {
            let found = self.resolve_selector(&snapshot, selector, req);
            for r in found {
                if seen.insert(r.station.fmisid) {
                    results.push(r);
                }
            }
        }
        results
    }

    fn resolve_selector(
        &self,
        snapshot: &RegistrySnapshot,
        selector: &StationSelector,
        req: &ResolutionRequest,
    ) -> Vec<ResolvedStation> {
        match selector {
            StationSelector::TaggedLocation {
                tag,
                geoid,
                lon,
                lat,
                radius_km,
                number_of_stations,
            } => {
                let center = match geoid {
                    Some(g) => snapshot.stations.iter().find(|s| s.geoid == Some(*g)).map(|s| (s.longitude, s.latitude)),
                    None => lon.zip(*lat),
                };
                let Some((clon, clat)) = center else {
                    return Vec::new();
                };
                self.nearest_k(
                    snapshot,
                    clon,
                    clat,
                    *geoid,
                    *number_of_stations,
                    *radius_km,
                    &req.station_type,
                    &req.group_codes,
                    req.window_start,
                    req.window_end,
                )
                .into_iter()
                .map(|mut r| {
                    r.tag = Some(tag.clone());
                    r
                })
                .collect()
            }
            StationSelector::Ids { fmisid, wmo, geoid, lpnn, rwsid } => snapshot
                .stations
                .iter()
                .filter(|s| {
                    fmisid.contains(&s.fmisid)
                        || s.wmo.is_some_and(|w| wmo.contains(&w))
                        || s.geoid.is_some_and(|g| geoid.contains(&g))
                        || s.lpnn.is_some_and(|l| lpnn.contains(&l))
                        || s.rwsid.is_some_and(|r| rwsid.contains(&r))
                })
                .filter(|s| self.group_ok(snapshot, s.fmisid, &req.group_codes, req.window_start, req.window_end))
                .map(|s| plain_resolved(s))
                .collect(),
            StationSelector::Radius {
                lon,
                lat,
                radius_km,
                number_of_stations,
            } => self.nearest_k(
                snapshot,
                *lon,
                *lat,
                None,
                *number_of_stations,
                *radius_km,
                &req.station_type,
                &req.group_codes,
                req.window_start,
                req.window_end,
            ),
            StationSelector::BoundingBox(bbox) => snapshot
                .stations
                .iter()
                .filter(|s| bbox.contains_point(s.longitude, s.latitude))
                .filter(|s| self.group_ok(snapshot, s.fmisid, &req.group_codes, req.window_start, req.window_end))
                .map(|s| plain_resolved(s))
                .collect(),
            StationSelector::Wkt(area) => snapshot
                .stations
                .iter()
                .filter(|s| area.contains_point(s.longitude, s.latitude))
                .filter(|s| self.group_ok(snapshot, s.fmisid, &req.group_codes, req.window_start, req.window_end))
                .map(|s| plain_resolved(s))
                .collect(),
            StationSelector::AllPlaces => snapshot
                .stations
                .iter()
                .filter(|s| s.overlaps_window(req.window_start, req.window_end))
                .filter(|s| self.group_ok(snapshot, s.fmisid, &req.group_codes, req.window_start, req.window_end))
                .map(|s| plain_resolved(s))
                .collect(),
        }
    }
}

fn plain_resolved(station: &Station) -> ResolvedStation {
    ResolvedStation {
        station: station.clone(),
        distance_km: None,
        direction_deg: None,
        requested_lat: None,
        requested_lon: None,
        tag: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupMembership, StationGroup};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn station(fmisid: i32, lon: f64, lat: f64) -> Station {
        Station {
            fmisid,
            wmo: None,
            geoid: Some(1000 + fmisid as i64),
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

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(1000, 0).unwrap())
    }

    fn resolver_with(stations: Vec<Station>) -> StationResolver {
        let registry = Arc::new(StationRegistry::new());
        registry.publish(RegistrySnapshot {
            stations,
            groups: Vec::new(),
            locations: Default::default(),
        });
        StationResolver::new(registry, 100, 100)
    }

    #[test]
    fn seed_scenario_3_nearest_3_with_radius_cap() {
        let resolver = resolver_with(vec![
            station(1, 0.0, 0.0),
            station(2, 0.1, 0.0),
            station(3, 0.0, 0.1),
            station(4, 5.0, 5.0),
        ]);
        let (start, end) = window();
        let req = ResolutionRequest {
            selectors: vec![StationSelector::Radius {
                lon: 0.0,
                lat: 0.0,
                radius_km: 50.0,
                number_of_stations: Some(3),
            }],
            station_type: "weather".to_string(),
            group_codes: Vec::new(),
            window_start: start,
            window_end: end,
        };
        let resolved = resolver.resolve(&req);
        assert_eq!(resolved.len(), 3);
        let ids: Vec<i32> = resolved.iter().map(|r| r.station.fmisid).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(resolved[0].distance_km, Some(0.0));
    }

    #[test]
    fn nearest_k_determinism() {
        let resolver = resolver_with(vec![station(1, 0.0, 0.0), station(2, 0.1, 0.0)]);
        let (start, end) = window();
        let req = ResolutionRequest {
            selectors: vec![StationSelector::Radius {
                lon: 0.0,
                lat: 0.0,
                radius_km: 50.0,
                number_of_stations: Some(2),
            }],
            station_type: "weather".to_string(),
            group_codes: Vec::new(),
            window_start: start,
            window_end: end,
        };
        let first = resolver.resolve(&req);
        let second = resolver.resolve(&req);
        assert_eq!(first, second);
    }

    #[test]
    fn group_filter_excludes_non_members() {
        let registry = Arc::new(StationRegistry::new());
        let (start, end) = window();
        registry.publish(RegistrySnapshot {
            stations: vec![station(1, 0.0, 0.0), station(2, 0.01, 0.0)],
            groups: vec![StationGroup {
                code: "opendata".to_string(),
                members: vec![GroupMembership {
                    fmisid: 1,
                    valid_from: start,
                    valid_to: end,
                }],
            }],
            locations: Default::default(),
        });
        let resolver = StationResolver::new(registry, 100, 100);
        let req = ResolutionRequest {
            selectors: vec![StationSelector::AllPlaces],
            station_type: "weather".to_string(),
            group_codes: vec!["opendata".to_string()],
            window_start: start,
            window_end: end,
        };
        let resolved = resolver.resolve(&req);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].station.fmisid, 1);
    }

    #[test]
    fn id_cache_invalidated_on_republish() {
        let registry = Arc::new(StationRegistry::new());
        registry.publish(RegistrySnapshot {
            stations: vec![station(1, 0.0, 0.0)],
            groups: Vec::new(),
            locations: Default::default(),
        });
        let resolver = StationResolver::new(registry.clone(), 100, 100);
        assert!(resolver.station_by_id(1).is_some());
        assert!(resolver.station_by_id(2).is_none());

        registry.publish(RegistrySnapshot {
            stations: vec![station(1, 0.0, 0.0), station(2, 1.0, 1.0)],
            groups: Vec::new(),
            locations: Default::default(),
        });
        resolver.invalidate_caches();
        assert!(resolver.station_by_id(2).is_some());
    }

    #[test]
    fn bounding_box_selector() {
        let resolver = resolver_with(vec![station(1, 0.0, 0.0), station(2, 10.0, 10.0)]);
        let (start, end) = window();
        let req = ResolutionRequest {
            selectors: vec![StationSelector::BoundingBox(BoundingBox {
                min_lon: -1.0,
                min_lat: -1.0,
                max_lon: 1.0,
                max_lat: 1.0,
            })],
            station_type: "weather".to_string(),
            group_codes: Vec::new(),
            window_start: start,
            window_end: end,
        };
        let resolved = resolver.resolve(&req);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].station.fmisid, 1);
    }
}
