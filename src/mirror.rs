//! Persistent mirror (spec §4.3, §6): a local table store holding
//! observations within the retention window, backed by `rusqlite`.
//!
//! A single connection wrapped in a `Mutex`, `execute_batch` for idempotent
//! schema creation, `prepare`/`query_map`/`params!` for reads. `SpatiaLite`'s spatial
//! indices and functions have no bundled-SQLite equivalent, so geometry
//! columns are plain `REAL` lon/lat pairs, btree-indexed, with the actual
//! point/radius and polygon predicates evaluated in Rust via `geo_util`
//! after a time-bounded row fetch — see `SPEC_FULL.md` §A.4.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, params_from_iter, Connection, ToSql};

use crate::filter::DataFilter;
use crate::geo_util;
use crate::model::{DataItem, FlashDataItem, MobileExternalDatum, QualityCodedDatum};
use crate::{ObsCacheError, Result};

fn to_epoch(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::UNIX_EPOCH)
}

/// A geometric predicate applied in Rust after a time-bounded row fetch
/// (spec §4.3's "point+radius, bounding box, arbitrary WKT polygon").
pub enum GeoPredicate {
    None,
    Radius { lon: f64, lat: f64, radius_m: f64 },
    BoundingBox(geo_util::BoundingBox),
    Wkt(geo_util::WktArea),
}

impl GeoPredicate {
    fn accepts(&self, lon: f64, lat: f64) -> bool {
        match self {
            GeoPredicate::None => true,
            GeoPredicate::Radius { lon: clon, lat: clat, radius_m } => {
                geo_util::within_radius(*clon, *clat, lon, lat, *radius_m)
            }
            GeoPredicate::BoundingBox(bbox) => bbox.contains_point(lon, lat),
            GeoPredicate::Wkt(area) => area.contains_point(lon, lat),
        }
    }
}

/// Splits `items` into mini-batches such that no mini-batch updates the
/// same stable identity twice (spec §4.3: "duplicates by stable identity
/// are deferred to a subsequent mini-batch"), each capped at `batch_size`.
fn split_into_minibatches<T, K, F>(items: &[T], batch_size: usize, identity: F) -> Vec<Vec<T>>
where
    T: Clone,
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> K,
{
    let mut batches: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut seen: std::collections::HashSet<K> = std::collections::HashSet::new();

    for item in items {
        let key = identity(item);
        if seen.contains(&key) || current.len() >= batch_size.max(1) {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                seen.clear();
            }
        }
        seen.insert(key);
        current.push(item.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

pub struct Mirror {
    conn: Mutex<Connection>,
    write_lock_observation: Mutex<()>,
    write_lock_flash: Mutex<()>,
    write_lock_quality_coded: Mutex<()>,
    write_lock_mobile_external: Mutex<()>,
    /// Per-producer write mutex for the dynamically-named `ext_obsdata_<producer>`
    /// tables; the fixed four above cover spec §6's other named tables.
    write_locks_by_producer: Mutex<HashMap<String, Mutex<()>>>,
    insert_batch_size: usize,
    /// Published floor per entity kind: the oldest time this tier still
    /// guarantees to hold, set by the corresponding `range_delete_*` call.
    /// `None` until retention has run at least once, mirroring
    /// `MemorySnapshot::get_start_time`'s "not initialised" semantics so
    /// the dispatcher's tier-selection rule (spec §4.6) can treat both
    /// tiers' floors the same way.
    floor_observation: RwLock<Option<DateTime<Utc>>>,
    floor_flash: RwLock<Option<DateTime<Utc>>>,
    floor_quality_coded: RwLock<Option<DateTime<Utc>>>,
}

impl Mirror {
    pub fn open(path: &str, insert_batch_size: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            write_lock_observation: Mutex::new(()),
            write_lock_flash: Mutex::new(()),
            write_lock_quality_coded: Mutex::new(()),
            write_lock_mobile_external: Mutex::new(()),
            write_locks_by_producer: Mutex::new(HashMap::new()),
            insert_batch_size,
            floor_observation: RwLock::new(None),
            floor_flash: RwLock::new(None),
            floor_quality_coded: RwLock::new(None),
        })
    }

    pub fn open_in_memory(insert_batch_size: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            write_lock_observation: Mutex::new(()),
            write_lock_flash: Mutex::new(()),
            write_lock_quality_coded: Mutex::new(()),
            write_lock_mobile_external: Mutex::new(()),
            write_locks_by_producer: Mutex::new(HashMap::new()),
            insert_batch_size,
            floor_observation: RwLock::new(None),
            floor_flash: RwLock::new(None),
            floor_quality_coded: RwLock::new(None),
        })
    }

    /// The oldest time the observation table still guarantees to hold,
    /// consulted by the dispatcher's tier-selection rule (spec §4.6).
    pub fn observation_floor(&self) -> Option<DateTime<Utc>> {
        *self.floor_observation.read().unwrap()
    }

    pub fn flash_floor(&self) -> Option<DateTime<Utc>> {
        *self.floor_flash.read().unwrap()
    }

    pub fn quality_coded_floor(&self) -> Option<DateTime<Utc>> {
        *self.floor_quality_coded.read().unwrap()
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS observation_data (
                fmisid        INTEGER NOT NULL,
                sensor_no     INTEGER NOT NULL,
                data_time     INTEGER NOT NULL,
                measurand_id  INTEGER NOT NULL,
                producer_id   INTEGER NOT NULL,
                measurand_no  INTEGER NOT NULL,
                data_value    REAL,
                data_quality  INTEGER NOT NULL,
                data_source   INTEGER NOT NULL,
                modified_last INTEGER NOT NULL,
                PRIMARY KEY (fmisid, data_time, measurand_id, producer_id, measurand_no, sensor_no)
            );
            CREATE INDEX IF NOT EXISTS idx_observation_modified ON observation_data(modified_last);

            CREATE TABLE IF NOT EXISTS weather_data_qc (
                fmisid        INTEGER NOT NULL,
                obstime       INTEGER NOT NULL,
                parameter     TEXT NOT NULL,
                sensor_no     INTEGER NOT NULL,
                value         REAL,
                flag          INTEGER NOT NULL,
                modified_last INTEGER NOT NULL,
                PRIMARY KEY (obstime, fmisid, parameter, sensor_no)
            );
            CREATE INDEX IF NOT EXISTS idx_weather_qc_modified ON weather_data_qc(modified_last);

            CREATE TABLE IF NOT EXISTS flash_data (
                stroke_time          INTEGER NOT NULL,
                stroke_time_fraction INTEGER NOT NULL,
                flash_id             INTEGER NOT NULL,
                longitude            REAL NOT NULL,
                latitude             REAL NOT NULL,
                multiplicity         INTEGER NOT NULL,
                peak_current         INTEGER NOT NULL,
                sensors              INTEGER NOT NULL,
                freedom_degree       INTEGER NOT NULL,
                ellipse_angle        REAL NOT NULL,
                ellipse_major        REAL NOT NULL,
                ellipse_minor        REAL NOT NULL,
                chi_square           REAL NOT NULL,
                rise_time            REAL NOT NULL,
                ptz_time             REAL NOT NULL,
                cloud_indicator      INTEGER NOT NULL,
                angle_indicator      INTEGER NOT NULL,
                signal_indicator     INTEGER NOT NULL,
                timing_indicator     INTEGER NOT NULL,
                stroke_status        INTEGER NOT NULL,
                data_source          INTEGER NOT NULL,
                created              INTEGER NOT NULL,
                modified_last        INTEGER NOT NULL,
                modified_by          INTEGER NOT NULL,
                PRIMARY KEY (stroke_time, stroke_time_fraction, flash_id)
            );
            CREATE INDEX IF NOT EXISTS idx_flash_modified ON flash_data(modified_last);
            CREATE INDEX IF NOT EXISTS idx_flash_location ON flash_data(longitude, latitude);

            CREATE TABLE IF NOT EXISTS stations (
                fmisid        INTEGER PRIMARY KEY,
                wmo           INTEGER,
                geoid         INTEGER,
                lpnn          INTEGER,
                rwsid         INTEGER,
                name          TEXT NOT NULL,
                station_type  TEXT NOT NULL,
                station_start INTEGER NOT NULL,
                station_end   INTEGER NOT NULL,
                longitude     REAL NOT NULL,
                latitude      REAL NOT NULL,
                time_zone_name TEXT NOT NULL,
                wsi           TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_stations_geom ON stations(longitude, latitude);

            CREATE TABLE IF NOT EXISTS station_groups (
                code TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS group_members (
                group_code TEXT NOT NULL REFERENCES station_groups(code),
                fmisid     INTEGER NOT NULL,
                valid_from INTEGER NOT NULL,
                valid_to   INTEGER NOT NULL,
                PRIMARY KEY (group_code, fmisid, valid_from)
            );

            CREATE TABLE IF NOT EXISTS locations (
                location_id     INTEGER NOT NULL,
                fmisid          INTEGER NOT NULL,
                country_id      INTEGER NOT NULL,
                valid_from      INTEGER NOT NULL,
                valid_to        INTEGER NOT NULL,
                longitude       REAL NOT NULL,
                latitude        REAL NOT NULL,
                x               REAL NOT NULL,
                y               REAL NOT NULL,
                elevation       REAL NOT NULL,
                time_zone_name  TEXT NOT NULL,
                time_zone_abbrev TEXT NOT NULL,
                PRIMARY KEY (fmisid, valid_from)
            );
            ",
        )?;
        Ok(())
    }

    fn producer_table(producer: &str) -> Result<String> {
        if !producer.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ObsCacheError::UnknownProducer(producer.to_string()));
        }
        Ok(format!("ext_obsdata_{producer}"))
    }

    /// Idempotently creates the mobile/external table for `producer` (spec
    /// §6: "with spatial index per producer").
    pub fn ensure_producer_table(&self, producer: &str) -> Result<()> {
        let table = Self::producer_table(producer)?;
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {table} (
                prod_id       INTEGER NOT NULL,
                station_id    INTEGER,
                dataset_id    TEXT,
                data_level    INTEGER,
                mid           INTEGER NOT NULL,
                sensor_no     INTEGER,
                data_time     INTEGER NOT NULL,
                data_value    REAL NOT NULL,
                data_value_txt TEXT,
                data_quality  INTEGER,
                ctrl_status   INTEGER,
                created       INTEGER NOT NULL,
                altitude      REAL,
                longitude     REAL NOT NULL,
                latitude      REAL NOT NULL,
                PRIMARY KEY (prod_id, mid, data_time, longitude, latitude)
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_geom ON {table}(longitude, latitude);
            CREATE INDEX IF NOT EXISTS idx_{table}_created ON {table}(created);
            "
        ))?;
        self.write_locks_by_producer
            .lock()
            .unwrap()
            .entry(table)
            .or_insert_with(|| Mutex::new(()));
        Ok(())
    }

    // ---- observation_data ----

    pub fn upsert_observations(&self, items: &[DataItem]) -> Result<usize> {
        let _guard = self.write_lock_observation.lock().unwrap();
        let mut conn = self.conn.lock().unwrap();
        let mut written = 0;
        for batch in split_into_minibatches(items, self.insert_batch_size, |i| i.stable_identity()) {
            let tx = conn.transaction()?;
            for item in &batch {
                tx.execute(
                    "INSERT INTO observation_data
                        (fmisid, sensor_no, data_time, measurand_id, producer_id, measurand_no,
                         data_value, data_quality, data_source, modified_last)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(fmisid, data_time, measurand_id, producer_id, measurand_no, sensor_no)
                     DO UPDATE SET data_value=excluded.data_value,
                                   data_quality=excluded.data_quality,
                                   data_source=excluded.data_source,
                                   modified_last=excluded.modified_last",
                    params![
                        item.fmisid,
                        item.sensor_no,
                        to_epoch(item.data_time),
                        item.measurand_id,
                        item.producer_id,
                        item.measurand_no,
                        item.data_value,
                        item.data_quality,
                        item.data_source,
                        to_epoch(item.modified_last),
                    ],
                )?;
                written += 1;
            }
            tx.commit()?;
        }
        Ok(written)
    }

    pub fn range_delete_observations(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock_observation.lock().unwrap();
        let conn = self.conn.lock().unwrap();
        let oldest: Option<i64> = conn
            .query_row("SELECT MIN(data_time) FROM observation_data", [], |row| row.get(0))
            .ok()
            .flatten();
        let deleted = match oldest {
            Some(oldest) if oldest >= to_epoch(cutoff) => Ok(0),
            None => Ok(0),
            Some(_) => Ok(conn.execute(
                "DELETE FROM observation_data WHERE data_time < ?1",
                params![to_epoch(cutoff)],
            )?),
        };
        *self.floor_observation.write().unwrap() = Some(cutoff);
        deleted
    }

    pub fn range_query_observations(
        &self,
        stations: &[i32],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: &DataFilter,
    ) -> Result<Vec<DataItem>> {
        if stations.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = stations.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let mut sql = format!(
            "SELECT fmisid, sensor_no, data_time, measurand_id, producer_id, measurand_no,
                    data_value, data_quality, data_source, modified_last
             FROM observation_data
             WHERE fmisid IN ({placeholders}) AND data_time >= ? AND data_time <= ?"
        );
        if let Some(clause) = filter.sql_clause("data_quality", "data_quality") {
            sql.push_str(&format!(" AND ({clause})"));
        }
        let mut params_vec: Vec<Box<dyn ToSql>> =
            stations.iter().map(|s| Box::new(*s) as Box<dyn ToSql>).collect();
        params_vec.push(Box::new(to_epoch(start)));
        params_vec.push(Box::new(to_epoch(end)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params_vec.iter().map(|p| p.as_ref())), |row| {
                Ok(DataItem {
                    fmisid: row.get(0)?,
                    sensor_no: row.get(1)?,
                    data_time: from_epoch(row.get(2)?),
                    measurand_id: row.get(3)?,
                    producer_id: row.get(4)?,
                    measurand_no: row.get(5)?,
                    data_value: row.get(6)?,
                    data_quality: row.get(7)?,
                    data_source: row.get(8)?,
                    modified_last: from_epoch(row.get(9)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- weather_data_qc ----

    pub fn upsert_quality_coded(&self, items: &[QualityCodedDatum]) -> Result<usize> {
        let _guard = self.write_lock_quality_coded.lock().unwrap();
        let mut conn = self.conn.lock().unwrap();
        let mut written = 0;
        for batch in split_into_minibatches(items, self.insert_batch_size, |i| {
            (i.obstime, i.fmisid, i.parameter.clone(), i.sensor_no)
        }) {
            let tx = conn.transaction()?;
            for item in &batch {
                tx.execute(
                    "INSERT INTO weather_data_qc (fmisid, obstime, parameter, sensor_no, value, flag, modified_last)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(obstime, fmisid, parameter, sensor_no)
                     DO UPDATE SET value=excluded.value, flag=excluded.flag, modified_last=excluded.modified_last",
                    params![
                        item.fmisid,
                        to_epoch(item.obstime),
                        item.parameter,
                        item.sensor_no,
                        item.value,
                        item.flag,
                        to_epoch(item.modified_last),
                    ],
                )?;
                written += 1;
            }
            tx.commit()?;
        }
        Ok(written)
    }

    pub fn range_delete_quality_coded(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock_quality_coded.lock().unwrap();
        let conn = self.conn.lock().unwrap();
        let oldest: Option<i64> = conn
            .query_row("SELECT MIN(obstime) FROM weather_data_qc", [], |row| row.get(0))
            .ok()
            .flatten();
        let deleted = match oldest {
            Some(oldest) if oldest >= to_epoch(cutoff) => Ok(0),
            None => Ok(0),
            Some(_) => Ok(conn.execute(
                "DELETE FROM weather_data_qc WHERE obstime < ?1",
                params![to_epoch(cutoff)],
            )?),
        };
        *self.floor_quality_coded.write().unwrap() = Some(cutoff);
        deleted
    }

    // ---- flash_data ----

    pub fn upsert_flashes(&self, items: &[FlashDataItem]) -> Result<usize> {
        let _guard = self.write_lock_flash.lock().unwrap();
        let mut conn = self.conn.lock().unwrap();
        let mut written = 0;
        for batch in split_into_minibatches(items, self.insert_batch_size, |i| i.stable_identity()) {
            let tx = conn.transaction()?;
            for item in &batch {
                tx.execute(
                    "INSERT INTO flash_data
                        (stroke_time, stroke_time_fraction, flash_id, longitude, latitude,
                         multiplicity, peak_current, sensors, freedom_degree, ellipse_angle,
                         ellipse_major, ellipse_minor, chi_square, rise_time, ptz_time,
                         cloud_indicator, angle_indicator, signal_indicator, timing_indicator,
                         stroke_status, data_source, created, modified_last, modified_by)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24)
                     ON CONFLICT(stroke_time, stroke_time_fraction, flash_id)
                     DO UPDATE SET longitude=excluded.longitude, latitude=excluded.latitude,
                                   multiplicity=excluded.multiplicity, peak_current=excluded.peak_current,
                                   modified_last=excluded.modified_last, modified_by=excluded.modified_by",
                    params![
                        to_epoch(item.stroke_time),
                        item.stroke_time_fraction,
                        item.flash_id,
                        item.longitude,
                        item.latitude,
                        item.multiplicity,
                        item.peak_current,
                        item.sensors,
                        item.freedom_degree,
                        item.ellipse_angle,
                        item.ellipse_major,
                        item.ellipse_minor,
                        item.chi_square,
                        item.rise_time,
                        item.ptz_time,
                        item.cloud_indicator,
                        item.angle_indicator,
                        item.signal_indicator,
                        item.timing_indicator,
                        item.stroke_status,
                        item.data_source,
                        to_epoch(item.created),
                        to_epoch(item.modified_last),
                        item.modified_by,
                    ],
                )?;
                written += 1;
            }
            tx.commit()?;
        }
        Ok(written)
    }

    pub fn range_delete_flashes(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock_flash.lock().unwrap();
        let conn = self.conn.lock().unwrap();
        let oldest: Option<i64> = conn
            .query_row("SELECT MIN(stroke_time) FROM flash_data", [], |row| row.get(0))
            .ok()
            .flatten();
        let deleted = match oldest {
            Some(oldest) if oldest >= to_epoch(cutoff) => Ok(0),
            None => Ok(0),
            Some(_) => Ok(conn.execute(
                "DELETE FROM flash_data WHERE stroke_time < ?1",
                params![to_epoch(cutoff)],
            )?),
        };
        *self.floor_flash.write().unwrap() = Some(cutoff);
        deleted
    }

    pub fn range_query_flashes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        geo: &GeoPredicate,
    ) -> Result<Vec<FlashDataItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT stroke_time, stroke_time_fraction, flash_id, longitude, latitude,
                    multiplicity, peak_current, sensors, freedom_degree, ellipse_angle,
                    ellipse_major, ellipse_minor, chi_square, rise_time, ptz_time,
                    cloud_indicator, angle_indicator, signal_indicator, timing_indicator,
                    stroke_status, data_source, created, modified_last, modified_by
             FROM flash_data WHERE stroke_time >= ?1 AND stroke_time <= ?2",
        )?;
        let rows = stmt
            .query_map(params![to_epoch(start), to_epoch(end)], |row| {
                Ok(FlashDataItem {
                    stroke_time: from_epoch(row.get(0)?),
                    stroke_time_fraction: row.get(1)?,
                    flash_id: row.get(2)?,
                    longitude: row.get(3)?,
                    latitude: row.get(4)?,
                    multiplicity: row.get(5)?,
                    peak_current: row.get(6)?,
                    sensors: row.get(7)?,
                    freedom_degree: row.get(8)?,
                    ellipse_angle: row.get(9)?,
                    ellipse_major: row.get(10)?,
                    ellipse_minor: row.get(11)?,
                    chi_square: row.get(12)?,
                    rise_time: row.get(13)?,
                    ptz_time: row.get(14)?,
                    cloud_indicator: row.get(15)?,
                    angle_indicator: row.get(16)?,
                    signal_indicator: row.get(17)?,
                    timing_indicator: row.get(18)?,
                    stroke_status: row.get(19)?,
                    data_source: row.get(20)?,
                    created: from_epoch(row.get(21)?),
                    modified_last: from_epoch(row.get(22)?),
                    modified_by: row.get(23)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter(|f| geo.accepts(f.longitude, f.latitude))
            .collect())
    }

    // ---- ext_obsdata_<producer> ----

    pub fn upsert_mobile_external(&self, producer: &str, items: &[MobileExternalDatum]) -> Result<usize> {
        self.ensure_producer_table(producer)?;
        let table = Self::producer_table(producer)?;
        let locks = self.write_locks_by_producer.lock().unwrap();
        let _guard = locks.get(&table).unwrap().lock().unwrap();
        let mut conn = self.conn.lock().unwrap();
        let mut written = 0;
        for batch in split_into_minibatches(items, self.insert_batch_size, |i| i.stable_identity()) {
            let tx = conn.transaction()?;
            for item in &batch {
                tx.execute(
                    &format!(
                        "INSERT INTO {table}
                            (prod_id, station_id, dataset_id, data_level, mid, sensor_no, data_time,
                             data_value, data_value_txt, data_quality, ctrl_status, created, altitude,
                             longitude, latitude)
                         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
                         ON CONFLICT(prod_id, mid, data_time, longitude, latitude)
                         DO UPDATE SET data_value=excluded.data_value, data_value_txt=excluded.data_value_txt,
                                       data_quality=excluded.data_quality, ctrl_status=excluded.ctrl_status"
                    ),
                    params![
                        item.prod_id,
                        item.station_id,
                        item.dataset_id,
                        item.data_level,
                        item.mid,
                        item.sensor_no,
                        to_epoch(item.data_time),
                        item.data_value,
                        item.data_value_txt,
                        item.data_quality,
                        item.ctrl_status,
                        to_epoch(item.created),
                        item.altitude,
                        item.longitude,
                        item.latitude,
                    ],
                )?;
                written += 1;
            }
            tx.commit()?;
        }
        Ok(written)
    }

    pub fn range_delete_mobile_external(&self, producer: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        self.ensure_producer_table(producer)?;
        let table = Self::producer_table(producer)?;
        let locks = self.write_locks_by_producer.lock().unwrap();
        let _guard = locks.get(&table).unwrap().lock().unwrap();
        let conn = self.conn.lock().unwrap();
        let oldest: Option<i64> = conn
            .query_row(&format!("SELECT MIN(data_time) FROM {table}"), [], |row| row.get(0))
            .ok()
            .flatten();
        match oldest {
            Some(oldest) if oldest >= to_epoch(cutoff) => Ok(0),
            None => Ok(0),
            Some(_) => Ok(conn.execute(
                &format!("DELETE FROM {table} WHERE data_time < ?1"),
                params![to_epoch(cutoff)],
            )?),
        }
    }
}
