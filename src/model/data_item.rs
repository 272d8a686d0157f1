//! `DataItem`: a single measurement. Grounded on `DataItem.h`/`DataItem.cpp`.

use chrono::{DateTime, Utc};

use super::{combine, seed};

/// Self-assigned producer numbers carried over from the original (`ForeignProducer`,
/// `RoadProducer`) so mobile/external producer wiring has stable constants to reference.
pub const FOREIGN_PRODUCER: i32 = 1001;
pub const ROAD_PRODUCER: i32 = 1002;

#[derive(Debug, Clone, PartialEq)]
pub struct DataItem {
    pub fmisid: i32,
    /// Default sensor number at FMI.
    pub sensor_no: i32,
    pub measurand_id: i32,
    pub producer_id: i32,
    pub measurand_no: i32,
    pub data_time: DateTime<Utc>,
    pub modified_last: DateTime<Utc>,
    pub data_value: Option<f64>,
    pub data_quality: i32,
    /// `-1` indicates NULL, matching the original's sentinel.
    pub data_source: i32,
}

impl Default for DataItem {
    fn default() -> Self {
        Self {
            fmisid: 0,
            sensor_no: 1,
            measurand_id: 0,
            producer_id: 0,
            measurand_no: 1,
            data_time: DateTime::UNIX_EPOCH,
            modified_last: DateTime::UNIX_EPOCH,
            data_value: None,
            data_quality: 0,
            data_source: -1,
        }
    }
}

impl DataItem {
    /// Stable identity: (station, sensor, measurand-id, producer, measurand-no, obs-time).
    pub fn stable_identity(&self) -> (i32, i32, i32, i32, i32, DateTime<Utc>) {
        (
            self.fmisid,
            self.sensor_no,
            self.measurand_id,
            self.producer_id,
            self.measurand_no,
            self.data_time,
        )
    }

    /// Textual representation of `data_value`, `"NULL"` when absent. A true-NULL
    /// value still participates in the hash via this fixed string, so two
    /// consecutive NULL observations for the same identity collide on
    /// `hash_value()` (see spec §9's Open Questions — preserved intentionally).
    pub fn value_string(&self) -> String {
        match self.data_value {
            Some(v) => format!("{v}"),
            None => "NULL".to_string(),
        }
    }

    pub fn data_source_string(&self) -> String {
        if self.data_source < 0 {
            "NULL".to_string()
        } else {
            self.data_source.to_string()
        }
    }

    /// Hash of the stable identity plus the mutable observed value, used to
    /// detect "seen before" by the insert-dedup LRU and the memory snapshot.
    /// Field order mirrors `DataItem::hash_value()` exactly.
    pub fn hash_value(&self) -> u64 {
        let mut h = seed(self.fmisid);
        combine(&mut h, self.measurand_id);
        combine(&mut h, self.sensor_no);
        combine(&mut h, self.producer_id);
        combine(&mut h, self.measurand_no);
        combine(&mut h, self.data_time.timestamp_nanos_opt().unwrap_or(0));
        combine(&mut h, &self.value_string());
        combine(&mut h, self.data_quality);
        combine(&mut h, self.data_source);
        combine(&mut h, self.modified_last.timestamp_nanos_opt().unwrap_or(0));
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(value: Option<f64>, modified: i64) -> DataItem {
        DataItem {
            fmisid: 100908,
            data_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            modified_last: Utc.timestamp_opt(modified, 0).unwrap(),
            data_value: value,
            ..Default::default()
        }
    }

    #[test]
    fn value_correction_changes_hash() {
        let original = item(Some(1.0), 10);
        let corrected = item(Some(2.0), 10);
        assert_ne!(original.hash_value(), corrected.hash_value());
    }

    #[test]
    fn two_true_nulls_collide() {
        let a = item(None, 10);
        let b = item(None, 10);
        assert_eq!(a.hash_value(), b.hash_value());
    }

    #[test]
    fn stable_identity_ignores_value_and_modified() {
        let a = item(Some(1.0), 10);
        let b = item(Some(2.0), 20);
        assert_eq!(a.stable_identity(), b.stable_identity());
    }
}
