//! `MobileExternalDatum`: crowd-sourced sample (road-cloud, citizen weather,
//! road-weather IoT). Grounded on `MobileExternalDataItem.h`.

use chrono::{DateTime, Utc};

use super::{combine, hash_f64, seed};

#[derive(Debug, Clone, PartialEq)]
pub struct MobileExternalDatum {
    pub prod_id: i32,
    pub station_id: Option<i32>,
    pub dataset_id: Option<String>,
    pub data_level: Option<i32>,
    pub mid: i32,
    pub sensor_no: Option<i32>,
    pub data_time: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub data_value: f64,
    pub data_value_txt: Option<String>,
    pub data_quality: Option<i32>,
    pub ctrl_status: Option<i32>,
    pub altitude: Option<f64>,
    pub longitude: f64,
    pub latitude: f64,
    pub station_code: Option<String>,
}

impl MobileExternalDatum {
    /// Stable identity: (producer, measurand, data-time, lon, lat).
    pub fn stable_identity(&self) -> (i32, i32, DateTime<Utc>, u64, u64) {
        (
            self.prod_id,
            self.mid,
            self.data_time,
            hash_f64(self.longitude),
            hash_f64(self.latitude),
        )
    }

    pub fn hash_value(&self) -> u64 {
        let mut h = seed(self.prod_id);
        combine(&mut h, self.mid);
        combine(&mut h, self.data_time.timestamp_nanos_opt().unwrap_or(0));
        combine(&mut h, hash_f64(self.longitude));
        combine(&mut h, hash_f64(self.latitude));
        combine(&mut h, hash_f64(self.data_value));
        combine(&mut h, self.data_quality.unwrap_or(-1));
        combine(&mut h, self.ctrl_status.unwrap_or(-1));
        combine(&mut h, self.sensor_no.unwrap_or(-1));
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn value_change_changes_hash() {
        let base = MobileExternalDatum {
            prod_id: 1,
            station_id: None,
            dataset_id: None,
            data_level: None,
            mid: 4,
            sensor_no: None,
            data_time: Utc.timestamp_opt(0, 0).unwrap(),
            created: Utc.timestamp_opt(0, 0).unwrap(),
            data_value: 1.0,
            data_value_txt: None,
            data_quality: None,
            ctrl_status: None,
            altitude: None,
            longitude: 24.9,
            latitude: 60.2,
            station_code: None,
        };
        let changed = MobileExternalDatum {
            data_value: 2.0,
            ..base.clone()
        };
        assert_ne!(base.hash_value(), changed.hash_value());
        assert_eq!(base.stable_identity(), changed.stable_identity());
    }
}
