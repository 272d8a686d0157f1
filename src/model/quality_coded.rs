//! `QualityCodedDatum`: a road/foreign-station reading with a categorical
//! parameter code. Grounded on `WeatherDataQCItem.h`.

use chrono::{DateTime, Utc};

use super::{combine, hash_f64, seed};

#[derive(Debug, Clone, PartialEq)]
pub struct QualityCodedDatum {
    pub fmisid: i32,
    pub obstime: DateTime<Utc>,
    pub modified_last: DateTime<Utc>,
    pub parameter: String,
    pub sensor_no: i32,
    pub value: Option<f64>,
    pub flag: i32,
}

impl QualityCodedDatum {
    /// Stable identity: (obs-time, station, parameter, sensor).
    pub fn stable_identity(&self) -> (DateTime<Utc>, i32, &str, i32) {
        (self.obstime, self.fmisid, self.parameter.as_str(), self.sensor_no)
    }

    pub fn hash_value(&self) -> u64 {
        let mut h = seed(self.obstime.timestamp_nanos_opt().unwrap_or(0));
        combine(&mut h, self.fmisid);
        combine(&mut h, &self.parameter);
        combine(&mut h, self.sensor_no);
        combine(&mut h, self.value.map(hash_f64).unwrap_or(0));
        combine(&mut h, self.flag);
        combine(&mut h, self.modified_last.timestamp_nanos_opt().unwrap_or(0));
        h
    }
}
