//! `FlashDataItem`: a lightning stroke. Grounded on `FlashDataItem.h`/`.cpp`.

use chrono::{DateTime, Utc};

use super::{combine, hash_f64, seed};

#[derive(Debug, Clone, PartialEq)]
pub struct FlashDataItem {
    pub stroke_time: DateTime<Utc>,
    pub stroke_time_fraction: i32,
    pub flash_id: u32,
    pub created: DateTime<Utc>,
    pub modified_last: DateTime<Utc>,
    pub longitude: f64,
    pub latitude: f64,
    pub multiplicity: i32,
    pub peak_current: i32,
    /// Sensor count.
    pub sensors: i32,
    pub freedom_degree: i32,
    pub ellipse_angle: f64,
    pub ellipse_major: f64,
    pub ellipse_minor: f64,
    pub chi_square: f64,
    pub rise_time: f64,
    pub ptz_time: f64,
    pub cloud_indicator: i32,
    pub angle_indicator: i32,
    pub signal_indicator: i32,
    pub timing_indicator: i32,
    pub stroke_status: i32,
    /// `-1` indicates NULL.
    pub data_source: i32,
    pub modified_by: i32,
}

impl Default for FlashDataItem {
    fn default() -> Self {
        Self {
            stroke_time: DateTime::UNIX_EPOCH,
            stroke_time_fraction: 0,
            flash_id: 0,
            created: DateTime::UNIX_EPOCH,
            modified_last: DateTime::UNIX_EPOCH,
            longitude: 0.0,
            latitude: 0.0,
            multiplicity: 0,
            peak_current: 0,
            sensors: 0,
            freedom_degree: 0,
            ellipse_angle: 0.0,
            ellipse_major: 0.0,
            ellipse_minor: 0.0,
            chi_square: 0.0,
            rise_time: 0.0,
            ptz_time: 0.0,
            cloud_indicator: 0,
            angle_indicator: 0,
            signal_indicator: 0,
            timing_indicator: 0,
            stroke_status: 0,
            data_source: -1,
            modified_by: 0,
        }
    }
}

impl FlashDataItem {
    /// Stable identity: (stroke-time, fraction, flash-id).
    pub fn stable_identity(&self) -> (DateTime<Utc>, i32, u32) {
        (self.stroke_time, self.stroke_time_fraction, self.flash_id)
    }

    /// Field order mirrors `FlashDataItem::hash_value()` exactly.
    pub fn hash_value(&self) -> u64 {
        let mut h = seed(self.stroke_time.timestamp_nanos_opt().unwrap_or(0));
        combine(&mut h, self.stroke_time_fraction);
        combine(&mut h, hash_f64(self.longitude));
        combine(&mut h, hash_f64(self.latitude));
        combine(&mut h, self.flash_id);
        combine(&mut h, self.multiplicity);
        combine(&mut h, self.peak_current);
        combine(&mut h, self.sensors);
        combine(&mut h, self.freedom_degree);
        combine(&mut h, hash_f64(self.ellipse_angle));
        combine(&mut h, hash_f64(self.ellipse_major));
        combine(&mut h, hash_f64(self.ellipse_minor));
        combine(&mut h, hash_f64(self.chi_square));
        combine(&mut h, hash_f64(self.rise_time));
        combine(&mut h, hash_f64(self.ptz_time));
        combine(&mut h, self.cloud_indicator);
        combine(&mut h, self.angle_indicator);
        combine(&mut h, self.signal_indicator);
        combine(&mut h, self.timing_indicator);
        combine(&mut h, self.stroke_status);
        combine(&mut h, self.data_source);
        combine(&mut h, self.created.timestamp_nanos_opt().unwrap_or(0));
        combine(&mut h, self.modified_last.timestamp_nanos_opt().unwrap_or(0));
        combine(&mut h, self.modified_by);
        h
    }
}

pub type FlashDataItems = Vec<FlashDataItem>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identical_strokes_hash_equal() {
        let a = FlashDataItem {
            stroke_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            flash_id: 42,
            longitude: 25.0,
            latitude: 60.0,
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a.hash_value(), b.hash_value());
    }

    #[test]
    fn different_peak_current_changes_hash() {
        let a = FlashDataItem {
            peak_current: 10,
            ..Default::default()
        };
        let b = FlashDataItem {
            peak_current: 20,
            ..Default::default()
        };
        assert_ne!(a.hash_value(), b.hash_value());
    }
}
