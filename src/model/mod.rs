//! Core entities (spec §3), grounded on `DataItem.h/.cpp`,
//! `FlashDataItem.h/.cpp`, `WeatherDataQCItem.h`, `MobileExternalDataItem.h`
//! and `LocationItem.h` from `examples/original_source/observation/`.

pub mod data_item;
pub mod flash;
pub mod location;
pub mod mobile_external;
pub mod quality_coded;
pub mod station;
pub mod station_group;

pub use data_item::{DataItem, FOREIGN_PRODUCER, ROAD_PRODUCER};
pub use flash::FlashDataItem;
pub use location::LocationItem;
pub use mobile_external::MobileExternalDatum;
pub use quality_coded::QualityCodedDatum;
pub use station::Station;
pub use station_group::StationGroup;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// `boost::hash_combine`-equivalent: folds one more hashed field into a
/// running seed, matching the `Fmi::hash_combine(hash, Fmi::hash_value(x))`
/// call chains in the original `hash_value()` methods. Field order matters
/// and must match the original exactly for `hash_value()` parity.
pub(crate) fn combine(seed: &mut u64, value: impl Hash) {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    let h = hasher.finish();
    *seed ^= h
        .wrapping_add(0x9e3779b97f4a7c15)
        .wrapping_add(seed.wrapping_shl(6))
        .wrapping_add(seed.wrapping_shr(2));
}

/// Stand-in for `Fmi::hash_value(x)` as the seed of a combine chain.
pub(crate) fn seed(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Bit-pattern hash of an `f64`. Two `f64`s that compare equal hash equal;
/// `NaN` is not expected in observation values but is handled without
/// panicking (all NaN bit patterns collapse to one canonical hash).
pub(crate) fn hash_f64(v: f64) -> u64 {
    if v.is_nan() {
        0x7ff8_0000_0000_0000
    } else {
        v.to_bits()
    }
}
