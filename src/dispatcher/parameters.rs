//! Parameter index compilation (spec §4.6, §9): resolves the requested
//! parameter name list once per request into a vector of `ParameterKind`,
//! replacing the string-keyed lookups the original performed on every row
//! with a single up-front resolution pass.

use std::collections::HashMap;

use crate::error::{ObsCacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialParam {
    Fmisid,
    Longitude,
    Latitude,
    Name,
    Timezone,
    LocalTime,
    Place,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedParam {
    WindCompass8,
    WindCompass16,
    WindCompass32,
    FeelsLike,
    SmartSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Measurand(i32),
    Special(SpecialParam),
    Derived(DerivedParam),
}

pub struct ParameterIndex {
    pub resolved: Vec<ParameterKind>,
}

fn special_from_name(name: &str) -> Option<SpecialParam> {
    match name {
        "fmisid" => Some(SpecialParam::Fmisid),
        "longitude" | "lon" => Some(SpecialParam::Longitude),
        "latitude" | "lat" => Some(SpecialParam::Latitude),
        "name" | "station_name" | "stationname" => Some(SpecialParam::Name),
        "timezone" => Some(SpecialParam::Timezone),
        "localtime" => Some(SpecialParam::LocalTime),
        "place" => Some(SpecialParam::Place),
        _ => None,
    }
}

/// Special-parameter names the upstream engine recognizes (station
/// geometry/post-processing fields belonging to the station-resolution
/// subsystem) but this dispatcher does not resolve to a value. Recognizing
/// them here lets `compile` distinguish "not a parameter at all"
/// (`UnknownParameter`) from "a special parameter this core doesn't
/// implement" (`UnsupportedParameter`), per spec §4.6/§7.
fn is_recognized_unimplemented_special(name: &str) -> bool {
    matches!(
        name,
        "geoid"
            | "distance"
            | "direction"
            | "stationary"
            | "stationlon"
            | "stationlongitude"
            | "stationlat"
            | "stationlatitude"
            | "elevation"
            | "station_elevation"
            | "stationtype"
            | "wmo"
            | "lpnn"
            | "rwsid"
            | "wsi"
            | "sensor_no"
            | "model"
            | "modtime"
    )
}

fn derived_from_name(name: &str) -> Option<DerivedParam> {
    match name {
        "windcompass8" => Some(DerivedParam::WindCompass8),
        "windcompass16" => Some(DerivedParam::WindCompass16),
        "windcompass32" => Some(DerivedParam::WindCompass32),
        "feelslike" => Some(DerivedParam::FeelsLike),
        "smartsymbol" => Some(DerivedParam::SmartSymbol),
        _ => None,
    }
}

/// Strips a leading `qc_` (quality-coded variant requests use the same
/// measurand names with this prefix) before lookup, per spec §4.6.
fn normalize(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    lower.strip_prefix("qc_").unwrap_or(&lower).to_string()
}

impl ParameterIndex {
    pub fn compile(names: &[String], measurand_map: &HashMap<String, i32>) -> Result<Self> {
        let mut resolved = Vec::with_capacity(names.len());
        for raw in names {
            let key = normalize(raw);
            let kind = if let Some(id) = measurand_map.get(&key) {
                ParameterKind::Measurand(*id)
            } else if let Some(special) = special_from_name(&key) {
                ParameterKind::Special(special)
            } else if let Some(derived) = derived_from_name(&key) {
                ParameterKind::Derived(derived)
            } else if is_recognized_unimplemented_special(&key) {
                return Err(ObsCacheError::UnsupportedParameter(raw.clone()));
            } else {
                return Err(ObsCacheError::UnknownParameter(raw.clone()));
            };
            resolved.push(kind);
        }
        Ok(Self { resolved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> HashMap<String, i32> {
        let mut m = HashMap::new();
        m.insert("ta".to_string(), 1);
        m.insert("ws_10min".to_string(), 4);
        m
    }

    #[test]
    fn resolves_measurand_case_insensitively() {
        let index = ParameterIndex::compile(&["TA".to_string()], &map()).unwrap();
        assert_eq!(index.resolved[0], ParameterKind::Measurand(1));
    }

    #[test]
    fn qc_prefix_maps_to_same_measurand() {
        let index = ParameterIndex::compile(&["QC_TA".to_string()], &map()).unwrap();
        assert_eq!(index.resolved[0], ParameterKind::Measurand(1));
    }

    #[test]
    fn resolves_special_and_derived() {
        let index = ParameterIndex::compile(
            &["fmisid".to_string(), "smartsymbol".to_string()],
            &map(),
        )
        .unwrap();
        assert_eq!(index.resolved[0], ParameterKind::Special(SpecialParam::Fmisid));
        assert_eq!(index.resolved[1], ParameterKind::Derived(DerivedParam::SmartSymbol));
    }

    #[test]
    fn unknown_name_errors() {
        let err = ParameterIndex::compile(&["bogus".to_string()], &map()).unwrap_err();
        assert!(matches!(err, ObsCacheError::UnknownParameter(_)));
    }

    #[test]
    fn recognized_but_unimplemented_special_is_unsupported_not_unknown() {
        let err = ParameterIndex::compile(&["stationtype".to_string()], &map()).unwrap_err();
        assert!(matches!(err, ObsCacheError::UnsupportedParameter(_)));
        let err = ParameterIndex::compile(&["modtime".to_string()], &map()).unwrap_err();
        assert!(matches!(err, ObsCacheError::UnsupportedParameter(_)));
    }
}
