//! Crate configuration, loaded from a TOML file.
//!
//! A serde-derived, section-per-concern shape; a missing file falls back
//! to defaults and logs at info!.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Entity kinds the cache tiers and ingest loop operate over (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Observation,
    Flash,
    WeatherDataQc,
    MobileExternal,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Observation,
        EntityKind::Flash,
        EntityKind::WeatherDataQc,
        EntityKind::MobileExternal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Observation => "observation",
            EntityKind::Flash => "flash",
            EntityKind::WeatherDataQc => "weather_data_qc",
            EntityKind::MobileExternal => "mobile_external",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub stations: StationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Memory snapshot retention per entity kind, in hours.
    #[serde(default = "default_memory_retention_hours")]
    pub memory_retention_hours: HashMap<String, i64>,
    /// Persistent mirror retention per entity kind, in days.
    #[serde(default = "default_mirror_retention_days")]
    pub mirror_retention_days: HashMap<String, i64>,
    /// Insert-dedup LRU capacity per entity kind.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: HashMap<String, usize>,
    /// Rows per UPSERT chunk when writing to the mirror.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_retention_hours: default_memory_retention_hours(),
            mirror_retention_days: default_mirror_retention_days(),
            dedup_capacity: default_dedup_capacity(),
            insert_batch_size: default_insert_batch_size(),
        }
    }
}

fn default_memory_retention_hours() -> HashMap<String, i64> {
    [
        ("observation", 6),
        ("flash", 1),
        ("weather_data_qc", 6),
        ("mobile_external", 2),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_mirror_retention_days() -> HashMap<String, i64> {
    [
        ("observation", 14),
        ("flash", 3),
        ("weather_data_qc", 14),
        ("mobile_external", 7),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_dedup_capacity() -> HashMap<String, usize> {
    [
        ("observation", 200_000),
        ("flash", 500_000),
        ("weather_data_qc", 50_000),
        ("mobile_external", 100_000),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_insert_batch_size() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: usize,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

fn default_pool_size() -> usize {
    16
}

fn default_busy_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    #[serde(default = "default_nearest_cache_capacity")]
    pub nearest_cache_capacity: usize,
    #[serde(default = "default_id_cache_capacity")]
    pub id_cache_capacity: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            nearest_cache_capacity: default_nearest_cache_capacity(),
            id_cache_capacity: default_id_cache_capacity(),
        }
    }
}

fn default_nearest_cache_capacity() -> usize {
    10_000
}

fn default_id_cache_capacity() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Emit a warning when a pulled delta spans at least this many hours (spec §4.5: 24h).
    #[serde(default = "default_large_sweep_hours")]
    pub large_sweep_hours: i64,
    /// Guard against clock regressions: beyond this many days since the
    /// modified-watermark, fall back to the obs-time watermark instead (spec §4.5: 366 days).
    #[serde(default = "default_modified_watermark_guard_days")]
    pub modified_watermark_guard_days: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            large_sweep_hours: default_large_sweep_hours(),
            modified_watermark_guard_days: default_modified_watermark_guard_days(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_large_sweep_hours() -> i64 {
    24
}

fn default_modified_watermark_guard_days() -> i64 {
    366
}

impl Config {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn memory_retention_hours(&self, kind: EntityKind) -> i64 {
        *self
            .cache
            .memory_retention_hours
            .get(kind.as_str())
            .unwrap_or(&6)
    }

    pub fn mirror_retention_days(&self, kind: EntityKind) -> i64 {
        *self
            .cache
            .mirror_retention_days
            .get(kind.as_str())
            .unwrap_or(&14)
    }

    pub fn dedup_capacity(&self, kind: EntityKind) -> usize {
        *self
            .cache
            .dedup_capacity
            .get(kind.as_str())
            .unwrap_or(&100_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_entity_kind() {
        let config = Config::default();
        for kind in EntityKind::ALL {
            assert!(config.memory_retention_hours(kind) > 0);
            assert!(config.mirror_retention_days(kind) > 0);
            assert!(config.dedup_capacity(kind) > 0);
        }
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/path/obs-cache.toml").unwrap();
        assert_eq!(config.pool.size, default_pool_size());
    }
}
