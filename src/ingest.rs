//! Upstream mirror maintenance (spec §4.5): periodically pulls new and
//! modified rows from the upstream store into the persistent mirror and
//! memory snapshot, then enforces retention.
//!
//! Runs as a background task (`tokio::spawn` + `tokio::time::interval`),
//! logging and retrying a failed tick rather than propagating it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{Config, EntityKind};
use crate::dedup::DedupLru;
use crate::mirror::Mirror;
use crate::model::{DataItem, FlashDataItem, MobileExternalDatum, QualityCodedDatum, FOREIGN_PRODUCER, ROAD_PRODUCER};
use crate::snapshot::MemorySnapshot;
use crate::upstream::{PullWindow, UpstreamStore};

/// Per-entity-kind high-water marks (spec §4.5). `now` is injected rather
/// than read from the system clock so tests can drive clock-regression
/// scenarios deterministically.
#[derive(Debug, Clone, Copy)]
pub struct Watermark {
    pub obs_time: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            obs_time: initial,
            modified_at: initial,
        }
    }

    /// Resolves this tick's pull window, applying the clock-regression
    /// guard: if `now - modified_at >= guard_days`, the query switches to
    /// the obs-time watermark instead (spec §4.5).
    fn pull_window(&self, now: DateTime<Utc>, guard_days: i64) -> PullWindow {
        let regressed = (now - self.modified_at).num_days() >= guard_days;
        PullWindow {
            modified_since: self.modified_at,
            obs_time_since: self.obs_time,
            use_obs_time_watermark: regressed,
        }
    }

    fn advance(&mut self, obs_time: DateTime<Utc>, modified_at: DateTime<Utc>) {
        if obs_time > self.obs_time {
            self.obs_time = obs_time;
        }
        if modified_at > self.modified_at {
            self.modified_at = modified_at;
        }
    }
}

fn producer_name(prod_id: i32) -> String {
    match prod_id {
        FOREIGN_PRODUCER => "foreign".to_string(),
        ROAD_PRODUCER => "road".to_string(),
        other => format!("producer_{other}"),
    }
}

fn log_if_large_sweep(kind: &str, oldest: DateTime<Utc>, newest: DateTime<Utc>, threshold_hours: i64) {
    let span = newest - oldest;
    if span.num_hours() >= threshold_hours {
        tracing::warn!(
            entity = kind,
            hours = span.num_hours(),
            "large ingest sweep: {kind} delta spans {}h",
            span.num_hours()
        );
    }
}

/// Owns the watermarks and dedup LRUs for one entity kind's maintenance
/// tick. A separate instance runs per kind so a slow/stalled kind never
/// blocks the others.
pub struct IngestState {
    pub observation_watermark: Watermark,
    pub flash_watermark: Watermark,
    pub quality_coded_watermark: Watermark,
    pub mobile_external_watermark: Watermark,
    pub observation_dedup: DedupLru,
    pub flash_dedup: DedupLru,
    pub quality_coded_dedup: DedupLru,
    pub mobile_external_dedup: DedupLru,
}

impl IngestState {
    pub fn new(config: &Config, initial: DateTime<Utc>) -> Self {
        Self {
            observation_watermark: Watermark::new(initial),
            flash_watermark: Watermark::new(initial),
            quality_coded_watermark: Watermark::new(initial),
            mobile_external_watermark: Watermark::new(initial),
            observation_dedup: DedupLru::new(config.dedup_capacity(EntityKind::Observation)),
            flash_dedup: DedupLru::new(config.dedup_capacity(EntityKind::Flash)),
            quality_coded_dedup: DedupLru::new(config.dedup_capacity(EntityKind::WeatherDataQc)),
            mobile_external_dedup: DedupLru::new(config.dedup_capacity(EntityKind::MobileExternal)),
        }
    }
}

pub struct IngestMaintainer {
    upstream: Arc<dyn UpstreamStore>,
    mirror: Arc<Mirror>,
    observation_snapshot: Arc<MemorySnapshot<DataItem>>,
    flash_snapshot: Arc<MemorySnapshot<FlashDataItem>>,
    quality_coded_snapshot: Arc<MemorySnapshot<QualityCodedDatum>>,
    mobile_external_snapshot: Arc<MemorySnapshot<MobileExternalDatum>>,
    config: Config,
    shutdown: Arc<AtomicBool>,
}

impl IngestMaintainer {
    pub fn new(
        upstream: Arc<dyn UpstreamStore>,
        mirror: Arc<Mirror>,
        observation_snapshot: Arc<MemorySnapshot<DataItem>>,
        flash_snapshot: Arc<MemorySnapshot<FlashDataItem>>,
        quality_coded_snapshot: Arc<MemorySnapshot<QualityCodedDatum>>,
        mobile_external_snapshot: Arc<MemorySnapshot<MobileExternalDatum>>,
        config: Config,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            upstream,
            mirror,
            observation_snapshot,
            flash_snapshot,
            quality_coded_snapshot,
            mobile_external_snapshot,
            config,
            shutdown,
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Spawns the periodic maintenance loop as a background task. Mirrors
    /// `spawn_retention_enforcer`'s shape: tick on an interval, log and
    /// continue on error rather than aborting the task.
    pub fn spawn(self: Arc<Self>, mut state: IngestState, now: DateTime<Utc>) {
        let interval_secs = self.config.ingest.poll_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            let mut clock = now;
            loop {
                interval.tick().await;
                if self.is_shutting_down() {
                    tracing::info!("ingest maintainer: shutdown flag set, stopping");
                    return;
                }
                clock += chrono::Duration::seconds(interval_secs as i64);
                if let Err(e) = self.tick(&mut state, clock).await {
                    tracing::error!("ingest maintainer tick failed: {e}");
                }
            }
        });
    }

    /// Runs one maintenance tick: pull, commit, retention sweep. Exposed
    /// directly (not just via `spawn`) so tests can drive it deterministically.
    pub async fn tick(&self, state: &mut IngestState, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.tick_observations(state, now).await?;
        if self.is_shutting_down() {
            return Ok(());
        }
        self.tick_flashes(state, now).await?;
        if self.is_shutting_down() {
            return Ok(());
        }
        self.tick_quality_coded(state, now).await?;
        if self.is_shutting_down() {
            return Ok(());
        }
        self.tick_mobile_external(state, now).await?;
        Ok(())
    }

    async fn tick_observations(&self, state: &mut IngestState, now: DateTime<Utc>) -> anyhow::Result<()> {
        let window = state.observation_watermark.pull_window(now, self.config.ingest.modified_watermark_guard_days);
        let rows = self.upstream.pull_observations(window).await?;
        if rows.is_empty() {
            return Ok(());
        }
        log_if_large_sweep(
            "observation",
            rows.first().unwrap().data_time,
            rows.last().unwrap().data_time,
            self.config.ingest.large_sweep_hours,
        );

        let fresh: Vec<DataItem> = rows
            .into_iter()
            .filter(|item| !state.observation_dedup.exists(item.hash_value()))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        self.mirror.upsert_observations(&fresh)?;
        for item in &fresh {
            state.observation_dedup.add(item.hash_value());
            state.observation_watermark.advance(item.data_time, item.modified_last);
        }
        self.observation_snapshot.fill(&fresh);

        let cutoff = now - chrono::Duration::days(self.config.mirror_retention_days(EntityKind::Observation));
        self.mirror.range_delete_observations(cutoff)?;
        self.observation_snapshot
            .clean(now - chrono::Duration::hours(self.config.memory_retention_hours(EntityKind::Observation)));
        Ok(())
    }

    async fn tick_flashes(&self, state: &mut IngestState, now: DateTime<Utc>) -> anyhow::Result<()> {
        let window = state.flash_watermark.pull_window(now, self.config.ingest.modified_watermark_guard_days);
        let rows = self.upstream.pull_flashes(window).await?;
        if rows.is_empty() {
            return Ok(());
        }
        log_if_large_sweep(
            "flash",
            rows.first().unwrap().stroke_time,
            rows.last().unwrap().stroke_time,
            self.config.ingest.large_sweep_hours,
        );

        let fresh: Vec<FlashDataItem> = rows
            .into_iter()
            .filter(|item| !state.flash_dedup.exists(item.hash_value()))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        self.mirror.upsert_flashes(&fresh)?;
        for item in &fresh {
            state.flash_dedup.add(item.hash_value());
            state.flash_watermark.advance(item.stroke_time, item.modified_last);
        }
        self.flash_snapshot.fill(&fresh);

        let cutoff = now - chrono::Duration::days(self.config.mirror_retention_days(EntityKind::Flash));
        self.mirror.range_delete_flashes(cutoff)?;
        self.flash_snapshot
            .clean(now - chrono::Duration::hours(self.config.memory_retention_hours(EntityKind::Flash)));
        Ok(())
    }

    async fn tick_quality_coded(&self, state: &mut IngestState, now: DateTime<Utc>) -> anyhow::Result<()> {
        let window = state
            .quality_coded_watermark
            .pull_window(now, self.config.ingest.modified_watermark_guard_days);
        let rows = self.upstream.pull_quality_coded(window).await?;
        if rows.is_empty() {
            return Ok(());
        }
        log_if_large_sweep(
            "weather_data_qc",
            rows.first().unwrap().obstime,
            rows.last().unwrap().obstime,
            self.config.ingest.large_sweep_hours,
        );

        let fresh: Vec<QualityCodedDatum> = rows
            .into_iter()
            .filter(|item| !state.quality_coded_dedup.exists(item.hash_value()))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        self.mirror.upsert_quality_coded(&fresh)?;
        for item in &fresh {
            state.quality_coded_dedup.add(item.hash_value());
            state.quality_coded_watermark.advance(item.obstime, item.modified_last);
        }
        self.quality_coded_snapshot.fill(&fresh);

        let cutoff = now - chrono::Duration::days(self.config.mirror_retention_days(EntityKind::WeatherDataQc));
        self.mirror.range_delete_quality_coded(cutoff)?;
        self.quality_coded_snapshot
            .clean(now - chrono::Duration::hours(self.config.memory_retention_hours(EntityKind::WeatherDataQc)));
        Ok(())
    }

    async fn tick_mobile_external(&self, state: &mut IngestState, now: DateTime<Utc>) -> anyhow::Result<()> {
        let window = state
            .mobile_external_watermark
            .pull_window(now, self.config.ingest.modified_watermark_guard_days);
        let rows = self.upstream.pull_mobile_external(window).await?;
        if rows.is_empty() {
            return Ok(());
        }
        log_if_large_sweep(
            "mobile_external",
            rows.first().unwrap().data_time,
            rows.last().unwrap().data_time,
            self.config.ingest.large_sweep_hours,
        );

        let fresh: Vec<MobileExternalDatum> = rows
            .into_iter()
            .filter(|item| !state.mobile_external_dedup.exists(item.hash_value()))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let mut by_producer: std::collections::HashMap<String, Vec<MobileExternalDatum>> = std::collections::HashMap::new();
        for item in &fresh {
            by_producer.entry(producer_name(item.prod_id)).or_default().push(item.clone());
        }
        for (producer, items) in &by_producer {
            self.mirror.upsert_mobile_external(producer, items)?;
        }
        for item in &fresh {
            state.mobile_external_dedup.add(item.hash_value());
            state.mobile_external_watermark.advance(item.data_time, item.created);
        }
        self.mobile_external_snapshot.fill(&fresh);

        let cutoff = now - chrono::Duration::days(self.config.mirror_retention_days(EntityKind::MobileExternal));
        for producer in by_producer.keys() {
            self.mirror.range_delete_mobile_external(producer, cutoff)?;
        }
        self.mobile_external_snapshot
            .clean(now - chrono::Duration::hours(self.config.memory_retention_hours(EntityKind::MobileExternal)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::InMemoryUpstream;
    use chrono::TimeZone;

    fn make_maintainer(upstream: InMemoryUpstream) -> (Arc<IngestMaintainer>, IngestState) {
        let config = Config::default();
        let mirror = Arc::new(Mirror::open_in_memory(config.cache.insert_batch_size).unwrap());
        let observation_snapshot = Arc::new(MemorySnapshot::<DataItem>::new());
        let flash_snapshot = Arc::new(MemorySnapshot::<FlashDataItem>::new());
        let quality_coded_snapshot = Arc::new(MemorySnapshot::<QualityCodedDatum>::new());
        let mobile_external_snapshot = Arc::new(MemorySnapshot::<MobileExternalDatum>::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let maintainer = Arc::new(IngestMaintainer::new(
            Arc::new(upstream),
            mirror,
            observation_snapshot,
            flash_snapshot,
            quality_coded_snapshot,
            mobile_external_snapshot,
            config.clone(),
            shutdown,
        ));
        let state = IngestState::new(&config, Utc.timestamp_opt(0, 0).unwrap());
        (maintainer, state)
    }

    #[tokio::test]
    async fn tick_ingests_fresh_observations_and_advances_watermark() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let upstream = InMemoryUpstream {
            observations: vec![DataItem {
                fmisid: 1,
                data_time: t,
                modified_last: t,
                data_value: Some(5.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (maintainer, mut state) = make_maintainer(upstream);
        maintainer.tick(&mut state, t).await.unwrap();

        assert_eq!(state.observation_watermark.obs_time, t);
        assert_eq!(maintainer.observation_snapshot.len(), 1);
        assert_eq!(maintainer.mirror.range_query_observations(&[1], t, t, &crate::filter::DataFilter::new()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_tick_does_not_reinsert_already_seen_rows() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let upstream = InMemoryUpstream {
            observations: vec![DataItem {
                fmisid: 1,
                data_time: t,
                modified_last: t,
                data_value: Some(5.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (maintainer, mut state) = make_maintainer(upstream);
        maintainer.tick(&mut state, t).await.unwrap();
        maintainer.tick(&mut state, t).await.unwrap();
        assert_eq!(state.observation_dedup.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_subsequent_entity_kinds_mid_tick() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let upstream = InMemoryUpstream {
            observations: vec![DataItem {
                fmisid: 1,
                data_time: t,
                modified_last: t,
                data_value: Some(5.0),
                ..Default::default()
            }],
            flashes: vec![FlashDataItem {
                stroke_time: t,
                modified_last: t,
                ..Default::default()
            }],
            ..Default::default()
        };
        let (maintainer, mut state) = make_maintainer(upstream);
        maintainer.shutdown.store(true, Ordering::Relaxed);
        maintainer.tick(&mut state, t).await.unwrap();
        assert_eq!(maintainer.flash_snapshot.len(), 0);
    }

    #[test]
    fn clock_regression_guard_flips_watermark_choice() {
        let old = Utc.timestamp_opt(0, 0).unwrap();
        let now = old + chrono::Duration::days(400);
        let watermark = Watermark::new(old);
        let window = watermark.pull_window(now, 366);
        assert!(window.use_obs_time_watermark);
    }

    #[test]
    fn no_regression_keeps_modified_watermark() {
        let old = Utc.timestamp_opt(0, 0).unwrap();
        let now = old + chrono::Duration::days(10);
        let watermark = Watermark::new(old);
        let window = watermark.pull_window(now, 366);
        assert!(!window.use_obs_time_watermark);
    }
}
