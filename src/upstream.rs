//! The authoritative upstream store (spec §1, §6): out of scope beyond the
//! semantic contract the ingest loop consumes from it. Modeled as a trait
//! object so the upstream SQL dialect never leaks into this crate — only
//! the interfaces the core actually consumes are specified here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{DataItem, FlashDataItem, MobileExternalDatum, QualityCodedDatum};
use crate::Result;

/// One entity kind's incremental pull window, already resolved by the
/// ingest loop's watermark/clock-regression logic (spec §4.5).
#[derive(Debug, Clone, Copy)]
pub struct PullWindow {
    pub modified_since: DateTime<Utc>,
    pub obs_time_since: DateTime<Utc>,
    /// True once the clock-regression guard has kicked in and the pull
    /// should bound by `obs_time_since` instead of `modified_since`.
    pub use_obs_time_watermark: bool,
}

#[async_trait]
pub trait UpstreamStore: Send + Sync {
    /// Rows sorted by (station, obs-time), per spec §4.5's pull ordering.
    async fn pull_observations(&self, window: PullWindow) -> Result<Vec<DataItem>>;

    /// Rows sorted by (stroke-time, flash-id).
    async fn pull_flashes(&self, window: PullWindow) -> Result<Vec<FlashDataItem>>;

    async fn pull_quality_coded(&self, window: PullWindow) -> Result<Vec<QualityCodedDatum>>;

    async fn pull_mobile_external(&self, window: PullWindow) -> Result<Vec<MobileExternalDatum>>;
}

/// In-memory stand-in used by tests and by the demo binary: holds a fixed
/// backlog and serves exactly what falls inside the requested window.
#[derive(Default)]
pub struct InMemoryUpstream {
    pub observations: Vec<DataItem>,
    pub flashes: Vec<FlashDataItem>,
    pub quality_coded: Vec<QualityCodedDatum>,
    pub mobile_external: Vec<MobileExternalDatum>,
}

impl InMemoryUpstream {
    fn watermark(window: PullWindow) -> DateTime<Utc> {
        if window.use_obs_time_watermark {
            window.obs_time_since
        } else {
            window.modified_since
        }
    }
}

#[async_trait]
impl UpstreamStore for InMemoryUpstream {
    async fn pull_observations(&self, window: PullWindow) -> Result<Vec<DataItem>> {
        let floor = Self::watermark(window);
        let mut rows: Vec<DataItem> = self
            .observations
            .iter()
            .filter(|item| item.modified_last >= floor)
            .cloned()
            .collect();
        rows.sort_by_key(|item| (item.fmisid, item.data_time));
        Ok(rows)
    }

    async fn pull_flashes(&self, window: PullWindow) -> Result<Vec<FlashDataItem>> {
        let floor = Self::watermark(window);
        let mut rows: Vec<FlashDataItem> = self
            .flashes
            .iter()
            .filter(|item| item.modified_last >= floor)
            .cloned()
            .collect();
        rows.sort_by_key(|item| (item.stroke_time, item.flash_id));
        Ok(rows)
    }

    async fn pull_quality_coded(&self, window: PullWindow) -> Result<Vec<QualityCodedDatum>> {
        let floor = Self::watermark(window);
        let mut rows: Vec<QualityCodedDatum> = self
            .quality_coded
            .iter()
            .filter(|item| item.modified_last >= floor)
            .cloned()
            .collect();
        rows.sort_by_key(|item| (item.fmisid, item.obstime));
        Ok(rows)
    }

    async fn pull_mobile_external(&self, window: PullWindow) -> Result<Vec<MobileExternalDatum>> {
        let floor = Self::watermark(window);
        let mut rows: Vec<MobileExternalDatum> = self
            .mobile_external
            .iter()
            .filter(|item| item.created >= floor)
            .cloned()
            .collect();
        rows.sort_by_key(|item| (item.prod_id, item.data_time));
        Ok(rows)
    }
}
