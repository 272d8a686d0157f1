use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use obs_cache::config::Config;
use obs_cache::dispatcher::Dispatcher;
use obs_cache::ingest::{IngestMaintainer, IngestState};
use obs_cache::mirror::Mirror;
use obs_cache::model::{DataItem, FlashDataItem, MobileExternalDatum, QualityCodedDatum};
use obs_cache::pool::WorkerPool;
use obs_cache::snapshot::MemorySnapshot;
use obs_cache::stations::{StationRegistry, StationResolver};
use obs_cache::upstream::{InMemoryUpstream, UpstreamStore};

/// Minimal host process wiring the cache tiers, station registry, pool, and
/// ingest loop together. Not the query service itself: the HTTP/reactor
/// layer that would sit in front of `Dispatcher::dispatch` is an external
/// collaborator (spec §1).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("obs_cache=info")))
        .init();

    let config_path = std::env::var("OBS_CACHE_CONFIG").unwrap_or_else(|_| "./obs-cache.toml".to_string());
    let config = Config::load(&config_path)?;

    let mirror_path = std::env::var("OBS_CACHE_MIRROR_DB").unwrap_or_else(|_| "./obs-cache-mirror.db".to_string());
    let mirror = Arc::new(Mirror::open(&mirror_path, config.cache.insert_batch_size)?);
    tracing::info!(path = %mirror_path, "persistent mirror opened");

    let observation_snapshot = Arc::new(MemorySnapshot::<DataItem>::new());
    let flash_snapshot = Arc::new(MemorySnapshot::<FlashDataItem>::new());
    let quality_coded_snapshot = Arc::new(MemorySnapshot::<QualityCodedDatum>::new());
    let mobile_external_snapshot = Arc::new(MemorySnapshot::<MobileExternalDatum>::new());

    let station_registry = Arc::new(StationRegistry::new());
    let _station_resolver = Arc::new(StationResolver::new(
        station_registry.clone(),
        config.stations.nearest_cache_capacity,
        config.stations.id_cache_capacity,
    ));

    let pool = Arc::new(WorkerPool::new(config.pool.size));
    tracing::info!(slots = config.pool.size, "worker pool ready");

    let _dispatcher = Dispatcher::new(observation_snapshot.clone(), mirror.clone(), Default::default());

    // The real upstream store is an external collaborator configured out of
    // band (spec §1); this demo binary wires an empty in-memory stand-in so
    // the maintenance loop has something to poll.
    let upstream: Arc<dyn UpstreamStore> = Arc::new(InMemoryUpstream::default());

    let shutdown = Arc::new(AtomicBool::new(false));
    let now = Utc::now();
    let state = IngestState::new(&config, now);
    let maintainer = Arc::new(IngestMaintainer::new(
        upstream,
        mirror,
        observation_snapshot,
        flash_snapshot,
        quality_coded_snapshot,
        mobile_external_snapshot,
        config.clone(),
        shutdown.clone(),
    ));
    maintainer.spawn(state, now);
    tracing::info!(interval_secs = config.ingest.poll_interval_secs, "ingest maintainer spawned");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    pool.close();

    Ok(())
}
