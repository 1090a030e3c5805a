//! Command line demo of the history engine.
//!
//! Generates one minute of synthetic samples at 100 ms resolution, stores them
//! with down-sampling, resamples a set of labeled events and prints what a
//! chart would query.
//!
//! Set `RUST_LOG=debug` to follow bucket writes and down-sampling.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use env_logger::{Builder, Env};
use log::{error, info};

use chart_history::discrete::{DiscreteDataEntry, DiscreteSeries, DiscreteTimelineData};
use chart_history::storage::codec::{read_bucket, write_bucket};
use chart_history::storage::manager::InMemoryHistoryStorage;
use chart_history::storage::{
    DataSeriesId, DecimalSeriesIndex, HistoryBucket, HistoryBucketDescriptor, HistoryChunkAppender,
    HistoryConfiguration, HistoryEnum, HistoryEnumSet, SearchMode, search,
};
use chart_history::{Result, SamplingPeriod, StorageConfig};

/// Start of the generated data, 2023-04-04 08:56:00 UTC
const START_MS: f64 = 1_680_598_560_000.0;

/// Distance between two generated samples
const SAMPLE_PERIOD: SamplingPeriod = SamplingPeriod::EveryHundredMillis;

/// Number of generated samples (one minute)
const SAMPLE_COUNT: usize = 600;

/// Generates synthetic readings that vary over time
struct MockSensorGenerator {
    elapsed_secs: f64,
}

impl MockSensorGenerator {
    fn new() -> Self {
        Self { elapsed_secs: 0.0 }
    }

    /// Advance the internal clock and return temperature and pump state
    fn next_sample(&mut self, dt_secs: f64) -> (f64, HistoryEnumSet) {
        self.elapsed_secs += dt_secs;
        let t = self.elapsed_secs;

        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 12.0).sin() + 0.5 * (t / 3.7).cos();
        let pump = if temperature > 24.0 {
            HistoryEnumSet::TRUE
        } else {
            HistoryEnumSet::FALSE
        };
        (temperature, pump)
    }
}

fn sensor_configuration() -> Result<Arc<HistoryConfiguration>> {
    Ok(Arc::new(
        HistoryConfiguration::builder()
            .decimal_series(DataSeriesId(1), "Temperature", Some("°C"))
            .enum_series(DataSeriesId(2), "Pump", HistoryEnum::boolean())
            .build()?,
    ))
}

fn event_configuration() -> Result<Arc<HistoryConfiguration>> {
    Ok(Arc::new(
        HistoryConfiguration::builder()
            .reference_entry_series(DataSeriesId(10), "Operator", HistoryEnum::boolean())
            .reference_entry_series(DataSeriesId(11), "Machine", HistoryEnum::boolean())
            .build()?,
    ))
}

/// Stores the generated samples, one chunk per bucket
fn record_samples(storage: &InMemoryHistoryStorage) -> Result<()> {
    let configuration = sensor_configuration()?;
    let mut generator = MockSensorGenerator::new();
    let mut appender = HistoryChunkAppender::new(configuration.clone());
    let mut descriptor = HistoryBucketDescriptor::for_timestamp(START_MS, SAMPLE_PERIOD);

    for step in 0..SAMPLE_COUNT {
        let timestamp = START_MS + step as f64 * SAMPLE_PERIOD.distance();
        if !descriptor.contains(timestamp) {
            let full = std::mem::replace(
                &mut appender,
                HistoryChunkAppender::new(configuration.clone()),
            );
            let bucket = HistoryBucket::new(descriptor, full.finish())?;
            storage.store_and_down_sample(bucket)?;
            descriptor = HistoryBucketDescriptor::for_timestamp(timestamp, SAMPLE_PERIOD);
        }

        let (temperature, pump) = generator.next_sample(SAMPLE_PERIOD.distance() / 1000.0);
        appender.append(timestamp, &[temperature], &[pump], &[])?;
    }

    if !appender.is_empty() {
        let bucket = HistoryBucket::new(descriptor, appender.finish())?;
        storage.store_and_down_sample(bucket)?;
    }
    Ok(())
}

fn print_queries(storage: &InMemoryHistoryStorage) -> Result<()> {
    let end = START_MS + SAMPLE_COUNT as f64 * SAMPLE_PERIOD.distance();

    let periods = [
        SamplingPeriod::EveryHundredMillis,
        SamplingPeriod::EverySecond,
        SamplingPeriod::EveryTenSeconds,
    ];
    for period in periods {
        let buckets = storage.query(START_MS, end, period)?;
        let samples: usize = buckets.iter().map(|bucket| bucket.chunk().timestamp_count()).sum();
        info!("{}: {} buckets, {} samples", period, buckets.len(), samples);

        for bucket in &buckets {
            if let Some((min, max)) = bucket.chunk().find_min_max(DecimalSeriesIndex(0)) {
                info!("  {} min {:.2} max {:.2}", bucket.descriptor(), min, max);
            }
        }
    }

    let buckets = storage.query(START_MS, end, SamplingPeriod::EverySecond)?;
    let query_at = START_MS + 30_250.0;
    match search(&buckets, query_at, SearchMode::NearestBefore { max_distance: 1_000.0 }) {
        Some(hit) => info!(
            "Nearest sample before {} at {}: {:.2}",
            query_at,
            hit.timestamp(),
            hit.chunk().decimal_value_at(DecimalSeriesIndex(0), hit.timestamp_index)
        ),
        None => info!("No sample within 1 s before {}", query_at),
    }

    if let Some(bucket) = buckets.first() {
        println!("{}", bucket.chunk().dump());
    }
    Ok(())
}

/// Writes the down-sampled buckets to a temporary directory and reads them back
fn persist(storage: &InMemoryHistoryStorage) -> Result<()> {
    let dir = std::env::temp_dir().join("chart-history-demo");
    std::fs::create_dir_all(&dir)?;

    let end = START_MS + SAMPLE_COUNT as f64 * SAMPLE_PERIOD.distance();
    for bucket in storage.query(START_MS, end, SamplingPeriod::EverySecond)? {
        let path = write_bucket(&dir, &bucket)?;
        let restored = read_bucket(&dir, bucket.descriptor())?;
        info!(
            "{} restored {} samples",
            path.display(),
            restored.map_or(0, |bucket| bucket.chunk().timestamp_count())
        );
    }
    Ok(())
}

fn resample_events(config: &StorageConfig) -> Result<()> {
    let entry = |start: f64, end: f64, label: &str| {
        DiscreteDataEntry::new(start, end, label, HistoryEnumSet::TRUE)
    };

    let data = DiscreteTimelineData::with_config(
        vec![
            DiscreteSeries::new(vec![
                entry(1680598565461.0, 1680598566461.0, "Stumbled over switch")?,
                entry(1680598566461.0, 1680598567461.0, "Turned switch off")?,
            ])?,
            DiscreteSeries::new(vec![
                entry(1680598565961.0, 1680598566961.0, "Everything is fine")?,
                entry(1680598566961.0, 1680598567961.0, "Fuel is empty")?,
            ])?,
        ],
        config,
    )
    .with_default_entry_duration(10.0);

    match data.to_chunk(&event_configuration()?)? {
        Some((chunk, period)) => {
            info!(
                "Resampled events into {} timestamps at {}, {} entries",
                chunk.timestamp_count(),
                period,
                chunk.reference_entry_data_count()
            );
        }
        None => info!("No events to resample"),
    }
    Ok(())
}

fn run() -> Result<()> {
    let config = StorageConfig::default();
    let storage = InMemoryHistoryStorage::new(config);

    let updates = Arc::new(AtomicUsize::new(0));
    {
        let updates = updates.clone();
        storage.observe(move |_| {
            updates.fetch_add(1, Ordering::Relaxed);
        });
    }

    record_samples(&storage)?;
    info!(
        "Stored {} buckets, {} updates observed",
        storage.bucket_count(),
        updates.load(Ordering::Relaxed)
    );

    print_queries(&storage)?;
    persist(&storage)?;
    resample_events(&config)
}

fn main() {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting chart-history demo");

    if let Err(e) = run() {
        error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}
