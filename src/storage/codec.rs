//! Binary persistence of buckets with `postcard`.
//!
//! Decoding re-checks every structural invariant, so a truncated or tampered
//! file is reported as an error instead of producing a broken bucket.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use super::bucket::{HistoryBucket, HistoryBucketDescriptor};
use super::chunk::HistoryChunk;
use crate::error::{HistoryError, Result};

/// Encoded form of a bucket; field order matches the `Serialize` output of [`HistoryBucket`]
#[derive(Deserialize)]
struct StoredBucket {
    descriptor: HistoryBucketDescriptor,
    chunk: HistoryChunk,
}

pub fn encode_bucket(bucket: &HistoryBucket) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(bucket)?)
}

/// Decodes and validates a bucket written by [`encode_bucket`]
pub fn decode_bucket(bytes: &[u8]) -> Result<HistoryBucket> {
    let stored: StoredBucket = postcard::from_bytes(bytes)?;
    stored.chunk.validate()?;
    HistoryBucket::new(stored.descriptor, stored.chunk)
}

/// File name of a bucket, e.g. `FiveSeconds_336119713.bucket`
pub fn bucket_file_name(descriptor: &HistoryBucketDescriptor) -> String {
    format!("{:?}_{}.bucket", descriptor.range(), descriptor.index())
}

pub fn bucket_path(dir: &Path, descriptor: &HistoryBucketDescriptor) -> PathBuf {
    dir.join(bucket_file_name(descriptor))
}

/// Writes `bucket` into `dir`, replacing an existing file
pub fn write_bucket(dir: &Path, bucket: &HistoryBucket) -> Result<PathBuf> {
    let path = bucket_path(dir, bucket.descriptor());
    fs::write(&path, encode_bucket(bucket)?)?;
    info!("Wrote bucket {} to {}", bucket.descriptor(), path.display());
    Ok(path)
}

/// Reads the bucket for `descriptor` from `dir`; `Ok(None)` if it was never written
pub fn read_bucket(dir: &Path, descriptor: &HistoryBucketDescriptor) -> Result<Option<HistoryBucket>> {
    let path = bucket_path(dir, descriptor);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let bucket = decode_bucket(&bytes).inspect_err(|e| {
        warn!("Failed to decode {}: {}", path.display(), e);
    })?;

    if bucket.descriptor() != descriptor {
        warn!(
            "{} holds bucket {} instead of {}",
            path.display(),
            bucket.descriptor(),
            descriptor
        );
        return Err(HistoryError::CorruptChunk(format!(
            "file holds bucket {}",
            bucket.descriptor()
        )));
    }
    Ok(Some(bucket))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sampling::SamplingPeriod;
    use crate::storage::HistoryBucketRange;
    use crate::storage::accumulator::calculate_down_sampled;
    use crate::storage::appender::{HistoryChunkAppender, ReferenceEntryCell};
    use crate::storage::chunk::{NO_VALUE, PENDING};
    use crate::storage::configuration::{DataSeriesId, HistoryConfiguration, HistoryEnum};
    use crate::storage::enum_set::HistoryEnumSet;
    use crate::storage::reference::{ReferenceEntryData, ReferenceEntryId};

    fn bucket() -> HistoryBucket {
        let configuration = Arc::new(
            HistoryConfiguration::builder()
                .decimal_series(DataSeriesId(1), "Pressure", Some("hPa"))
                .enum_series(DataSeriesId(2), "Pump", HistoryEnum::boolean())
                .reference_entry_series(DataSeriesId(3), "Events", HistoryEnum::boolean())
                .build()
                .unwrap(),
        );
        let mut appender = HistoryChunkAppender::new(configuration);
        let id = ReferenceEntryId(1001);
        appender.insert_reference_entry_data(
            ReferenceEntryData::new(id, "Pump started", 1000.0, 1500.0).with_payload("{\"rpm\":1200}"),
        );
        let cell = ReferenceEntryCell::new(id, HistoryEnumSet::TRUE);
        appender
            .append(1000.0, &[1013.25], &[HistoryEnumSet::TRUE], &[cell])
            .unwrap();
        appender
            .append(1001.0, &[NO_VALUE], &[HistoryEnumSet::NO_VALUE], &[ReferenceEntryCell::NO_VALUE])
            .unwrap();
        appender
            .append(1002.0, &[PENDING], &[HistoryEnumSet::PENDING], &[ReferenceEntryCell::PENDING])
            .unwrap();
        HistoryBucket::for_chunk(appender.finish(), SamplingPeriod::EveryMillisecond).unwrap()
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chart-history-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_decoded_bucket_matches() {
        let bucket = bucket();
        let decoded = decode_bucket(&encode_bucket(&bucket).unwrap()).unwrap();

        assert_eq!(decoded.descriptor(), bucket.descriptor());
        assert_eq!(decoded.chunk().timestamps(), bucket.chunk().timestamps());
        // NaN never compares equal, so compare the rendering instead of the values
        assert_eq!(decoded.chunk().dump(), bucket.chunk().dump());
        let data = decoded.chunk().reference_entry_data(ReferenceEntryId(1001)).unwrap();
        assert_eq!(data.payload.as_deref(), Some("{\"rpm\":1200}"));
    }

    #[test]
    fn test_calculated_bucket_survives_encoding() {
        let child = bucket();
        let parent = child.descriptor().parent().unwrap();
        let calculated = calculate_down_sampled(parent, &[child]).unwrap().unwrap();

        let decoded = decode_bucket(&encode_bucket(&calculated).unwrap()).unwrap();
        assert_eq!(decoded.chunk().recording_type(), calculated.chunk().recording_type());
        assert_eq!(decoded.chunk().dump(), calculated.chunk().dump());
    }

    #[test]
    fn test_truncated_bytes_are_rejected() {
        let bytes = encode_bucket(&bucket()).unwrap();
        let result = decode_bucket(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(HistoryError::Codec(_))));
    }

    #[test]
    fn test_bucket_mismatch_is_rejected() {
        let bucket = bucket();
        let chunk = bucket.chunk().clone();
        let wrong = HistoryBucketDescriptor::new(HistoryBucketRange::HundredMillis, 42);

        // Encode a descriptor and chunk that do not belong together
        let bytes = postcard::to_allocvec(&(wrong, chunk)).unwrap();
        let result = decode_bucket(&bytes);
        assert!(matches!(result, Err(HistoryError::TimestampOutsideBucket { .. })));
    }

    #[test]
    fn test_unordered_timestamps_are_rejected() {
        let bucket = bucket();
        let mut chunk = bucket.chunk().clone();
        chunk.timestamps.swap(0, 1);

        let bytes = postcard::to_allocvec(&(*bucket.descriptor(), chunk)).unwrap();
        let result = decode_bucket(&bytes);
        assert!(matches!(result, Err(HistoryError::NonMonotonicTimestamp { .. })));
    }

    #[test]
    fn test_file_name() {
        let descriptor = HistoryBucketDescriptor::new(HistoryBucketRange::FiveSeconds, 336119713);
        assert_eq!(bucket_file_name(&descriptor), "FiveSeconds_336119713.bucket");
    }

    #[test]
    fn test_write_and_read_bucket() {
        let dir = temp_dir("write-read");
        let bucket = bucket();

        let path = write_bucket(&dir, &bucket).unwrap();
        assert!(path.ends_with("HundredMillis_10.bucket"));

        let read = read_bucket(&dir, bucket.descriptor()).unwrap().unwrap();
        assert_eq!(read.chunk().dump(), bucket.chunk().dump());

        assert!(read_bucket(&dir, &bucket.descriptor().next()).unwrap().is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_corrupt_file() {
        let dir = temp_dir("corrupt");
        let bucket = bucket();
        fs::write(bucket_path(&dir, bucket.descriptor()), [0xff, 0xff, 0xff]).unwrap();

        assert!(read_bucket(&dir, bucket.descriptor()).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
