//! Dataset loading integration tests.
//!
//! Tests verify:
//! - Spacing is derived from resolution metadata in z, y, x order
//! - Missing levels and attributes fail instead of defaulting
//! - Region reads across gzip blocks, edge blocks and absent blocks
//! - Spacing overrides and their scaling onto the low-resolution level
//! - The object cache absorbs repeated reads

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;

use easifish_register::error::FormatError;
use easifish_register::format::n5::{N5Container, DOWNSAMPLING_FACTORS_KEY, PIXEL_RESOLUTION_KEY};
use easifish_register::io::{FsStore, ObjectCache, StoreOptions};
use easifish_register::volume::{DatasetLoader, Spacing};

use super::test_utils::{
    create_multiscale, ramp_volume, write_level, CountingStore, LevelMetadata,
};

// =============================================================================
// Spacing From Metadata
// =============================================================================

#[tokio::test]
async fn test_spacing_from_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let volume = ramp_volume([4, 4, 4]);
    write_level(
        dir.path(),
        "lowres",
        &volume,
        4,
        Some(LevelMetadata::new([1.0, 1.0, 1.0], [2.0, 2.0, 4.0])),
    )
    .await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let level = loader.load_level("lowres").await.unwrap();

    assert_eq!(level.spacing.as_array(), [4.0, 2.0, 2.0]);
    assert_eq!(level.volume.shape(), &[4, 4, 4]);
    assert_eq!(level.name, "lowres");
}

#[tokio::test]
async fn test_multiscale_levels_have_distinct_spacing() {
    let dir = tempfile::tempdir().unwrap();
    create_multiscale(dir.path(), [8, 10, 12], [0.23, 0.23, 0.42]).await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let dataset = loader.load_multiscale("lowres", "highres", None).await.unwrap();

    assert_eq!(dataset.highres.spacing.as_array(), [0.42, 0.23, 0.23]);
    assert_eq!(dataset.lowres.spacing.as_array(), [0.84, 0.46, 0.46]);
    assert_eq!(dataset.highres.volume.shape(), &[8, 10, 12]);
    assert_eq!(dataset.lowres.volume.shape(), &[4, 5, 6]);
}

#[tokio::test]
async fn test_object_form_pixel_resolution_with_unit() {
    let dir = tempfile::tempdir().unwrap();
    let volume = ramp_volume([2, 2, 2]);
    let options = easifish_register::WriteOptions::cubic(3, 2)
        .with_attribute(
            PIXEL_RESOLUTION_KEY,
            json!({"dimensions": [0.5, 0.5, 2.0], "unit": "um"}),
        )
        .with_attribute(DOWNSAMPLING_FACTORS_KEY, json!([1, 1, 1]));
    easifish_register::write_dataset(dir.path(), "highres", &volume, &options)
        .await
        .unwrap();

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let level = loader.load_level("highres").await.unwrap();
    assert_eq!(level.spacing.as_array(), [2.0, 0.5, 0.5]);
    assert_eq!(level.unit.as_deref(), Some("um"));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_highres_level_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_level(
        dir.path(),
        "lowres",
        &ramp_volume([2, 2, 2]),
        2,
        Some(LevelMetadata::new([1.0, 1.0, 1.0], [2.0, 2.0, 2.0])),
    )
    .await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    assert!(loader.load_level("lowres").await.is_ok());

    let err = loader.load_level("highres").await.unwrap_err();
    assert!(matches!(err, FormatError::MissingDataset(ref p) if p.ends_with("highres")));

    let err = loader
        .load_multiscale("lowres", "highres", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FormatError::MissingDataset(_)));
}

#[tokio::test]
async fn test_missing_attribute_fails() {
    let dir = tempfile::tempdir().unwrap();
    let volume = ramp_volume([2, 2, 2]);
    let options = easifish_register::WriteOptions::cubic(3, 2)
        .with_attribute(PIXEL_RESOLUTION_KEY, json!([1.0, 1.0, 1.0]));
    easifish_register::write_dataset(dir.path(), "highres", &volume, &options)
        .await
        .unwrap();

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let err = loader.load_level("highres").await.unwrap_err();
    assert!(matches!(
        err,
        FormatError::MissingAttribute {
            key: "downsamplingFactors",
            ..
        }
    ));
}

#[tokio::test]
async fn test_malformed_and_zero_metadata_fail() {
    let dir = tempfile::tempdir().unwrap();
    let volume = ramp_volume([2, 2, 2]);

    let options = easifish_register::WriteOptions::cubic(3, 2)
        .with_attribute(PIXEL_RESOLUTION_KEY, json!([1.0, 1.0]))
        .with_attribute(DOWNSAMPLING_FACTORS_KEY, json!([1, 1, 1]));
    easifish_register::write_dataset(dir.path(), "short", &volume, &options)
        .await
        .unwrap();

    let options = easifish_register::WriteOptions::cubic(3, 2)
        .with_attribute(PIXEL_RESOLUTION_KEY, json!([1.0, 1.0, 1.0]))
        .with_attribute(DOWNSAMPLING_FACTORS_KEY, json!([1, 0, 1]));
    easifish_register::write_dataset(dir.path(), "zero", &volume, &options)
        .await
        .unwrap();

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        loader.load_level("short").await,
        Err(FormatError::InvalidAttribute { .. })
    ));
    assert!(matches!(
        loader.load_level("zero").await,
        Err(FormatError::InvalidSpacing { .. })
    ));
}

#[tokio::test]
async fn test_not_an_n5_container() {
    let dir = tempfile::tempdir().unwrap();
    let err = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FormatError::MissingDataset(_)));
}

#[tokio::test]
async fn test_non_3d_level_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let plane = easifish_register::VolumeArray::from_elements(vec![4, 4], &[0u8; 16]).unwrap();
    write_level(dir.path(), "highres", &plane, 2, None).await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let err = loader
        .load_level_with_spacing("highres", Some(Spacing::uniform(1.0).unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FormatError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
}

// =============================================================================
// Spacing Overrides
// =============================================================================

#[tokio::test]
async fn test_override_skips_missing_metadata() {
    let dir = tempfile::tempdir().unwrap();
    write_level(dir.path(), "highres", &ramp_volume([2, 2, 2]), 2, None).await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    assert!(loader.load_level("highres").await.is_err());

    let spacing = Spacing::from_xyz([0.5, 0.5, 1.0]).unwrap();
    let level = loader
        .load_level_with_spacing("highres", Some(spacing))
        .await
        .unwrap();
    assert_eq!(level.spacing.as_array(), [1.0, 0.5, 0.5]);
}

#[tokio::test]
async fn test_override_is_scaled_onto_lowres() {
    let dir = tempfile::tempdir().unwrap();
    create_multiscale(dir.path(), [8, 8, 8], [1.0, 1.0, 1.0]).await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let spacing = Spacing::new([0.5, 0.25, 0.25]).unwrap();
    let dataset = loader
        .load_multiscale("lowres", "highres", Some(spacing))
        .await
        .unwrap();

    assert_eq!(dataset.highres.spacing, spacing);
    assert_eq!(dataset.lowres.spacing.as_array(), [1.0, 0.5, 0.5]);
}

// =============================================================================
// Region Reads
// =============================================================================

#[tokio::test]
async fn test_multi_block_gzip_reads() {
    let dir = tempfile::tempdir().unwrap();
    let volume = ramp_volume([7, 9, 10]);
    write_level(dir.path(), "highres", &volume, 4, None).await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let lazy = loader.container().open_dataset("highres").await.unwrap();
    assert_eq!(lazy.shape(), &[7, 9, 10]);
    assert_eq!(lazy.chunk_shape(), &[4, 4, 4]);

    let all = lazy.materialize().await.unwrap();
    assert_eq!(all, volume);

    // Box straddling two blocks on every axis, ending on the truncated edge
    let region = lazy.read_region(&[3, 2, 6], &[4, 7, 4]).await.unwrap();
    let values = region.to_elements::<u16>().unwrap();
    let mut expected = Vec::new();
    for z in 3..7u16 {
        for y in 2..9u16 {
            for x in 6..10u16 {
                expected.push(z * 100 + y * 10 + x);
            }
        }
    }
    assert_eq!(values, expected);
}

#[tokio::test]
async fn test_absent_blocks_read_as_zeros() {
    let dir = tempfile::tempdir().unwrap();
    write_level(dir.path(), "highres", &ramp_volume([8, 4, 4]), 4, None).await;
    tokio::fs::remove_file(dir.path().join("highres/0/0/1"))
        .await
        .unwrap();

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let lazy = loader.container().open_dataset("highres").await.unwrap();
    let values = lazy.materialize().await.unwrap().to_elements::<u16>().unwrap();

    assert_eq!(values[0], 0);
    assert_eq!(values[63], 3 * 100 + 3 * 10 + 3);
    assert!(values[64..].iter().all(|&v| v == 0));
}

#[tokio::test]
async fn test_out_of_bounds_region() {
    let dir = tempfile::tempdir().unwrap();
    write_level(dir.path(), "highres", &ramp_volume([4, 4, 4]), 4, None).await;

    let loader = DatasetLoader::open(dir.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap();
    let lazy = loader.container().open_dataset("highres").await.unwrap();
    assert!(matches!(
        lazy.read_region(&[0, 0, 2], &[1, 1, 3]).await,
        Err(FormatError::RegionOutOfBounds { .. })
    ));
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_cache_absorbs_repeated_reads() {
    let dir = tempfile::tempdir().unwrap();
    write_level(dir.path(), "highres", &ramp_volume([8, 8, 8]), 4, None).await;

    let counting = CountingStore::new(FsStore::new(dir.path()));
    let gets = counting.counter();
    let store = Arc::new(ObjectCache::with_capacity(counting, 64));

    let container = N5Container::open(store, dir.path().display().to_string())
        .await
        .unwrap();
    let lazy = container.open_dataset("highres").await.unwrap();

    lazy.materialize().await.unwrap();
    let after_first = gets.load(Ordering::SeqCst);
    // Root attributes, dataset attributes and 8 blocks
    assert_eq!(after_first, 10);

    lazy.materialize().await.unwrap();
    assert_eq!(gets.load(Ordering::SeqCst), after_first);
}
