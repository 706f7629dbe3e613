//! Export integration tests.
//!
//! Tests verify:
//! - A (10, 10, 10) volume round-trips exactly through NIfTI
//! - N5 exports read back with their spacing
//! - JPEG previews have the projected plane's dimensions
//! - Unknown extensions fail before anything is written

use easifish_register::error::ExportError;
use easifish_register::export::{export_volume, read_nifti, ExportFormat, ExportOptions};
use easifish_register::io::StoreOptions;
use easifish_register::volume::{DatasetLoader, Spacing};

use nifti::{NiftiObject, ReaderOptions};

use super::test_utils::{ramp_volume, write_level, LevelMetadata};

async fn open_fixture(dir: &std::path::Path) -> easifish_register::ResolutionLevel {
    write_level(
        dir,
        "highres",
        &ramp_volume([10, 10, 10]),
        4,
        Some(LevelMetadata::new([0.5, 0.5, 2.0], [1.0, 1.0, 1.0])),
    )
    .await;
    DatasetLoader::open(dir.to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap()
        .load_level("highres")
        .await
        .unwrap()
}

// =============================================================================
// NIfTI
// =============================================================================

#[tokio::test]
async fn test_nifti_round_trip_10x10x10() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let level = open_fixture(input.path()).await;

    let path = output.path().join("aligned.nii");
    let options = ExportOptions::default().with_spacing(level.spacing);
    let format = export_volume(&level.volume, &path, &options).await.unwrap();
    assert_eq!(format, ExportFormat::Nifti);

    let image = read_nifti(&path).await.unwrap();
    assert_eq!(image.array.shape(), &[10, 10, 10]);
    assert_eq!(image.array, ramp_volume([10, 10, 10]));
    assert_eq!(image.spacing, Some(level.spacing));
    assert_eq!(level.spacing.as_array(), [2.0, 0.5, 0.5]);
}

#[tokio::test]
async fn test_nifti_header_read_by_reference_reader() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let level = open_fixture(input.path()).await;

    let path = output.path().join("aligned.nii.gz");
    let options = ExportOptions::default().with_spacing(level.spacing);
    export_volume(&level.volume, &path, &options).await.unwrap();

    let object = ReaderOptions::new().read_file(&path).unwrap();
    let header = object.header();
    assert_eq!(&header.dim[..4], &[3, 10, 10, 10]);
    // x, y, z voxel sizes
    assert_eq!(&header.pixdim[1..4], &[0.5, 0.5, 2.0]);
}

#[tokio::test]
async fn test_nifti_gzip_round_trip() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let level = open_fixture(input.path()).await;

    let raw_path = output.path().join("raw.nii");
    let gz_path = output.path().join("gz.nii.gz");
    let options = ExportOptions::default();
    export_volume(&level.volume, &raw_path, &options).await.unwrap();
    export_volume(&level.volume, &gz_path, &options).await.unwrap();

    let raw_len = tokio::fs::metadata(&raw_path).await.unwrap().len();
    let gz = tokio::fs::read(&gz_path).await.unwrap();
    assert_eq!(&gz[..2], &[0x1f, 0x8b]);
    assert!((gz.len() as u64) < raw_len);

    let image = read_nifti(&gz_path).await.unwrap();
    assert_eq!(image.array, ramp_volume([10, 10, 10]));
}

// =============================================================================
// N5
// =============================================================================

#[tokio::test]
async fn test_n5_export_reads_back_with_spacing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let level = open_fixture(input.path()).await;

    let path = output.path().join("copy.n5");
    let options = ExportOptions {
        block_size: 3,
        ..ExportOptions::default().with_spacing(level.spacing)
    };
    assert_eq!(
        export_volume(&level.volume, &path, &options).await.unwrap(),
        ExportFormat::N5
    );

    let copy = DatasetLoader::open(path.to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap()
        .load_level("data")
        .await
        .unwrap();
    assert_eq!(copy.spacing, level.spacing);
    assert_eq!(copy.volume.chunk_shape(), &[3, 3, 3]);
    assert_eq!(
        copy.volume.materialize().await.unwrap(),
        ramp_volume([10, 10, 10])
    );
}

// =============================================================================
// JPEG Preview
// =============================================================================

#[tokio::test]
async fn test_jpeg_preview() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_level(input.path(), "highres", &ramp_volume([3, 6, 9]), 4, None).await;

    let level = DatasetLoader::open(input.path().to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap()
        .load_level_with_spacing("highres", Some(Spacing::uniform(1.0).unwrap()))
        .await
        .unwrap();

    let path = output.path().join("preview.jpg");
    export_volume(&level.volume, &path, &ExportOptions::default())
        .await
        .unwrap();

    let bytes = tokio::fs::read(&path).await.unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg).unwrap();
    assert_eq!((img.width(), img.height()), (9, 6));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_unsupported_extension() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let level = open_fixture(input.path()).await;

    let path = output.path().join("aligned.tiff");
    let err = export_volume(&level.volume, &path, &ExportOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::UnsupportedFormat(_)));
    assert!(!path.exists());
}
