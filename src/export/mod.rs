//! Export of volumes to interchange files.
//!
//! The output format follows the file extension:
//!
//! | Extension       | Output                                          |
//! |-----------------|-------------------------------------------------|
//! | `.nii`          | NIfTI-1 file with spacing in `pixdim`           |
//! | `.nii.gz`       | gzip-compressed NIfTI-1 file                    |
//! | `.n5`           | local N5 container with the volume at `/data`   |
//! | `.jpg`, `.jpeg` | grayscale maximum-intensity projection preview  |
//!
//! Exporting a [`LazyVolume`] materialises it first, so the volume has to
//! fit in memory.

mod preview;

use std::fmt;
use std::path::Path;

use serde_json::json;
use tracing::info;

use crate::error::ExportError;
use crate::format::n5::{
    write_dataset, Compression, WriteOptions, DEFAULT_WRITE_BLOCK_SIZE,
    DOWNSAMPLING_FACTORS_KEY, PIXEL_RESOLUTION_KEY,
};
use crate::format::nifti::{write_nifti, NiftiImage};
use crate::volume::{LazyVolume, Spacing, VolumeArray};

pub use preview::{
    encode_preview, max_intensity_projection, rescale_to_u8, Projection, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};

/// Dataset written inside `.n5` exports.
pub const DEFAULT_EXPORT_DATASET: &str = "data";

/// Interchange formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Nifti,
    N5,
    Jpeg,
}

impl ExportFormat {
    /// Pick the format from the extension of `path` (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            return Ok(ExportFormat::Nifti);
        }
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("n5") => Ok(ExportFormat::N5),
            Some("jpg") | Some("jpeg") => Ok(ExportFormat::Jpeg),
            _ => Err(ExportError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Nifti => write!(f, "NIfTI"),
            ExportFormat::N5 => write!(f, "N5"),
            ExportFormat::Jpeg => write!(f, "JPEG"),
        }
    }
}

/// Export settings. Fields that do not apply to the chosen format are ignored.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Voxel spacing recorded in NIfTI and N5 outputs
    pub spacing: Option<Spacing>,

    /// N5 block compression
    pub compression: Compression,

    /// N5 block edge
    pub block_size: usize,

    /// Dataset path inside N5 outputs
    pub dataset: String,

    /// Preview JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            spacing: None,
            compression: Compression::gzip(),
            block_size: DEFAULT_WRITE_BLOCK_SIZE,
            dataset: DEFAULT_EXPORT_DATASET.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ExportOptions {
    pub fn with_spacing(mut self, spacing: Spacing) -> Self {
        self.spacing = Some(spacing);
        self
    }
}

/// Materialise `volume` and write it to `path`.
pub async fn export_volume(
    volume: &LazyVolume,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportFormat, ExportError> {
    // Fail on the extension before reading anything
    let format = ExportFormat::from_path(path)?;

    info!(
        "Materializing {} ({:?}, {}, {} bytes)",
        volume.location(),
        volume.shape(),
        volume.data_type(),
        volume.size_in_bytes()
    );
    let array = volume.materialize().await?;

    write_array(&array, path, format, options).await?;
    Ok(format)
}

/// Write an in-memory volume to `path`.
pub async fn export_array(
    array: &VolumeArray,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportFormat, ExportError> {
    let format = ExportFormat::from_path(path)?;
    write_array(array, path, format, options).await?;
    Ok(format)
}

/// Read back a NIfTI file written by [`export_array`].
pub async fn read_nifti(path: &Path) -> Result<NiftiImage, ExportError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || crate::format::nifti::read_nifti(&target))
        .await
        .map_err(|e| ExportError::Nifti {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
}

async fn write_array(
    array: &VolumeArray,
    path: &Path,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<(), ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    match format {
        ExportFormat::Nifti => {
            let array = array.clone();
            let target = path.to_path_buf();
            let spacing = options.spacing;
            tokio::task::spawn_blocking(move || write_nifti(&target, &array, spacing.as_ref()))
                .await
                .map_err(|e| ExportError::Nifti {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })??;
        }
        ExportFormat::N5 => {
            let mut write_options = WriteOptions::cubic(array.ndim(), options.block_size)
                .with_compression(options.compression);
            if let (Some(spacing), 3) = (options.spacing, array.ndim()) {
                write_options = write_options
                    .with_attribute(PIXEL_RESOLUTION_KEY, json!(spacing.to_xyz()))
                    .with_attribute(DOWNSAMPLING_FACTORS_KEY, json!([1, 1, 1]));
            }
            write_dataset(path, &options.dataset, array, &write_options).await?;
        }
        ExportFormat::Jpeg => {
            let bytes = encode_preview(array, options.jpeg_quality)?;
            tokio::fs::write(path, &bytes).await.map_err(io_error)?;
        }
    }

    info!(
        "Exported {:?} {} volume to {} ({})",
        array.shape(),
        array.data_type(),
        path.display(),
        format
    );
    Ok(())
}
