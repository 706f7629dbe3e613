//! NIfTI-1 interchange files.
//!
//! NIfTI stores the first axis fastest, so a [`VolumeArray`] of shape
//! `(z, y, x)` is written with `dim = [x, y, z]` and its spacing goes into
//! `pixdim[1..=3]` in `x, y, z` order. A `.nii.gz` path is gzip-compressed.

use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};

use crate::error::ExportError;
use crate::format::n5::DataType;
use crate::volume::{Spacing, VolumeArray};

/// Largest axis count a NIfTI-1 header describes.
pub const MAX_NIFTI_DIMS: usize = 7;

/// Largest extent of one axis (`dim` entries are 16-bit).
const MAX_NIFTI_EXTENT: usize = i16::MAX as usize;

/// A NIfTI file read back into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiImage {
    /// Samples in array order
    pub array: VolumeArray,

    /// Spacing from `pixdim`, for 3D images with positive voxel sizes
    pub spacing: Option<Spacing>,
}

fn nifti_error(path: &Path) -> impl Fn(nifti::NiftiError) -> ExportError + '_ {
    move |e| ExportError::Nifti {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Header carrying the voxel size; dimensions and data type are filled in by
/// the writer.
fn header_for(ndim: usize, spacing: Option<&Spacing>) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0; 8];
    if let (Some(spacing), 3) = (spacing, ndim) {
        for (i, s) in spacing.to_xyz().iter().enumerate() {
            header.pixdim[i + 1] = *s as f32;
        }
    }
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header
}

macro_rules! write_as {
    ($ty:ty, $array:expr, $options:expr, $path:expr) => {{
        let values = $array.to_elements::<$ty>()?;
        let data = ArrayD::from_shape_vec(IxDyn($array.shape()), values)
            .map_err(|e| ExportError::UnsupportedShape {
                shape: $array.shape().to_vec(),
                reason: e.to_string(),
            })?
            .reversed_axes();
        $options.write_nifti(&data).map_err(nifti_error($path))
    }};
}

/// Write `array` to the NIfTI file at `path`.
pub fn write_nifti(
    path: &Path,
    array: &VolumeArray,
    spacing: Option<&Spacing>,
) -> Result<(), ExportError> {
    let shape = array.shape();
    if shape.is_empty() || shape.len() > MAX_NIFTI_DIMS {
        return Err(ExportError::UnsupportedShape {
            shape: shape.to_vec(),
            reason: format!("NIfTI holds 1 to {} axes", MAX_NIFTI_DIMS),
        });
    }
    if shape.iter().any(|&d| d == 0 || d > MAX_NIFTI_EXTENT) {
        return Err(ExportError::UnsupportedShape {
            shape: shape.to_vec(),
            reason: format!("NIfTI extents must be within 1..={}", MAX_NIFTI_EXTENT),
        });
    }

    let header = header_for(shape.len(), spacing);
    let options = WriterOptions::new(path).reference_header(&header);

    match array.data_type() {
        DataType::Uint8 => write_as!(u8, array, options, path),
        DataType::Uint16 => write_as!(u16, array, options, path),
        DataType::Uint32 => write_as!(u32, array, options, path),
        DataType::Uint64 => write_as!(u64, array, options, path),
        DataType::Int8 => write_as!(i8, array, options, path),
        DataType::Int16 => write_as!(i16, array, options, path),
        DataType::Int32 => write_as!(i32, array, options, path),
        DataType::Int64 => write_as!(i64, array, options, path),
        DataType::Float32 => write_as!(f32, array, options, path),
        DataType::Float64 => write_as!(f64, array, options, path),
    }
}

macro_rules! read_as {
    ($ty:ty, $volume:expr, $path:expr) => {{
        let data = $volume
            .into_ndarray::<$ty>()
            .map_err(nifti_error($path))?
            .reversed_axes();
        let shape = data.shape().to_vec();
        let values: Vec<$ty> = data.iter().copied().collect();
        VolumeArray::from_elements(shape, &values)?
    }};
}

/// Read a NIfTI file written by [`write_nifti`].
pub fn read_nifti(path: &Path) -> Result<NiftiImage, ExportError> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(nifti_error(path))?;
    let header = object.header().clone();
    let data_type = header.data_type().map_err(nifti_error(path))?;
    let volume = object.into_volume();

    let array = match data_type {
        NiftiType::Uint8 => read_as!(u8, volume, path),
        NiftiType::Uint16 => read_as!(u16, volume, path),
        NiftiType::Uint32 => read_as!(u32, volume, path),
        NiftiType::Uint64 => read_as!(u64, volume, path),
        NiftiType::Int8 => read_as!(i8, volume, path),
        NiftiType::Int16 => read_as!(i16, volume, path),
        NiftiType::Int32 => read_as!(i32, volume, path),
        NiftiType::Int64 => read_as!(i64, volume, path),
        NiftiType::Float32 => read_as!(f32, volume, path),
        NiftiType::Float64 => read_as!(f64, volume, path),
        other => {
            return Err(ExportError::Nifti {
                path: path.to_path_buf(),
                message: format!("unsupported data type {:?}", other),
            })
        }
    };

    let spacing = if array.ndim() == 3 {
        let xyz = [
            f64::from(header.pixdim[1]),
            f64::from(header.pixdim[2]),
            f64::from(header.pixdim[3]),
        ];
        Spacing::from_xyz(xyz).ok()
    } else {
        None
    };

    Ok(NiftiImage { array, spacing })
}
