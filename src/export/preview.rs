//! Grayscale JPEG previews of volumes.
//!
//! A 3D volume is collapsed by a maximum-intensity projection along its
//! slowest axis (`z`), then rescaled to the 0..255 range. The result is for
//! looking at, not for analysis.

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma};

use crate::error::ExportError;
use crate::volume::VolumeArray;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// A 2D projection, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
}

/// Maximum along axis 0 of a 3D array; 2D arrays are returned as is.
///
/// Non-finite samples are ignored.
pub fn max_intensity_projection(array: &VolumeArray) -> Result<Projection, ExportError> {
    let shape = array.shape();
    let (depth, height, width) = match *shape {
        [d, h, w] => (d, h, w),
        [h, w] => (1, h, w),
        _ => {
            return Err(ExportError::UnsupportedShape {
                shape: shape.to_vec(),
                reason: "preview needs a 2D or 3D volume".to_string(),
            })
        }
    };
    if depth == 0 || height == 0 || width == 0 {
        return Err(ExportError::UnsupportedShape {
            shape: shape.to_vec(),
            reason: "preview of an empty volume".to_string(),
        });
    }

    let plane = height * width;
    let mut values = vec![f64::NEG_INFINITY; plane];
    for z in 0..depth {
        for (i, out) in values.iter_mut().enumerate() {
            let v = array.value_f64(z * plane + i);
            if v.is_finite() && v > *out {
                *out = v;
            }
        }
    }

    Ok(Projection {
        width,
        height,
        values,
    })
}

/// Rescale a projection to 8 bits. A constant image maps to all zeros.
pub fn rescale_to_u8(projection: &Projection) -> Vec<u8> {
    let finite = projection.values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    let range = max - min;
    projection
        .values
        .iter()
        .map(|&v| {
            if !v.is_finite() || range <= 0.0 {
                0
            } else {
                ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8
            }
        })
        .collect()
}

/// Encode the projection of `array` as a grayscale JPEG.
pub fn encode_preview(array: &VolumeArray, quality: u8) -> Result<Vec<u8>, ExportError> {
    let quality = quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);
    let projection = max_intensity_projection(array)?;

    let too_large = |_| ExportError::UnsupportedShape {
        shape: array.shape().to_vec(),
        reason: "preview is larger than a JPEG can hold".to_string(),
    };
    let width = u32::try_from(projection.width).map_err(too_large)?;
    let height = u32::try_from(projection.height).map_err(too_large)?;

    let pixels = rescale_to_u8(&projection);
    let img = GrayImage::from_fn(width, height, |x, y| {
        Luma([pixels[y as usize * projection.width + x as usize]])
    });

    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
    encoder
        .encode_image(&img)
        .map_err(|e| ExportError::Image(e.to_string()))?;

    Ok(output)
}
