//! Voxel spacing derived from N5 resolution metadata.
//!
//! N5 stores `pixelResolution` and `downsamplingFactors` fastest axis first
//! (`x, y, z`), while volumes are indexed slowest axis first (`z, y, x`).
//! The spacing of a resolution level is therefore the element-wise product
//! of the two vectors, reversed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Physical distance between adjacent voxels, slowest axis first.
///
/// Every component is finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct Spacing([f64; 3]);

impl Spacing {
    /// Create a spacing from components in array (`z, y, x`) order.
    pub fn new(zyx: [f64; 3]) -> Result<Self, FormatError> {
        if zyx.iter().all(|v| v.is_finite() && *v > 0.0) {
            Ok(Self(zyx))
        } else {
            Err(FormatError::InvalidSpacing { spacing: zyx })
        }
    }

    /// Create a spacing from components in N5 (`x, y, z`) order.
    pub fn from_xyz(xyz: [f64; 3]) -> Result<Self, FormatError> {
        Self::new([xyz[2], xyz[1], xyz[0]])
    }

    /// Spacing of a resolution level from its raw N5 metadata.
    pub fn from_metadata(
        pixel_resolution: [f64; 3],
        downsampling_factors: [f64; 3],
    ) -> Result<Self, FormatError> {
        Self::new(compute_spacing(pixel_resolution, downsampling_factors))
    }

    /// Uniform spacing on all axes.
    pub fn uniform(value: f64) -> Result<Self, FormatError> {
        Self::new([value; 3])
    }

    /// Components in array (`z, y, x`) order.
    pub fn as_array(&self) -> [f64; 3] {
        self.0
    }

    /// Components in N5 (`x, y, z`) order.
    pub fn to_xyz(&self) -> [f64; 3] {
        [self.0[2], self.0[1], self.0[0]]
    }

    /// Per-axis ratio `self / other`.
    pub fn ratio(&self, other: &Spacing) -> [f64; 3] {
        [
            self.0[0] / other.0[0],
            self.0[1] / other.0[1],
            self.0[2] / other.0[2],
        ]
    }
}

impl TryFrom<[f64; 3]> for Spacing {
    type Error = FormatError;

    fn try_from(zyx: [f64; 3]) -> Result<Self, Self::Error> {
        Self::new(zyx)
    }
}

impl From<Spacing> for [f64; 3] {
    fn from(spacing: Spacing) -> Self {
        spacing.0
    }
}

impl fmt::Display for Spacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}] (z, y, x)", self.0[0], self.0[1], self.0[2])
    }
}

/// Reversed element-wise product of resolution and downsampling factors.
///
/// Both inputs are in N5 (`x, y, z`) order; the result is in array
/// (`z, y, x`) order: `[p2*d2, p1*d1, p0*d0]`.
pub fn compute_spacing(pixel_resolution: [f64; 3], downsampling_factors: [f64; 3]) -> [f64; 3] {
    [
        pixel_resolution[2] * downsampling_factors[2],
        pixel_resolution[1] * downsampling_factors[1],
        pixel_resolution[0] * downsampling_factors[0],
    ]
}
