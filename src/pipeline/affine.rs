//! Affine transforms written by the registration pipeline.
//!
//! The pipeline stores the global affine as a plain text matrix: four rows
//! of four whitespace-separated numbers, the last row being `0 0 0 1`.

use std::fmt;
use std::path::Path;

use crate::error::PipelineError;

/// Tolerance on the homogeneous row.
const HOMOGENEOUS_TOLERANCE: f64 = 1e-9;

/// A 4x4 homogeneous transform, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: [[f64; 4]; 4],
}

impl AffineTransform {
    pub const fn identity() -> Self {
        Self {
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Build from a matrix, checking that it is homogeneous and finite.
    pub fn from_matrix(matrix: [[f64; 4]; 4]) -> Result<Self, String> {
        if matrix.iter().flatten().any(|v| !v.is_finite()) {
            return Err("matrix has non-finite entries".to_string());
        }
        let last = matrix[3];
        let expected = [0.0, 0.0, 0.0, 1.0];
        if last
            .iter()
            .zip(&expected)
            .any(|(a, b)| (a - b).abs() > HOMOGENEOUS_TOLERANCE)
        {
            return Err(format!("last row is {:?}, expected [0, 0, 0, 1]", last));
        }
        Ok(Self { matrix })
    }

    /// Parse the text form. Blank lines and `#` comments are ignored.
    pub fn parse(text: &str) -> Result<Self, String> {
        let rows: Vec<Vec<f64>> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                line.split_whitespace()
                    .map(|v| v.parse::<f64>().map_err(|_| format!("'{}' is not a number", v)))
                    .collect::<Result<Vec<f64>, String>>()
            })
            .collect::<Result<_, _>>()?;

        if rows.len() != 4 || rows.iter().any(|r| r.len() != 4) {
            let shape: Vec<usize> = rows.iter().map(Vec::len).collect();
            return Err(format!("expected 4 rows of 4 values, got row lengths {:?}", shape));
        }

        let mut matrix = [[0.0; 4]; 4];
        for (dst, src) in matrix.iter_mut().zip(&rows) {
            dst.copy_from_slice(src);
        }
        Self::from_matrix(matrix)
    }

    /// Read and parse the transform file at `path`.
    pub async fn read(path: &Path) -> Result<Self, PipelineError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::InvalidAffine {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::parse(&text).map_err(|message| PipelineError::InvalidAffine {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn matrix(&self) -> &[[f64; 4]; 4] {
        &self.matrix
    }

    /// Map a point through the transform.
    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        let m = &self.matrix;
        let mut out = [0.0; 3];
        for (row, value) in out.iter_mut().enumerate() {
            *value = m[row][0] * point[0] + m[row][1] * point[1] + m[row][2] * point[2] + m[row][3];
        }
        out
    }

    /// Translation component.
    pub fn translation(&self) -> [f64; 3] {
        [self.matrix[0][3], self.matrix[1][3], self.matrix[2][3]]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for AffineTransform {
    /// Text form accepted by [`AffineTransform::parse`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.matrix {
            writeln!(f, "{} {} {} {}", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}
