//! Inputs and outputs at the registration pipeline boundary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::blocks::DEFAULT_OVERLAP_FACTOR;
use super::ClusterConfig;
use crate::error::PipelineError;
use crate::io::StoreLocation;
use crate::volume::{MultiscaleDataset, ResolutionLevel, Spacing, VolumeLocation};

// =============================================================================
// Registration Request
// =============================================================================

/// Everything the external pipeline needs for one registration run.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub fixed_lowres: ResolutionLevel,
    pub fixed_highres: ResolutionLevel,
    pub moving_lowres: ResolutionLevel,
    pub moving_highres: ResolutionLevel,

    /// Deformable block size, `[b, b, b]`
    pub blocksize: [u32; 3],

    /// Block overlap as a fraction of the block size
    pub overlap_factor: f64,

    /// Directory the pipeline writes its outputs under
    pub write_directory: PathBuf,

    /// Forwarded verbatim
    pub cluster_config: ClusterConfig,
}

impl RegistrationRequest {
    /// Assemble a request with a cubic block of edge `blocksize`.
    pub fn new(
        fixed: MultiscaleDataset,
        moving: MultiscaleDataset,
        blocksize: u32,
        write_directory: impl Into<PathBuf>,
        cluster_config: ClusterConfig,
    ) -> Self {
        Self {
            fixed_lowres: fixed.lowres,
            fixed_highres: fixed.highres,
            moving_lowres: moving.lowres,
            moving_highres: moving.highres,
            blocksize: [blocksize; 3],
            overlap_factor: DEFAULT_OVERLAP_FACTOR,
            write_directory: write_directory.into(),
            cluster_config,
        }
    }

    pub fn with_overlap_factor(mut self, overlap_factor: f64) -> Self {
        self.overlap_factor = overlap_factor;
        self
    }

    /// The four levels in pipeline argument order.
    pub fn levels(&self) -> [&ResolutionLevel; 4] {
        [
            &self.fixed_lowres,
            &self.fixed_highres,
            &self.moving_lowres,
            &self.moving_highres,
        ]
    }

    /// The four spacings in pipeline argument order.
    pub fn spacings(&self) -> [Spacing; 4] {
        self.levels().map(|level| level.spacing)
    }

    /// Check the request before anything is started.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.blocksize.contains(&0) {
            return Err(PipelineError::InvalidRequest(
                "block size must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.overlap_factor) {
            return Err(PipelineError::InvalidRequest(format!(
                "overlap factor {} must be within 0..=1",
                self.overlap_factor
            )));
        }
        for level in self.levels() {
            if level.volume.ndim() != 3 {
                return Err(PipelineError::InvalidRequest(format!(
                    "{} has {} axes, expected 3",
                    level.volume.location(),
                    level.volume.ndim()
                )));
            }
        }
        if self.write_directory.as_os_str().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "write directory is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Serializable form handed to out-of-process pipelines.
    ///
    /// Local store locations and the write directory are made absolute, so
    /// the document means the same thing from any working directory.
    pub fn to_document(&self) -> Result<RequestDocument, PipelineError> {
        let describe = |level: &ResolutionLevel| -> Result<VolumeDescriptor, PipelineError> {
            let mut descriptor = VolumeDescriptor::from(level);
            descriptor.store = absolute_store(&descriptor.store)?;
            Ok(descriptor)
        };

        Ok(RequestDocument {
            fixed_lowres: describe(&self.fixed_lowres)?,
            fixed_highres: describe(&self.fixed_highres)?,
            moving_lowres: describe(&self.moving_lowres)?,
            moving_highres: describe(&self.moving_highres)?,
            blocksize: self.blocksize,
            overlap_factor: self.overlap_factor,
            write_directory: absolute_path(&self.write_directory)?,
            cluster_config: self.cluster_config.clone(),
        })
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf, PipelineError> {
    std::path::absolute(path).map_err(|e| {
        PipelineError::InvalidRequest(format!("cannot resolve {}: {}", path.display(), e))
    })
}

/// Absolute form of a local store location; remote locations are unchanged.
fn absolute_store(store: &str) -> Result<String, PipelineError> {
    match StoreLocation::parse(store) {
        Ok(StoreLocation::Local(path)) if path.is_relative() => {
            Ok(absolute_path(&path)?.display().to_string())
        }
        _ => Ok(store.to_string()),
    }
}

/// One input level as seen by an out-of-process pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    pub store: String,
    pub dataset: String,

    /// Array order (`z, y, x`)
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub data_type: String,

    /// Array order (`z, y, x`)
    pub spacing: Spacing,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl From<&ResolutionLevel> for VolumeDescriptor {
    fn from(level: &ResolutionLevel) -> Self {
        let location = level.volume.location();
        Self {
            store: location.store.clone(),
            dataset: location.dataset.clone(),
            shape: level.volume.shape().to_vec(),
            chunk_shape: level.volume.chunk_shape().to_vec(),
            data_type: level.volume.data_type().name().to_string(),
            spacing: level.spacing,
            unit: level.unit.clone(),
        }
    }
}

/// JSON request document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDocument {
    pub fixed_lowres: VolumeDescriptor,
    pub fixed_highres: VolumeDescriptor,
    pub moving_lowres: VolumeDescriptor,
    pub moving_highres: VolumeDescriptor,
    pub blocksize: [u32; 3],
    pub overlap_factor: f64,
    pub write_directory: PathBuf,
    pub cluster_config: ClusterConfig,
}

// =============================================================================
// Pipeline Output
// =============================================================================

/// What the pipeline reports back after a run.
///
/// The affine and the deformation field are already on disk; the aligned
/// volume is a dataset the caller opens lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Text file holding the 4x4 affine
    #[serde(rename = "affine")]
    pub affine_path: PathBuf,

    /// Dataset holding the deformation field
    pub deformation: VolumeLocation,

    /// Dataset holding the aligned moving volume
    pub aligned: VolumeLocation,
}

impl PipelineOutput {
    /// Resolve relative local paths against `base`.
    pub fn resolved(&self, base: &Path) -> Self {
        let affine_path = if self.affine_path.is_relative() {
            base.join(&self.affine_path)
        } else {
            self.affine_path.clone()
        };
        Self {
            affine_path,
            deformation: resolve_location(&self.deformation, base),
            aligned: resolve_location(&self.aligned, base),
        }
    }
}

fn resolve_location(location: &VolumeLocation, base: &Path) -> VolumeLocation {
    match StoreLocation::parse(&location.store) {
        Ok(StoreLocation::Local(path)) if path.is_relative() => VolumeLocation::new(
            base.join(path).display().to_string(),
            location.dataset.trim_matches('/'),
        ),
        _ => VolumeLocation::new(location.store.clone(), location.dataset.trim_matches('/')),
    }
}
