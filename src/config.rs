//! Command-line configuration for easifish-register.
//!
//! Options come from command-line arguments, with environment variable
//! fallbacks using the `EASIFISH_` prefix:
//!
//! - `EASIFISH_FIXED` / `EASIFISH_MOVING` - Fixed and moving N5 stores
//! - `EASIFISH_WRITE_DIRECTORY` - Pipeline output directory
//! - `EASIFISH_PIPELINE` - Registration program
//! - `EASIFISH_BLOCKSIZE` - Deformable block edge (default: 128)
//! - `EASIFISH_CLUSTER_CONFIG` - JSON or YAML cluster config file
//! - `EASIFISH_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `EASIFISH_S3_REGION` - AWS region (default: us-east-1)
//! - `EASIFISH_CACHE_OBJECTS` - Objects cached per store (default: 256)
//!
//! Spacings on the command line are given as `x,y,z`, the order N5 tools
//! print them in, and reversed internally.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::PipelineError;
use crate::export::{ExportFormat, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY};
use crate::format::n5::DEFAULT_WRITE_BLOCK_SIZE;
use crate::io::{StoreOptions, DEFAULT_OBJECT_CACHE_CAPACITY};
use crate::pipeline::{ClusterConfig, DEFAULT_OVERLAP_FACTOR};
use crate::volume::{Spacing, DEFAULT_HIGHRES_LEVEL, DEFAULT_LOWRES_LEVEL};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default deformable block edge, in voxels.
pub const DEFAULT_BLOCKSIZE: u32 = 128;

/// File name of the aligned volume export inside the write directory.
pub const DEFAULT_ALIGNED_OUTPUT: &str = "aligned.nii.gz";

// =============================================================================
// CLI Structure
// =============================================================================

/// easifish-register - affine + deformable registration of N5 volumes.
///
/// Loads fixed and moving multi-resolution N5 datasets, derives voxel
/// spacing from their metadata, runs an external registration pipeline and
/// exports the aligned volume.
#[derive(Parser, Debug)]
#[command(name = "easifish-register")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print shape, block layout and spacing of dataset levels.
    Inspect(InspectConfig),

    /// Materialise one dataset level and write it to an interchange file.
    Export(ExportConfig),

    /// Register a moving dataset onto a fixed dataset.
    Register(RegisterConfig),
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

// =============================================================================
// Store Options
// =============================================================================

/// Options shared by every command that opens stores.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct StoreArgs {
    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "EASIFISH_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "EASIFISH_S3_REGION")]
    pub s3_region: String,

    /// Maximum number of store objects (blocks, attribute files) to cache.
    #[arg(long, default_value_t = DEFAULT_OBJECT_CACHE_CAPACITY, env = "EASIFISH_CACHE_OBJECTS")]
    pub cache_objects: usize,
}

impl StoreArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_objects == 0 {
            return Err("cache_objects must be greater than 0".to_string());
        }
        if self.s3_region.trim().is_empty() {
            return Err("s3_region must not be empty".to_string());
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            s3_endpoint: self.s3_endpoint.clone(),
            s3_region: self.s3_region.clone(),
            cache_capacity: self.cache_objects,
        }
    }
}

impl Default for StoreArgs {
    fn default() -> Self {
        Self {
            s3_endpoint: None,
            s3_region: DEFAULT_REGION.to_string(),
            cache_objects: DEFAULT_OBJECT_CACHE_CAPACITY,
        }
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

/// Configuration for the inspect command.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// N5 store (path, file:// or s3:// URL).
    pub location: String,

    /// Levels to inspect (comma-separated).
    #[arg(
        long = "level",
        value_delimiter = ',',
        default_values_t = [DEFAULT_LOWRES_LEVEL.to_string(), DEFAULT_HIGHRES_LEVEL.to_string()]
    )]
    pub levels: Vec<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.location.trim().is_empty() {
            return Err("store location is required".to_string());
        }
        if self.levels.is_empty() || self.levels.iter().any(|l| l.trim().is_empty()) {
            return Err("at least one non-empty --level is required".to_string());
        }
        self.store.validate()
    }
}

// =============================================================================
// Export Command
// =============================================================================

/// Configuration for the export command.
#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    /// N5 store (path, file:// or s3:// URL).
    pub location: String,

    /// Dataset path inside the store.
    #[arg(long, default_value = DEFAULT_HIGHRES_LEVEL)]
    pub dataset: String,

    /// Output file (.nii, .nii.gz, .n5, .jpg or .jpeg).
    #[arg(short, long)]
    pub output: PathBuf,

    /// Voxel spacing as x,y,z, instead of the dataset metadata.
    #[arg(long, value_parser = parse_xyz)]
    pub spacing: Option<[f64; 3]>,

    #[command(flatten)]
    pub output_args: OutputArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.location.trim().is_empty() {
            return Err("store location is required".to_string());
        }
        if self.dataset.trim().is_empty() {
            return Err("dataset must not be empty".to_string());
        }
        if let Some(spacing) = self.spacing {
            Spacing::from_xyz(spacing).map_err(|e| e.to_string())?;
        }
        ExportFormat::from_path(&self.output).map_err(|e| e.to_string())?;
        self.output_args.validate()?;
        self.store.validate()
    }

    /// Spacing override in array order.
    pub fn spacing(&self) -> Result<Option<Spacing>, String> {
        self.spacing
            .map(|xyz| Spacing::from_xyz(xyz).map_err(|e| e.to_string()))
            .transpose()
    }
}

/// Settings of the written interchange file.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct OutputArgs {
    /// Block edge of N5 outputs.
    #[arg(long, default_value_t = DEFAULT_WRITE_BLOCK_SIZE)]
    pub output_block_size: usize,

    /// JPEG quality of previews (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,
}

impl OutputArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.output_block_size == 0 {
            return Err("output_block_size must be greater than 0".to_string());
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > MAX_JPEG_QUALITY {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

impl Default for OutputArgs {
    fn default() -> Self {
        Self {
            output_block_size: DEFAULT_WRITE_BLOCK_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

// =============================================================================
// Register Command
// =============================================================================

/// Configuration for the register command.
#[derive(Args, Debug, Clone)]
pub struct RegisterConfig {
    /// Fixed N5 store (path, file:// or s3:// URL).
    #[arg(long, env = "EASIFISH_FIXED")]
    pub fixed: String,

    /// Moving N5 store (path, file:// or s3:// URL).
    #[arg(long, env = "EASIFISH_MOVING")]
    pub moving: String,

    /// Name of the low-resolution level in both stores.
    #[arg(long, default_value = DEFAULT_LOWRES_LEVEL)]
    pub lowres_level: String,

    /// Name of the high-resolution level in both stores.
    #[arg(long, default_value = DEFAULT_HIGHRES_LEVEL)]
    pub highres_level: String,

    /// Fixed high-resolution spacing as x,y,z, instead of the metadata.
    #[arg(long, value_parser = parse_xyz)]
    pub fixed_spacing: Option<[f64; 3]>,

    /// Moving high-resolution spacing as x,y,z. Defaults to the fixed
    /// override when only that one is given.
    #[arg(long, value_parser = parse_xyz)]
    pub moving_spacing: Option<[f64; 3]>,

    /// Edge of the cubic deformable blocks, in voxels.
    #[arg(long, default_value_t = DEFAULT_BLOCKSIZE, env = "EASIFISH_BLOCKSIZE")]
    pub blocksize: u32,

    /// Block overlap as a fraction of the block size (0-1).
    #[arg(long, default_value_t = DEFAULT_OVERLAP_FACTOR)]
    pub overlap_factor: f64,

    /// Directory the pipeline writes the affine and deformation to.
    #[arg(short, long, env = "EASIFISH_WRITE_DIRECTORY")]
    pub write_directory: PathBuf,

    /// Registration program.
    #[arg(long, env = "EASIFISH_PIPELINE")]
    pub pipeline: String,

    /// Extra argument passed to the registration program (repeatable).
    #[arg(long = "pipeline-arg", allow_hyphen_values = true)]
    pub pipeline_args: Vec<String>,

    /// JSON or YAML file with the cluster configuration.
    #[arg(long, env = "EASIFISH_CLUSTER_CONFIG")]
    pub cluster_config: Option<PathBuf>,

    /// Cluster configuration override as key=value (repeatable).
    #[arg(long = "cluster-arg")]
    pub cluster_args: Vec<String>,

    /// Where to export the aligned volume. Defaults to aligned.nii.gz in the
    /// write directory.
    #[arg(long)]
    pub aligned_output: Option<PathBuf>,

    #[command(flatten)]
    pub output_args: OutputArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl RegisterConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.fixed.trim().is_empty() {
            return Err("Fixed store is required. Set --fixed or EASIFISH_FIXED".to_string());
        }
        if self.moving.trim().is_empty() {
            return Err("Moving store is required. Set --moving or EASIFISH_MOVING".to_string());
        }
        if self.lowres_level.trim().is_empty() || self.highres_level.trim().is_empty() {
            return Err("resolution level names must not be empty".to_string());
        }
        if self.blocksize == 0 {
            return Err("blocksize must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.overlap_factor) {
            return Err("overlap_factor must be between 0 and 1".to_string());
        }
        if self.write_directory.as_os_str().is_empty() {
            return Err(
                "Write directory is required. Set --write-directory or EASIFISH_WRITE_DIRECTORY"
                    .to_string(),
            );
        }
        if self.pipeline.trim().is_empty() {
            return Err(
                "Registration program is required. Set --pipeline or EASIFISH_PIPELINE"
                    .to_string(),
            );
        }
        if let Some(arg) = self.cluster_args.iter().find(|a| !a.contains('=')) {
            return Err(format!("cluster argument '{}' is not of the form key=value", arg));
        }
        self.fixed_spacing()?;
        self.moving_spacing()?;
        ExportFormat::from_path(&self.aligned_output()).map_err(|e| e.to_string())?;
        self.output_args.validate()?;
        self.store.validate()
    }

    /// Fixed spacing override in array order.
    pub fn fixed_spacing(&self) -> Result<Option<Spacing>, String> {
        self.fixed_spacing
            .map(|xyz| Spacing::from_xyz(xyz).map_err(|e| e.to_string()))
            .transpose()
    }

    /// Moving spacing override in array order, falling back to the fixed
    /// override.
    pub fn moving_spacing(&self) -> Result<Option<Spacing>, String> {
        match self.moving_spacing {
            Some(xyz) => Spacing::from_xyz(xyz).map(Some).map_err(|e| e.to_string()),
            None => self.fixed_spacing(),
        }
    }

    /// Output path of the aligned volume.
    pub fn aligned_output(&self) -> PathBuf {
        self.aligned_output
            .clone()
            .unwrap_or_else(|| self.write_directory.join(DEFAULT_ALIGNED_OUTPUT))
    }

    /// Cluster configuration from the config file plus overrides.
    pub async fn load_cluster_config(&self) -> Result<ClusterConfig, PipelineError> {
        let mut config = match &self.cluster_config {
            Some(path) => ClusterConfig::from_file(path).await?,
            None => ClusterConfig::new(),
        };
        for arg in &self.cluster_args {
            config.apply_override(arg)?;
        }
        Ok(config)
    }
}

// =============================================================================
// Parsers
// =============================================================================

/// Parse a comma-separated `x,y,z` triple.
pub fn parse_xyz(value: &str) -> Result<[f64; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z but got '{}'", value));
    }
    let mut out = [0.0; 3];
    for (dst, part) in out.iter_mut().zip(&parts) {
        *dst = part
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", part))?;
    }
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
