//! # easifish-register
//!
//! Registration of multi-resolution N5 volumes through an external affine +
//! deformable pipeline.
//!
//! The library opens a *fixed* and a *moving* dataset, each stored as an N5
//! container with a low- and a high-resolution level, derives the voxel
//! spacing of every level from its `pixelResolution` and
//! `downsamplingFactors` attributes, hands the four volumes to a
//! registration pipeline and exports the aligned result.
//!
//! ## Features
//!
//! - **Lazy volumes**: Shape and data type are known at open time; voxel
//!   blocks are fetched only when a region is read
//! - **Local and S3 stores**: Containers on disk or in S3-compatible
//!   object storage, behind a shared LRU object cache
//! - **Spacing from metadata**: `[p2*d2, p1*d1, p0*d0]` in `z, y, x` order,
//!   with no silent defaults
//! - **Pipeline boundary**: A trait for registration backends plus a
//!   command-based backend speaking JSON
//! - **Export**: NIfTI, N5 and JPEG preview outputs
//!
//! ## Architecture
//!
//! - [`io`] - Object stores (filesystem, S3) and object caching
//! - [`mod@format`] - N5 attributes, block codec and writer; NIfTI files
//! - [`volume`] - Lazy volumes, spacing and dataset loading
//! - [`pipeline`] - Registration request, pipeline trait and invoker
//! - [`export`] - Writing volumes to interchange files
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use easifish_register::{
//!     export_volume, ClusterConfig, CommandPipeline, DatasetLoader, ExportOptions,
//!     PipelineInvoker, RegistrationRequest, StoreOptions,
//! };
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), easifish_register::WorkflowError> {
//! let options = StoreOptions::default();
//! let fixed = DatasetLoader::open("/data/fixed.n5", &options)
//!     .await?
//!     .load_multiscale("lowres", "highres", None)
//!     .await?;
//! let moving = DatasetLoader::open("/data/moving.n5", &options)
//!     .await?
//!     .load_multiscale("lowres", "highres", None)
//!     .await?;
//!
//! let request = RegistrationRequest::new(fixed, moving, 128, "/data/out", ClusterConfig::new());
//! let invoker = PipelineInvoker::new(CommandPipeline::new("register-volumes"));
//! let result = invoker.invoke(&request).await?;
//!
//! let options = ExportOptions::default().with_spacing(result.aligned_spacing);
//! export_volume(&result.aligned, Path::new("/data/out/aligned.nii.gz"), &options).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod io;
pub mod pipeline;
pub mod volume;

// Re-export commonly used types
pub use config::{Cli, Command, ExportConfig, InspectConfig, RegisterConfig};
pub use error::{ExportError, FormatError, IoError, PipelineError, WorkflowError};
pub use export::{export_array, export_volume, read_nifti, ExportFormat, ExportOptions};
pub use format::n5::{write_dataset, Compression, DataType, N5Container, WriteOptions};
pub use io::{
    create_s3_client, open_store, FsStore, ObjectCache, ObjectStore, S3Store, StoreLocation,
    StoreOptions,
};
pub use pipeline::{
    AffineTransform, BlockGrid, ClusterConfig, CommandPipeline, PipelineInvoker, PipelineOutput,
    RegistrationPipeline, RegistrationRequest, RegistrationResult,
};
pub use volume::{
    compute_spacing, DatasetLoader, LazyVolume, MultiscaleDataset, ResolutionLevel, Spacing,
    VolumeArray, VolumeLocation,
};
