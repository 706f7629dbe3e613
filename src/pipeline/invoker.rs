//! Running a registration pipeline and collecting its outputs.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn, Level};

use super::{AffineTransform, BlockGrid, RegistrationPipeline, RegistrationRequest};
use crate::error::{FormatError, PipelineError};
use crate::format::n5::N5Container;
use crate::io::{open_store, StoreLocation, StoreOptions};
use crate::volume::{level_spacing, LazyVolume, Spacing, VolumeLocation};

/// Spacing ratio between fixed and moving beyond which a warning is logged.
const SPACING_RATIO_WARNING: f64 = 10.0;

/// Outputs of one registration run.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Global affine, moving to fixed
    pub affine: AffineTransform,

    /// File the affine was read from
    pub affine_path: PathBuf,

    /// Deformation field, as persisted by the pipeline
    pub deformation: LazyVolume,

    /// Moving volume resampled onto the fixed grid, not yet read
    pub aligned: LazyVolume,

    /// Spacing of the aligned volume
    pub aligned_spacing: Spacing,
}

/// Drives a [`RegistrationPipeline`] and checks what it leaves behind.
///
/// The invoker prepares the write directory, reports the block partition,
/// calls the pipeline once, then verifies that the affine and the
/// deformation field exist and opens the aligned volume lazily.
pub struct PipelineInvoker<P> {
    pipeline: P,
    store_options: StoreOptions,
}

impl<P: RegistrationPipeline> PipelineInvoker<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            store_options: StoreOptions::default(),
        }
    }

    /// Options used to open the output stores.
    pub fn with_store_options(mut self, store_options: StoreOptions) -> Self {
        self.store_options = store_options;
        self
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Run the pipeline on `request`.
    pub async fn invoke(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResult, PipelineError> {
        request.validate()?;

        tokio::fs::create_dir_all(&request.write_directory)
            .await
            .map_err(|source| PipelineError::OutputDirectory {
                path: request.write_directory.clone(),
                source,
            })?;

        let grid = BlockGrid::new(
            request.fixed_highres.volume.shape(),
            request.blocksize,
            request.overlap_factor,
        )?;
        info!(
            "Deformable stage: {:?} partitioned into {:?} = {} blocks of {:?} (overlap {:?})",
            grid.shape(),
            grid.nblocks(),
            grid.block_count(),
            grid.blocksize(),
            grid.overlap()
        );
        if tracing::enabled!(Level::DEBUG) {
            for block in grid.blocks() {
                debug!(
                    "  block {:?}: voxels {:?}..{:?} ({:?})",
                    block.index,
                    block.start,
                    block.stop,
                    block.shape()
                );
            }
        }
        if !grid.evenly_divides() {
            warn!(
                "Block size {:?} does not evenly divide the fixed volume {:?}; edge blocks are partial",
                grid.blocksize(),
                grid.shape()
            );
        }
        check_spacing(
            "low-resolution",
            &request.fixed_lowres.spacing,
            &request.moving_lowres.spacing,
        );
        check_spacing(
            "high-resolution",
            &request.fixed_highres.spacing,
            &request.moving_highres.spacing,
        );

        info!(
            "Running registration pipeline '{}', writing to {}",
            self.pipeline.name(),
            request.write_directory.display()
        );
        let output = self
            .pipeline
            .register(request)
            .await?
            .resolved(&request.write_directory);

        let affine_path = output.affine_path.clone();
        if !is_file(&affine_path).await {
            return Err(PipelineError::MissingOutput {
                what: "affine transform",
                location: affine_path.display().to_string(),
            });
        }
        let affine = AffineTransform::read(&affine_path).await?;

        let deformation = self
            .open_output(&output.deformation, "deformation field")
            .await?;
        let aligned = self.open_output(&output.aligned, "aligned volume").await?;

        // The aligned volume lives on the fixed grid unless it says otherwise
        let aligned_spacing =
            level_spacing(&aligned.location().to_string(), aligned.attributes())
                .unwrap_or(request.fixed_highres.spacing);

        info!(
            "Registration finished: affine {}, deformation {} {:?}, aligned {} {:?}",
            affine_path.display(),
            deformation.location(),
            deformation.shape(),
            aligned.location(),
            aligned.shape()
        );

        Ok(RegistrationResult {
            affine,
            affine_path,
            deformation,
            aligned,
            aligned_spacing,
        })
    }

    async fn open_output(
        &self,
        location: &VolumeLocation,
        what: &'static str,
    ) -> Result<LazyVolume, PipelineError> {
        let missing = || PipelineError::MissingOutput {
            what,
            location: location.to_string(),
        };

        let parsed = StoreLocation::parse(&location.store).map_err(FormatError::from)?;
        let store = open_store(&parsed, &self.store_options).await;
        let container = match N5Container::open(store, &location.store).await {
            Ok(container) => container,
            Err(FormatError::MissingDataset(_)) => return Err(missing()),
            Err(e) => return Err(e.into()),
        };
        match container.open_dataset(&location.dataset).await {
            Ok(volume) => Ok(volume),
            Err(FormatError::MissingDataset(_)) | Err(FormatError::NotADataset(_)) => {
                Err(missing())
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Warn when fixed and moving spacing differ by more than
/// [`SPACING_RATIO_WARNING`] on any axis.
fn check_spacing(stage: &str, fixed: &Spacing, moving: &Spacing) -> bool {
    let ratio = fixed.ratio(moving);
    let compatible = ratio
        .iter()
        .all(|r| (1.0 / SPACING_RATIO_WARNING..=SPACING_RATIO_WARNING).contains(r));
    if !compatible {
        warn!(
            "Fixed {} spacing {} and moving spacing {} differ by more than {}x",
            stage, fixed, moving, SPACING_RATIO_WARNING
        );
    }
    compatible
}
