//! Dataset loading: store location + level name → lazy volume + spacing.

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{LazyVolume, Spacing};
use crate::error::FormatError;
use crate::format::n5::{
    read_unit, read_vector3, N5Container, DOWNSAMPLING_FACTORS_KEY, PIXEL_RESOLUTION_KEY,
};
use crate::io::{open_store, StoreLocation, StoreOptions};

/// Default name of the low-resolution level.
pub const DEFAULT_LOWRES_LEVEL: &str = "lowres";

/// Default name of the high-resolution level.
pub const DEFAULT_HIGHRES_LEVEL: &str = "highres";

/// One resolution level of a dataset, ready to hand to the pipeline.
#[derive(Debug, Clone)]
pub struct ResolutionLevel {
    /// Level name (dataset path inside the store)
    pub name: String,

    /// Lazily-read voxel data
    pub volume: LazyVolume,

    /// Voxel spacing in the volume's axis order
    pub spacing: Spacing,

    /// Physical unit from `pixelResolution`, when declared
    pub unit: Option<String>,
}

/// A dataset opened at its low and high resolution levels.
#[derive(Debug, Clone)]
pub struct MultiscaleDataset {
    pub lowres: ResolutionLevel,
    pub highres: ResolutionLevel,
}

/// Spacing of the level whose attribute document is `attrs`.
///
/// Both `pixelResolution` and `downsamplingFactors` are required; a missing
/// or malformed key fails with a data-format error.
pub fn level_spacing(path: &str, attrs: &Map<String, Value>) -> Result<Spacing, FormatError> {
    let pixel_resolution = read_vector3(path, attrs, PIXEL_RESOLUTION_KEY)?;
    let downsampling_factors = read_vector3(path, attrs, DOWNSAMPLING_FACTORS_KEY)?;
    Spacing::from_metadata(pixel_resolution, downsampling_factors)
}

/// Opens resolution levels of one N5 container.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    container: N5Container,
}

impl DatasetLoader {
    /// Open the container at `location` (path, `file://` or `s3://` URL).
    pub async fn open(location: &str, options: &StoreOptions) -> Result<Self, FormatError> {
        let parsed = StoreLocation::parse(location)?;
        let store = open_store(&parsed, options).await;
        let container = N5Container::open(store, location).await?;
        Ok(Self { container })
    }

    /// Wrap an already opened container.
    pub fn from_container(container: N5Container) -> Self {
        Self { container }
    }

    /// The underlying container.
    pub fn container(&self) -> &N5Container {
        &self.container
    }

    /// Open `level` and derive its spacing from metadata.
    pub async fn load_level(&self, level: &str) -> Result<ResolutionLevel, FormatError> {
        self.load_level_with_spacing(level, None).await
    }

    /// Open `level`, using `spacing` instead of the metadata when given.
    pub async fn load_level_with_spacing(
        &self,
        level: &str,
        spacing: Option<Spacing>,
    ) -> Result<ResolutionLevel, FormatError> {
        let volume = self.container.open_dataset(level).await?;

        if volume.ndim() != 3 {
            return Err(FormatError::DimensionMismatch {
                expected: 3,
                actual: volume.ndim(),
            });
        }

        let spacing = match spacing {
            Some(spacing) => spacing,
            None => level_spacing(&volume.location().to_string(), volume.attributes())?,
        };
        let unit = read_unit(volume.attributes());

        info!(
            "Loaded {}: shape {:?}, chunks {:?}, {}, spacing {}",
            volume.location(),
            volume.shape(),
            volume.chunk_shape(),
            volume.data_type(),
            spacing
        );

        Ok(ResolutionLevel {
            name: level.to_string(),
            volume,
            spacing,
            unit,
        })
    }

    /// Open both levels of the dataset.
    ///
    /// `spacing_override` (for the high-resolution level) is scaled onto the
    /// low-resolution level by the ratio of the two metadata spacings when
    /// both levels carry metadata; otherwise the metadata is used as is.
    pub async fn load_multiscale(
        &self,
        lowres: &str,
        highres: &str,
        spacing_override: Option<Spacing>,
    ) -> Result<MultiscaleDataset, FormatError> {
        let (lowres, highres) = match spacing_override {
            None => (self.load_level(lowres).await?, self.load_level(highres).await?),
            Some(highres_spacing) => {
                let low = self.container.open_dataset(lowres).await?;
                let high = self.container.open_dataset(highres).await?;
                let low_meta = level_spacing(&low.location().to_string(), low.attributes());
                let high_meta = level_spacing(&high.location().to_string(), high.attributes());

                let lowres_spacing = match (low_meta, high_meta) {
                    (Ok(low_meta), Ok(high_meta)) => {
                        let ratio = low_meta.ratio(&high_meta);
                        let h = highres_spacing.as_array();
                        Spacing::new([h[0] * ratio[0], h[1] * ratio[1], h[2] * ratio[2]])?
                    }
                    _ => {
                        warn!(
                            "No resolution metadata to scale the spacing override onto {}; using it unchanged",
                            lowres
                        );
                        highres_spacing
                    }
                };

                (
                    self.load_level_with_spacing(lowres, Some(lowres_spacing)).await?,
                    self.load_level_with_spacing(highres, Some(highres_spacing)).await?,
                )
            }
        };

        Ok(MultiscaleDataset { lowres, highres })
    }
}
