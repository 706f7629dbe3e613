//! Test utilities for integration tests.
//!
//! This module provides N5 fixture builders, a request-counting object
//! store and a mock registration pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use easifish_register::error::{IoError, PipelineError};
use easifish_register::format::n5::{
    write_dataset, Compression, DataType, WriteOptions, DOWNSAMPLING_FACTORS_KEY,
    PIXEL_RESOLUTION_KEY,
};
use easifish_register::io::ObjectStore;
use easifish_register::pipeline::{
    AffineTransform, PipelineOutput, RegistrationPipeline, RegistrationRequest,
};
use easifish_register::volume::{VolumeArray, VolumeLocation};

// =============================================================================
// Volume Fixtures
// =============================================================================

/// A uint16 volume whose value at `(z, y, x)` is `z * 100 + y * 10 + x`.
pub fn ramp_volume(shape: [usize; 3]) -> VolumeArray {
    let mut values = Vec::with_capacity(shape.iter().product());
    for z in 0..shape[0] {
        for y in 0..shape[1] {
            for x in 0..shape[2] {
                values.push((z * 100 + y * 10 + x) as u16);
            }
        }
    }
    VolumeArray::from_elements(shape.to_vec(), &values).unwrap()
}

/// Resolution metadata in N5 (`x, y, z`) order.
#[derive(Debug, Clone, Copy)]
pub struct LevelMetadata {
    pub pixel_resolution: [f64; 3],
    pub downsampling_factors: [f64; 3],
}

impl LevelMetadata {
    pub fn new(pixel_resolution: [f64; 3], downsampling_factors: [f64; 3]) -> Self {
        Self {
            pixel_resolution,
            downsampling_factors,
        }
    }
}

/// Write `array` as `dataset` of the container at `root` with the given
/// block edge, gzip compression and optional resolution metadata.
pub async fn write_level(
    root: &Path,
    dataset: &str,
    array: &VolumeArray,
    block: usize,
    metadata: Option<LevelMetadata>,
) {
    let mut options =
        WriteOptions::cubic(array.ndim(), block).with_compression(Compression::gzip());
    if let Some(meta) = metadata {
        options = options
            .with_attribute(PIXEL_RESOLUTION_KEY, json!(meta.pixel_resolution))
            .with_attribute(DOWNSAMPLING_FACTORS_KEY, json!(meta.downsampling_factors));
    }
    write_dataset(root, dataset, array, &options).await.unwrap();
}

/// Build a container with `lowres` and `highres` levels.
///
/// The high-resolution level has `shape`; the low-resolution level is
/// half as large on every axis with downsampling factors of 2.
pub async fn create_multiscale(root: &Path, shape: [usize; 3], pixel_resolution: [f64; 3]) {
    let highres = ramp_volume(shape);
    let lowres = ramp_volume([
        shape[0].div_ceil(2),
        shape[1].div_ceil(2),
        shape[2].div_ceil(2),
    ]);
    write_level(
        root,
        "highres",
        &highres,
        4,
        Some(LevelMetadata::new(pixel_resolution, [1.0, 1.0, 1.0])),
    )
    .await;
    write_level(
        root,
        "lowres",
        &lowres,
        4,
        Some(LevelMetadata::new(pixel_resolution, [2.0, 2.0, 2.0])),
    )
    .await;
}

// =============================================================================
// Counting Object Store
// =============================================================================

/// Wraps a store and counts `get` calls.
pub struct CountingStore<S> {
    inner: S,
    gets: Arc<AtomicUsize>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gets: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle to the counter, usable after the store is moved.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.gets)
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for CountingStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

// =============================================================================
// Mock Registration Pipeline
// =============================================================================

/// Outputs the mock pipeline leaves out, to exercise verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Omit {
    #[default]
    Nothing,
    Affine,
    Deformation,
}

/// Pipeline that "registers" by copying the moving high-resolution volume.
///
/// It writes a translation affine, a zero deformation field of shape
/// `(z, y, x, 3)` and the aligned volume under the write directory, and
/// reports them with relative paths.
pub struct MockPipeline {
    translation: [f64; 3],
    omit: Omit,
    calls: AtomicUsize,
}

impl MockPipeline {
    pub fn new(translation: [f64; 3]) -> Self {
        Self {
            translation,
            omit: Omit::Nothing,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn omitting(mut self, omit: Omit) -> Self {
        self.omit = omit;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationPipeline for MockPipeline {
    fn name(&self) -> &str {
        "mock"
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<PipelineOutput, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dir = &request.write_directory;

        if self.omit != Omit::Affine {
            let t = self.translation;
            let affine = AffineTransform::from_matrix([
                [1.0, 0.0, 0.0, t[0]],
                [0.0, 1.0, 0.0, t[1]],
                [0.0, 0.0, 1.0, t[2]],
                [0.0, 0.0, 0.0, 1.0],
            ])
            .map_err(PipelineError::InvalidRequest)?;
            tokio::fs::write(dir.join("affine.mat"), affine.to_string())
                .await
                .unwrap();
        }

        let shape: Vec<usize> = request
            .fixed_highres
            .volume
            .shape()
            .iter()
            .map(|&d| d as usize)
            .collect();

        if self.omit != Omit::Deformation {
            let mut field_shape = shape.clone();
            field_shape.push(3);
            let field = VolumeArray::zeros(field_shape, DataType::Float32);
            let options = WriteOptions::cubic(4, 8).with_compression(Compression::gzip());
            write_dataset(&dir.join("transform.n5"), "vector_field", &field, &options)
                .await
                .unwrap();
        }

        let aligned = request.moving_highres.volume.materialize().await?;
        let options = WriteOptions::cubic(3, 8)
            .with_attribute(
                PIXEL_RESOLUTION_KEY,
                json!(request.fixed_highres.spacing.to_xyz()),
            )
            .with_attribute(DOWNSAMPLING_FACTORS_KEY, json!([1, 1, 1]));
        write_dataset(&dir.join("aligned.n5"), "data", &aligned, &options)
            .await
            .unwrap();

        Ok(PipelineOutput {
            affine_path: "affine.mat".into(),
            deformation: VolumeLocation::new("transform.n5", "vector_field"),
            aligned: VolumeLocation::new("aligned.n5", "data"),
        })
    }
}
