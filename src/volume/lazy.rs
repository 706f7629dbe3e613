use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::region::{copy_box, grid_positions};
use super::VolumeArray;
use crate::error::FormatError;
use crate::format::n5::{block_key, decode_block, swap_byte_order, DataType, DatasetAttributes};
use crate::io::ObjectStore;

/// Address of a dataset: store location plus dataset path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLocation {
    /// Store address (local path, `file://` or `s3://` URL)
    pub store: String,

    /// Dataset path inside the store, without leading slash
    pub dataset: String,
}

impl VolumeLocation {
    pub fn new(store: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            dataset: dataset.into(),
        }
    }
}

impl fmt::Display for VolumeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store.trim_end_matches('/'), self.dataset)
    }
}

/// Read-only handle to a chunked on-disk array.
///
/// Shape, data type and block layout are known once the handle exists;
/// voxel data is fetched block by block when a region is requested. All
/// shapes and offsets use array order (slowest axis first), the reverse of
/// the N5 `dimensions` order.
#[derive(Clone)]
pub struct LazyVolume {
    store: Arc<dyn ObjectStore>,
    location: VolumeLocation,
    dataset: DatasetAttributes,
    attributes: Map<String, Value>,
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
}

impl LazyVolume {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        location: VolumeLocation,
        dataset: DatasetAttributes,
        attributes: Map<String, Value>,
    ) -> Self {
        let shape = dataset.dimensions.iter().rev().copied().collect();
        let chunk_shape = dataset.block_size.iter().rev().map(|&b| b as u64).collect();
        Self {
            store,
            location,
            dataset,
            attributes,
            shape,
            chunk_shape,
        }
    }

    /// Extent along each axis, slowest first.
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Block extent along each axis, slowest first.
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Element type.
    pub fn data_type(&self) -> DataType {
        self.dataset.data_type
    }

    /// Number of voxels.
    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Bytes needed to hold the whole volume in memory.
    pub fn size_in_bytes(&self) -> u64 {
        self.element_count() * self.data_type().size() as u64
    }

    /// Where the dataset lives.
    pub fn location(&self) -> &VolumeLocation {
        &self.location
    }

    /// The N5 array description (N5 axis order).
    pub fn dataset_attributes(&self) -> &DatasetAttributes {
        &self.dataset
    }

    /// The full attribute document, including user keys.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Read the box starting at `offset` with extent `shape`.
    ///
    /// Only the blocks intersecting the box are fetched. Blocks absent from
    /// the store read as zeros.
    pub async fn read_region(
        &self,
        offset: &[u64],
        shape: &[u64],
    ) -> Result<VolumeArray, FormatError> {
        let ndim = self.ndim();
        if offset.len() != ndim || shape.len() != ndim {
            return Err(FormatError::DimensionMismatch {
                expected: ndim,
                actual: if offset.len() != ndim {
                    offset.len()
                } else {
                    shape.len()
                },
            });
        }

        let in_bounds = offset
            .iter()
            .zip(shape)
            .zip(&self.shape)
            .all(|((&o, &s), &d)| o.checked_add(s).is_some_and(|end| end <= d));
        if !in_bounds {
            return Err(FormatError::RegionOutOfBounds {
                offset: offset.to_vec(),
                shape: shape.to_vec(),
                volume: self.shape.clone(),
            });
        }

        let element_size = self.data_type().size();
        let out_shape: Vec<usize> = shape.iter().map(|&s| s as usize).collect();
        let mut data = vec![0u8; out_shape.iter().product::<usize>() * element_size];
        if data.is_empty() {
            return VolumeArray::new(out_shape, self.data_type(), data);
        }

        let first: Vec<u64> = offset
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&o, &c)| o / c)
            .collect();
        let last: Vec<u64> = offset
            .iter()
            .zip(shape)
            .zip(&self.chunk_shape)
            .map(|((&o, &s), &c)| (o + s - 1) / c)
            .collect();

        let mut fetched = 0usize;
        let mut absent = 0usize;
        for position in grid_positions(&first, &last) {
            let n5_position: Vec<u64> = position.iter().rev().copied().collect();
            let key = block_key(&self.location.dataset, &n5_position);

            let Some(raw) = self.store.get(&key).await? else {
                absent += 1;
                continue;
            };
            let block = decode_block(&key, &raw, &self.dataset)?;
            fetched += 1;

            let block_shape: Vec<usize> = block.size.iter().rev().map(|&s| s as usize).collect();
            let block_origin: Vec<u64> = position
                .iter()
                .zip(&self.chunk_shape)
                .map(|(&p, &c)| p * c)
                .collect();

            // Intersect the block with the requested box
            let mut src_origin = Vec::with_capacity(ndim);
            let mut dst_origin = Vec::with_capacity(ndim);
            let mut extent = Vec::with_capacity(ndim);
            for axis in 0..ndim {
                let start = offset[axis].max(block_origin[axis]);
                let end = (offset[axis] + shape[axis])
                    .min(block_origin[axis] + block_shape[axis] as u64);
                if start >= end {
                    extent.clear();
                    break;
                }
                src_origin.push((start - block_origin[axis]) as usize);
                dst_origin.push((start - offset[axis]) as usize);
                extent.push((end - start) as usize);
            }
            if extent.len() != ndim {
                continue;
            }

            copy_box(
                &block.data,
                &block_shape,
                &src_origin,
                &mut data,
                &out_shape,
                &dst_origin,
                &extent,
                element_size,
            );
        }

        swap_byte_order(&mut data, element_size);

        debug!(
            "Read region {:?}+{:?} of {}: {} blocks fetched, {} absent",
            offset, shape, self.location, fetched, absent
        );

        VolumeArray::new(out_shape, self.data_type(), data)
    }

    /// Read the whole volume into memory.
    ///
    /// Only viable when the volume fits in memory.
    pub async fn materialize(&self) -> Result<VolumeArray, FormatError> {
        let offset = vec![0; self.ndim()];
        let shape = self.shape.clone();
        self.read_region(&offset, &shape).await
    }
}

impl fmt::Debug for LazyVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyVolume")
            .field("location", &self.location)
            .field("shape", &self.shape)
            .field("chunk_shape", &self.chunk_shape)
            .field("data_type", &self.dataset.data_type)
            .finish()
    }
}
