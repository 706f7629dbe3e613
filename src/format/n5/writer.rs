//! Writing materialised volumes into local N5 containers.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;

use super::attributes::{
    parse_attributes, Compression, DatasetAttributes, ATTRIBUTES_FILE, N5_VERSION,
};
use super::block::{block_key, encode_block, swap_byte_order};
use crate::error::ExportError;
use crate::volume::region::{copy_box, grid_positions};
use crate::volume::VolumeArray;

/// Default block edge used when writing datasets.
pub const DEFAULT_WRITE_BLOCK_SIZE: usize = 128;

/// Options for [`write_dataset`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Block extent in array order (slowest axis first)
    pub block_size: Vec<usize>,

    /// Block compression
    pub compression: Compression,

    /// Extra attributes stored next to the array description
    pub attributes: Map<String, Value>,
}

impl WriteOptions {
    /// Cubic blocks of `edge` voxels on every axis of an `ndim` array.
    pub fn cubic(ndim: usize, edge: usize) -> Self {
        Self {
            block_size: vec![edge.max(1); ndim],
            compression: Compression::gzip(),
            attributes: Map::new(),
        }
    }

    /// Replace the compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Add one extra attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Write `array` as dataset `dataset` of the N5 container rooted at `root`.
///
/// The container root is created if missing. Blocks on the upper edges are
/// truncated to the array extent.
pub async fn write_dataset(
    root: &Path,
    dataset: &str,
    array: &VolumeArray,
    options: &WriteOptions,
) -> Result<(), ExportError> {
    let ndim = array.ndim();
    if ndim == 0 || options.block_size.len() != ndim {
        return Err(ExportError::UnsupportedShape {
            shape: array.shape().to_vec(),
            reason: format!(
                "block size {:?} does not match {} axes",
                options.block_size, ndim
            ),
        });
    }

    // N5 order is the reverse of array order
    let n5_block_size = options
        .block_size
        .iter()
        .rev()
        .map(|&b| u32::try_from(b.max(1)))
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|_| ExportError::UnsupportedShape {
            shape: array.shape().to_vec(),
            reason: format!(
                "block size {:?} exceeds the N5 limit of {}",
                options.block_size,
                u32::MAX
            ),
        })?;

    ensure_root(root).await?;

    let attrs = DatasetAttributes {
        dimensions: array.shape().iter().rev().map(|&d| d as u64).collect(),
        block_size: n5_block_size,
        data_type: array.data_type(),
        compression: options.compression,
    };

    let dataset_dir = root.join(dataset.trim_matches('/'));
    create_dir(&dataset_dir).await?;
    let doc = Value::Object(attrs.to_json(&options.attributes));
    write_file(&dataset_dir.join(ATTRIBUTES_FILE), doc.to_string().into_bytes()).await?;

    let element_size = array.data_type().size();
    let shape = array.shape();
    let block_size: Vec<usize> = options.block_size.iter().map(|&b| b.max(1)).collect();
    let grid_last: Vec<u64> = shape
        .iter()
        .zip(&block_size)
        .map(|(&d, &b)| (d.div_ceil(b) as u64).saturating_sub(1))
        .collect();

    if shape.iter().any(|&d| d == 0) {
        return Ok(());
    }

    let mut written = 0usize;
    for position in grid_positions(&vec![0; ndim], &grid_last) {
        let origin: Vec<usize> = position
            .iter()
            .zip(&block_size)
            .map(|(&p, &b)| p as usize * b)
            .collect();
        let extent: Vec<usize> = origin
            .iter()
            .zip(shape)
            .zip(&block_size)
            .map(|((&o, &d), &b)| b.min(d - o))
            .collect();

        let mut data = vec![0u8; extent.iter().product::<usize>() * element_size];
        copy_box(
            array.as_bytes(),
            shape,
            &origin,
            &mut data,
            &extent,
            &vec![0; ndim],
            &extent,
            element_size,
        );
        swap_byte_order(&mut data, element_size);

        let n5_size: Vec<u32> = extent.iter().rev().map(|&e| e as u32).collect();
        let n5_position: Vec<u64> = position.iter().rev().copied().collect();
        let encoded = encode_block(&n5_size, &data, options.compression).map_err(|source| {
            ExportError::Io {
                path: dataset_dir.clone(),
                source,
            }
        })?;

        let block_path = root.join(block_key(dataset.trim_matches('/'), &n5_position));
        if let Some(parent) = block_path.parent() {
            create_dir(parent).await?;
        }
        write_file(&block_path, encoded).await?;
        written += 1;
    }

    debug!(
        "Wrote {} blocks of {:?} to {}",
        written,
        block_size,
        dataset_dir.display()
    );
    Ok(())
}

/// Create the container root and its attributes if they do not exist yet.
async fn ensure_root(root: &Path) -> Result<(), ExportError> {
    create_dir(root).await?;
    let attrs_path = root.join(ATTRIBUTES_FILE);
    match tokio::fs::read(&attrs_path).await {
        Ok(bytes) => {
            // Keep existing root attributes, only make sure they parse
            parse_attributes(&root.display().to_string(), &bytes)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let doc = json!({ "n5": N5_VERSION });
            write_file(&attrs_path, doc.to_string().into_bytes()).await
        }
        Err(source) => Err(ExportError::Io {
            path: attrs_path,
            source,
        }),
    }
}

async fn create_dir(path: &Path) -> Result<(), ExportError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| ExportError::Io {
            path: PathBuf::from(path),
            source,
        })
}

async fn write_file(path: &Path, contents: Vec<u8>) -> Result<(), ExportError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ExportError::Io {
            path: PathBuf::from(path),
            source,
        })
}
