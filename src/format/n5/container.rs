use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::attributes::{parse_attributes, DatasetAttributes, ATTRIBUTES_FILE};
use crate::error::FormatError;
use crate::io::{join_key, ObjectStore};
use crate::volume::{LazyVolume, VolumeLocation};

/// An opened N5 container.
///
/// Holds the store handle and hands out lazily-read datasets. Opening a
/// container only reads the root `attributes.json`; no voxel data is touched
/// until a region is requested from a dataset.
#[derive(Clone)]
pub struct N5Container {
    store: Arc<dyn ObjectStore>,
    location: String,
    version: Option<String>,
}

impl N5Container {
    /// Open the container at the root of `store`.
    ///
    /// `location` is the user-facing store address, recorded in every
    /// dataset handle so it can be handed to external programs.
    ///
    /// Fails with `MissingDataset` if the root has no `attributes.json`,
    /// which is the case for a path that is not an N5 container at all.
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        location: impl Into<String>,
    ) -> Result<Self, FormatError> {
        let location = location.into();
        let root = store
            .get(ATTRIBUTES_FILE)
            .await?
            .ok_or_else(|| FormatError::MissingDataset(format!("{} (no N5 root)", location)))?;
        let attrs = parse_attributes(&location, &root)?;
        let version = attrs.get("n5").and_then(Value::as_str).map(str::to_string);

        debug!(
            "Opened N5 container {} (version {})",
            location,
            version.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            store,
            location,
            version,
        })
    }

    /// User-facing address of the container.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// N5 version declared by the root attributes, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The underlying object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Read the attribute document of a group or dataset.
    pub async fn attributes(&self, path: &str) -> Result<Map<String, Value>, FormatError> {
        let key = join_key(&[path, ATTRIBUTES_FILE]);
        let bytes = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| FormatError::MissingDataset(self.describe(path)))?;
        parse_attributes(&self.describe(path), &bytes)
    }

    /// Whether a group or dataset exists at `path`.
    pub async fn exists(&self, path: &str) -> Result<bool, FormatError> {
        let key = join_key(&[path, ATTRIBUTES_FILE]);
        Ok(self.store.get(&key).await?.is_some())
    }

    /// Open the dataset at `path` as a lazy volume.
    pub async fn open_dataset(&self, path: &str) -> Result<LazyVolume, FormatError> {
        let attrs = self.attributes(path).await?;
        let dataset = DatasetAttributes::from_json(&self.describe(path), &attrs)?;
        let location = VolumeLocation::new(self.location.clone(), join_key(&[path]));

        debug!(
            "Opened dataset {}: dimensions {:?}, block size {:?}, {}",
            location, dataset.dimensions, dataset.block_size, dataset.data_type
        );

        Ok(LazyVolume::new(self.store.clone(), location, dataset, attrs))
    }

    fn describe(&self, path: &str) -> String {
        format!("{}/{}", self.location.trim_end_matches('/'), join_key(&[path]))
    }
}

impl fmt::Debug for N5Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("N5Container")
            .field("location", &self.location)
            .field("store", &self.store.identifier())
            .field("version", &self.version)
            .finish()
    }
}
