//! Store locations and store construction.
//!
//! A location is what the user types on the command line or what the
//! external pipeline hands back: a local directory, a `file://` URL or an
//! `s3://bucket/prefix` URL.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use super::{create_s3_client, FsStore, ObjectCache, ObjectStore, S3Store};
use crate::error::IoError;

/// Where a chunked store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Directory on the local filesystem
    Local(PathBuf),

    /// Object prefix inside an S3 bucket
    S3 { bucket: String, prefix: String },
}

impl StoreLocation {
    /// Parse a location string.
    ///
    /// Strings without a scheme are treated as local paths.
    pub fn parse(location: &str) -> Result<Self, IoError> {
        let invalid = |reason: &str| IoError::InvalidLocation {
            location: location.to_string(),
            reason: reason.to_string(),
        };

        if location.trim().is_empty() {
            return Err(invalid("location is empty"));
        }

        if !location.contains("://") {
            return Ok(StoreLocation::Local(PathBuf::from(location)));
        }

        let url = Url::parse(location).map_err(|e| invalid(&e.to_string()))?;
        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(StoreLocation::Local)
                .map_err(|_| invalid("file URL does not name a local path")),
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| invalid("s3 URL has no bucket"))?
                    .to_string();
                let prefix = url.path().trim_matches('/').to_string();
                Ok(StoreLocation::S3 { bucket, prefix })
            }
            other => Err(invalid(&format!("unsupported scheme '{}'", other))),
        }
    }

    /// Whether the store is on the local filesystem.
    pub fn is_local(&self) -> bool {
        matches!(self, StoreLocation::Local(_))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Local(path) => write!(f, "{}", path.display()),
            StoreLocation::S3 { bucket, prefix } if prefix.is_empty() => {
                write!(f, "s3://{}", bucket)
            }
            StoreLocation::S3 { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
        }
    }
}

/// Settings used when opening stores.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Custom S3 endpoint (MinIO, etc.)
    pub s3_endpoint: Option<String>,

    /// AWS region for S3
    pub s3_region: String,

    /// Number of objects kept by the per-store cache
    pub cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            s3_endpoint: None,
            s3_region: crate::config::DEFAULT_REGION.to_string(),
            cache_capacity: super::DEFAULT_OBJECT_CACHE_CAPACITY,
        }
    }
}

/// Open an object store for `location`, wrapped in an [`ObjectCache`].
pub async fn open_store(
    location: &StoreLocation,
    options: &StoreOptions,
) -> Arc<dyn ObjectStore> {
    match location {
        StoreLocation::Local(path) => Arc::new(ObjectCache::with_capacity(
            FsStore::new(path.clone()),
            options.cache_capacity,
        )),
        StoreLocation::S3 { bucket, prefix } => {
            let client =
                create_s3_client(options.s3_endpoint.as_deref(), &options.s3_region).await;
            Arc::new(ObjectCache::with_capacity(
                S3Store::new(client, bucket.clone(), prefix.clone()),
                options.cache_capacity,
            ))
        }
    }
}
