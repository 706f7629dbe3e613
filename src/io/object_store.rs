use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for fetching whole objects from a key/value chunk store.
///
/// N5 containers address attributes and blocks by slash-separated keys
/// (`lowres/attributes.json`, `lowres/0/1/2`). Implementations map those keys
/// onto their backend. An absent object is `Ok(None)`, not an error, because
/// N5 treats missing blocks as empty.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full contents of the object at `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError>;

    /// Get a unique identifier for this store (for logging and cache keys).
    fn identifier(&self) -> &str;
}

/// Join key segments with `/`, dropping empty segments and stray slashes.
///
/// ```
/// use easifish_register::io::join_key;
///
/// assert_eq!(join_key(&["/lowres/", "0", "attributes.json"]), "lowres/0/attributes.json");
/// assert_eq!(join_key(&["", "highres"]), "highres");
/// ```
pub fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

// =============================================================================
// Local filesystem store
// =============================================================================

/// Filesystem-backed store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    identifier: String,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory is not checked here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let identifier = format!("file://{}", root.display());
        Self { root, identifier }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path below the root, rejecting keys that escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, IoError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(IoError::InvalidLocation {
                location: key.to_string(),
                reason: "key must stay inside the store root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IoError::Local {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
