//! Volume abstraction layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            DatasetLoader                │
//! │  (level name → LazyVolume + Spacing)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             LazyVolume                  │
//! │  (block-wise region reads, z/y/x order) │
//! └────────────────────┬────────────────────┘
//!                      │ materialize()
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             VolumeArray                 │
//! │  (in-memory little-endian samples)      │
//! └─────────────────────────────────────────┘
//! ```

mod array;
mod lazy;
mod loader;
pub(crate) mod region;
mod spacing;

pub use array::{Element, VolumeArray};
pub use lazy::{LazyVolume, VolumeLocation};
pub use loader::{
    level_spacing, DatasetLoader, MultiscaleDataset, ResolutionLevel, DEFAULT_HIGHRES_LEVEL,
    DEFAULT_LOWRES_LEVEL,
};
pub use spacing::{compute_spacing, Spacing};
