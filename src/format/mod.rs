//! On-disk formats.
//!
//! - [`n5`]: chunked N5 containers, read lazily through an
//!   [`ObjectStore`](crate::io::ObjectStore) and written to local disk.
//! - [`nifti`]: single-file NIfTI-1 interchange images.

pub mod n5;
pub mod nifti;

pub use self::nifti::{read_nifti, write_nifti, NiftiImage};
