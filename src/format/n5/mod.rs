//! N5 chunked array containers.
//!
//! An N5 container is a tree of groups and datasets addressed by
//! slash-separated paths. Every node has an `attributes.json`; datasets are
//! split into blocks stored as separate objects. This module provides the
//! attribute model, the block codec, container opening and local writing.

mod attributes;
mod block;
mod container;
mod writer;

pub use attributes::{
    parse_attributes, read_unit, read_vector3, Compression, DataType, DatasetAttributes,
    ATTRIBUTES_FILE, DOWNSAMPLING_FACTORS_KEY, N5_VERSION, PIXEL_RESOLUTION_KEY,
};
pub use block::{
    block_key, decode_block, encode_block, swap_byte_order, DecodedBlock, MODE_DEFAULT,
    MODE_VARLENGTH,
};
pub use container::N5Container;
pub use writer::{write_dataset, WriteOptions, DEFAULT_WRITE_BLOCK_SIZE};
