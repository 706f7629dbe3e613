//! N5 block codec.
//!
//! # Block Layout
//!
//! ```text
//! u16 mode            0 = default, 1 = varlength
//! u16 ndim
//! u32 size[ndim]      block extent, fastest axis first
//! u32 num_elements    only present in varlength mode
//! payload             big-endian elements, compressed as a whole
//! ```
//!
//! All header fields are big-endian. Edge blocks may be smaller than the
//! dataset block size; the header always gives the actual extent.

use std::io::{Read, Write};

use bytes::{Buf, BufMut};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use super::attributes::{Compression, DatasetAttributes};
use crate::error::FormatError;
use crate::io::join_key;

/// Default block mode.
pub const MODE_DEFAULT: u16 = 0;

/// Varlength block mode (element count stored explicitly).
pub const MODE_VARLENGTH: u16 = 1;

/// A decoded block: extent in N5 order plus big-endian element bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    /// Block extent, fastest axis first
    pub size: Vec<u32>,

    /// Uncompressed payload, big-endian, fastest axis varying first
    pub data: Vec<u8>,
}

impl DecodedBlock {
    /// Number of elements described by the header.
    pub fn element_count(&self) -> usize {
        self.size
            .iter()
            .try_fold(1usize, |acc, &s| acc.checked_mul(s as usize))
            .unwrap_or(usize::MAX)
    }
}

/// Object key of the block at `grid_position` (N5 order) in `dataset`.
pub fn block_key(dataset: &str, grid_position: &[u64]) -> String {
    let indices: Vec<String> = grid_position.iter().map(u64::to_string).collect();
    let mut parts: Vec<&str> = vec![dataset];
    parts.extend(indices.iter().map(String::as_str));
    join_key(&parts)
}

/// Decode the raw bytes of a block object.
pub fn decode_block(
    key: &str,
    raw: &[u8],
    attrs: &DatasetAttributes,
) -> Result<DecodedBlock, FormatError> {
    let invalid = |message: String| FormatError::InvalidBlock {
        key: key.to_string(),
        message,
    };

    let mut buf = raw;
    if buf.remaining() < 4 {
        return Err(invalid(format!("header truncated at {} bytes", raw.len())));
    }

    let mode = buf.get_u16();
    if mode != MODE_DEFAULT && mode != MODE_VARLENGTH {
        return Err(FormatError::UnsupportedBlockMode {
            key: key.to_string(),
            mode,
        });
    }

    let ndim = buf.get_u16() as usize;
    if ndim != attrs.ndim() {
        return Err(invalid(format!(
            "header has {} axes, dataset has {}",
            ndim,
            attrs.ndim()
        )));
    }
    if buf.remaining() < ndim * 4 {
        return Err(invalid("block size truncated".to_string()));
    }
    let size: Vec<u32> = (0..ndim).map(|_| buf.get_u32()).collect();
    if size.iter().zip(&attrs.block_size).any(|(s, b)| s > b) {
        return Err(invalid(format!(
            "block extent {:?} exceeds dataset block size {:?}",
            size, attrs.block_size
        )));
    }

    let header_elements = size
        .iter()
        .try_fold(1usize, |acc, &s| acc.checked_mul(s as usize))
        .ok_or_else(|| invalid(format!("block extent {:?} overflows", size)))?;
    let element_count = if mode == MODE_VARLENGTH {
        if buf.remaining() < 4 {
            return Err(invalid("element count truncated".to_string()));
        }
        buf.get_u32() as usize
    } else {
        header_elements
    };

    if element_count != header_elements {
        return Err(invalid(format!(
            "varlength element count {} does not match extent {:?}",
            element_count, size
        )));
    }

    let expected = element_count
        .checked_mul(attrs.data_type.size())
        .ok_or_else(|| invalid(format!("block extent {:?} overflows", size)))?;
    let data = decompress(buf, attrs.compression, expected).map_err(|e| invalid(e.to_string()))?;

    if data.len() < expected {
        return Err(invalid(format!(
            "payload holds {} bytes, expected {}",
            data.len(),
            expected
        )));
    }

    let mut data = data;
    data.truncate(expected);
    Ok(DecodedBlock { size, data })
}

/// Encode a block with default mode.
///
/// `size` is in N5 order and `data` must hold big-endian elements.
pub fn encode_block(
    size: &[u32],
    data: &[u8],
    compression: Compression,
) -> Result<Vec<u8>, std::io::Error> {
    let mut out = Vec::with_capacity(4 + size.len() * 4 + data.len());
    out.put_u16(MODE_DEFAULT);
    out.put_u16(size.len() as u16);
    for &s in size {
        out.put_u32(s);
    }

    match compression {
        Compression::Raw => out.extend_from_slice(data),
        Compression::Gzip { level, use_zlib } => {
            let level = flate2::Compression::new(level);
            if use_zlib {
                let mut encoder = ZlibEncoder::new(out, level);
                encoder.write_all(data)?;
                out = encoder.finish()?;
            } else {
                let mut encoder = GzEncoder::new(out, level);
                encoder.write_all(data)?;
                out = encoder.finish()?;
            }
        }
    }
    Ok(out)
}

fn decompress(
    payload: &[u8],
    compression: Compression,
    expected: usize,
) -> Result<Vec<u8>, std::io::Error> {
    match compression {
        Compression::Raw => Ok(payload.to_vec()),
        Compression::Gzip { use_zlib, .. } => {
            // Anything past the expected length is discarded by the caller
            let limit = expected as u64;
            let mut out = Vec::with_capacity(expected);
            if use_zlib {
                ZlibDecoder::new(payload).take(limit).read_to_end(&mut out)?;
            } else {
                GzDecoder::new(payload).take(limit).read_to_end(&mut out)?;
            }
            Ok(out)
        }
    }
}

/// Reverse the byte order of every `element_size`-byte element in place.
///
/// Converts big-endian payloads to little-endian and back.
pub fn swap_byte_order(data: &mut [u8], element_size: usize) {
    if element_size <= 1 {
        return;
    }
    for element in data.chunks_exact_mut(element_size) {
        element.reverse();
    }
}
