//! N5 attribute parsing.
//!
//! Every N5 group and dataset carries an `attributes.json`. For datasets it
//! holds the array description (`dimensions`, `blockSize`, `dataType`,
//! `compression`) next to arbitrary user keys such as `pixelResolution` and
//! `downsamplingFactors`. All vectors in this file are in N5 order, i.e.
//! fastest-varying axis first (`x, y, z`).

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};

use crate::error::FormatError;

/// File name of the attribute document in every group and dataset.
pub const ATTRIBUTES_FILE: &str = "attributes.json";

/// N5 version written to new containers.
pub const N5_VERSION: &str = "2.5.1";

/// Attribute holding the voxel size at full resolution.
pub const PIXEL_RESOLUTION_KEY: &str = "pixelResolution";

/// Attribute holding the per-axis downsampling relative to full resolution.
pub const DOWNSAMPLING_FACTORS_KEY: &str = "downsamplingFactors";

/// Keys owned by the N5 array description.
const RESERVED_KEYS: [&str; 5] = [
    "dimensions",
    "blockSize",
    "dataType",
    "compression",
    "compressionType",
];

// =============================================================================
// DataType
// =============================================================================

/// Element type of an N5 dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size(&self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Uint64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// N5 name of the type (`uint16`, `float32`, ...).
    pub const fn name(&self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uint8" => Ok(DataType::Uint8),
            "uint16" => Ok(DataType::Uint16),
            "uint32" => Ok(DataType::Uint32),
            "uint64" => Ok(DataType::Uint64),
            "int8" => Ok(DataType::Int8),
            "int16" => Ok(DataType::Int16),
            "int32" => Ok(DataType::Int32),
            "int64" => Ok(DataType::Int64),
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            other => Err(FormatError::UnsupportedDataType(other.to_string())),
        }
    }
}

// =============================================================================
// Compression
// =============================================================================

/// Block compression scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed block payload
    Raw,

    /// Gzip (or zlib when `use_zlib`) compressed payload
    Gzip { level: u32, use_zlib: bool },
}

impl Compression {
    /// Default gzip compression.
    pub const fn gzip() -> Self {
        Compression::Gzip {
            level: 6,
            use_zlib: false,
        }
    }

    fn from_json(path: &str, value: &Value) -> Result<Self, FormatError> {
        let obj = value.as_object().ok_or_else(|| FormatError::InvalidAttribute {
            path: path.to_string(),
            key: "compression",
            message: "expected an object".to_string(),
        })?;
        let kind = obj.get("type").and_then(Value::as_str).unwrap_or("raw");
        match kind {
            "raw" => Ok(Compression::Raw),
            "gzip" => {
                let level = obj
                    .get("level")
                    .and_then(Value::as_i64)
                    .filter(|l| (0..=9).contains(l))
                    .unwrap_or(6) as u32;
                let use_zlib = obj.get("useZlib").and_then(Value::as_bool).unwrap_or(false);
                Ok(Compression::Gzip { level, use_zlib })
            }
            other => Err(FormatError::UnsupportedCompression(other.to_string())),
        }
    }

    fn to_json(self) -> Value {
        match self {
            Compression::Raw => json!({ "type": "raw" }),
            Compression::Gzip { level, use_zlib } => {
                json!({ "type": "gzip", "level": level, "useZlib": use_zlib })
            }
        }
    }
}

// =============================================================================
// DatasetAttributes
// =============================================================================

/// Array description of an N5 dataset, in N5 (fast-to-slow) order.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetAttributes {
    /// Extent along each axis, fastest axis first
    pub dimensions: Vec<u64>,

    /// Block extent along each axis, fastest axis first
    pub block_size: Vec<u32>,

    /// Element type
    pub data_type: DataType,

    /// Block compression
    pub compression: Compression,
}

impl DatasetAttributes {
    /// Extract the array description from a parsed attribute document.
    ///
    /// Returns `NotADataset` when `dimensions` is absent, which is how N5
    /// distinguishes plain groups from datasets.
    pub fn from_json(path: &str, attrs: &Map<String, Value>) -> Result<Self, FormatError> {
        let dimensions_value = attrs
            .get("dimensions")
            .ok_or_else(|| FormatError::NotADataset(path.to_string()))?;
        let dimensions = u64_vector(path, "dimensions", dimensions_value)?;

        let block_size = attrs
            .get("blockSize")
            .ok_or_else(|| FormatError::MissingAttribute {
                path: path.to_string(),
                key: "blockSize",
            })
            .and_then(|v| u64_vector(path, "blockSize", v))?
            .into_iter()
            .map(|b| u32::try_from(b).ok().filter(|b| *b > 0))
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| FormatError::InvalidAttribute {
                path: path.to_string(),
                key: "blockSize",
                message: "block sizes must be between 1 and u32::MAX".to_string(),
            })?;

        if dimensions.is_empty() || block_size.len() != dimensions.len() {
            return Err(FormatError::InvalidAttribute {
                path: path.to_string(),
                key: "blockSize",
                message: format!(
                    "expected {} entries to match dimensions, got {}",
                    dimensions.len(),
                    block_size.len()
                ),
            });
        }

        let data_type = attrs
            .get("dataType")
            .and_then(Value::as_str)
            .ok_or_else(|| FormatError::MissingAttribute {
                path: path.to_string(),
                key: "dataType",
            })?
            .parse::<DataType>()?;

        // Older containers use a bare "compressionType" string
        let compression = match (attrs.get("compression"), attrs.get("compressionType")) {
            (Some(value), _) => Compression::from_json(path, value)?,
            (None, Some(Value::String(kind))) => {
                Compression::from_json(path, &json!({ "type": kind }))?
            }
            _ => Compression::Raw,
        };

        Ok(Self {
            dimensions,
            block_size,
            data_type,
            compression,
        })
    }

    /// Serialize into an attribute document, merging in `extra` user keys.
    ///
    /// Reserved N5 keys in `extra` are ignored.
    pub fn to_json(&self, extra: &Map<String, Value>) -> Map<String, Value> {
        let mut attrs = Map::new();
        for (key, value) in extra {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                attrs.insert(key.clone(), value.clone());
            }
        }
        attrs.insert("dimensions".to_string(), json!(self.dimensions));
        attrs.insert("blockSize".to_string(), json!(self.block_size));
        attrs.insert("dataType".to_string(), json!(self.data_type.name()));
        attrs.insert("compression".to_string(), self.compression.to_json());
        attrs
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    /// Number of blocks along each axis (N5 order).
    pub fn grid_shape(&self) -> Vec<u64> {
        self.dimensions
            .iter()
            .zip(&self.block_size)
            .map(|(&d, &b)| d.div_ceil(b as u64))
            .collect()
    }
}

/// Parse raw `attributes.json` bytes into a JSON object.
pub fn parse_attributes(path: &str, bytes: &[u8]) -> Result<Map<String, Value>, FormatError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| FormatError::MalformedAttributes {
            path: path.to_string(),
            message: e.to_string(),
        })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(FormatError::MalformedAttributes {
            path: path.to_string(),
            message: "top-level value is not an object".to_string(),
        }),
    }
}

/// Read a numeric 3-vector attribute.
///
/// Accepts a bare array (`[0.23, 0.23, 0.42]`) or the object form used by
/// some N5 writers (`{"dimensions": [0.23, 0.23, 0.42], "unit": "um"}`).
/// Integers are accepted and widened to `f64`.
pub fn read_vector3(
    path: &str,
    attrs: &Map<String, Value>,
    key: &'static str,
) -> Result<[f64; 3], FormatError> {
    let value = attrs.get(key).ok_or_else(|| FormatError::MissingAttribute {
        path: path.to_string(),
        key,
    })?;

    let invalid = |message: String| FormatError::InvalidAttribute {
        path: path.to_string(),
        key,
        message,
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("dimensions")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("object form must carry a 'dimensions' array".to_string()))?,
        other => return Err(invalid(format!("expected a numeric array, got {}", other))),
    };

    if items.len() != 3 {
        return Err(invalid(format!("expected 3 elements, got {}", items.len())));
    }

    let mut out = [0.0; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .ok_or_else(|| invalid(format!("element {} is not a number", item)))?;
    }
    Ok(out)
}

/// Read the unit of a `pixelResolution` object, if it carries one.
pub fn read_unit(attrs: &Map<String, Value>) -> Option<String> {
    attrs
        .get(PIXEL_RESOLUTION_KEY)
        .and_then(Value::as_object)
        .and_then(|obj| obj.get("unit"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn u64_vector(path: &str, key: &'static str, value: &Value) -> Result<Vec<u64>, FormatError> {
    value
        .as_array()
        .and_then(|items| items.iter().map(Value::as_u64).collect::<Option<Vec<u64>>>())
        .ok_or_else(|| FormatError::InvalidAttribute {
            path: path.to_string(),
            key,
            message: "expected an array of non-negative integers".to_string(),
        })
}
