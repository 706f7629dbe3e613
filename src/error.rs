use std::path::PathBuf;

use thiserror::Error;

/// I/O errors that can occur when reading from a chunked store
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Error from the local filesystem
    #[error("Local storage error at {path}: {message}")]
    Local { path: String, message: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Store location could not be interpreted
    #[error("Invalid store location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },
}

/// Errors raised while interpreting N5 containers and their metadata.
///
/// This is the "data-format error" of the loader: missing levels, missing
/// attributes and malformed vectors all end up here rather than being
/// replaced with defaults.
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the store
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Requested group or resolution level does not exist
    #[error("Dataset not found: {0}")]
    MissingDataset(String),

    /// Path exists but carries no array (a group, not a dataset)
    #[error("Not a dataset: {0} has no 'dimensions' attribute")]
    NotADataset(String),

    /// attributes.json could not be parsed
    #[error("Malformed attributes at {path}: {message}")]
    MalformedAttributes { path: String, message: String },

    /// Required attribute is missing
    #[error("Missing attribute '{key}' on {path}")]
    MissingAttribute { path: String, key: &'static str },

    /// Attribute is present but has the wrong type or length
    #[error("Invalid attribute '{key}' on {path}: {message}")]
    InvalidAttribute {
        path: String,
        key: &'static str,
        message: String,
    },

    /// Spacing has a zero, negative or non-finite component
    #[error("Invalid spacing {spacing:?}: every component must be finite and > 0")]
    InvalidSpacing { spacing: [f64; 3] },

    /// Data type not handled by this crate
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Compression scheme not handled by this crate
    #[error("Unsupported compression: {0} (only raw and gzip are supported)")]
    UnsupportedCompression(String),

    /// Block header advertises a mode other than default/varlength
    #[error("Unsupported block mode {mode} in {key}")]
    UnsupportedBlockMode { key: String, mode: u16 },

    /// Block bytes are truncated or inconsistent with the dataset
    #[error("Invalid block {key}: {message}")]
    InvalidBlock { key: String, message: String },

    /// Region read would fall outside the volume
    #[error("Region out of bounds: offset {offset:?} + shape {shape:?} exceeds volume {volume:?}")]
    RegionOutOfBounds {
        offset: Vec<u64>,
        shape: Vec<u64>,
        volume: Vec<u64>,
    },

    /// Number of axes does not match
    #[error("Dimension mismatch: expected {expected} axes, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Buffer length does not match shape and data type
    #[error("Buffer length mismatch: expected {expected} bytes, got {actual}")]
    BufferLength { expected: usize, actual: usize },

    /// Element type requested does not match the stored data type
    #[error("Data type mismatch: volume holds {stored}, requested {requested}")]
    DataTypeMismatch {
        stored: &'static str,
        requested: &'static str,
    },
}

/// Errors raised while writing interchange files
#[derive(Debug, Error)]
pub enum ExportError {
    /// Failure reading the source volume
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Filesystem failure on the output path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output extension is not a known interchange format
    #[error("Unsupported export format for {0} (expected .nii, .nii.gz, .n5, .jpg or .jpeg)")]
    UnsupportedFormat(PathBuf),

    /// NIfTI file could not be written or read back
    #[error("NIfTI error on {path}: {message}")]
    Nifti { path: PathBuf, message: String },

    /// Preview image could not be encoded
    #[error("Image encoding error: {0}")]
    Image(String),

    /// Volume shape cannot be exported in the requested format
    #[error("Unsupported shape {shape:?}: {reason}")]
    UnsupportedShape { shape: Vec<usize>, reason: String },
}

/// Errors raised at the external registration pipeline boundary
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipeline inputs are inconsistent
    #[error("Invalid registration request: {0}")]
    InvalidRequest(String),

    /// Output directory could not be created
    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pipeline program could not be started
    #[error("Failed to launch pipeline program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The pipeline ran but reported failure
    #[error("Pipeline exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The pipeline response could not be interpreted
    #[error("Malformed pipeline response: {0}")]
    InvalidResponse(String),

    /// An output the pipeline promised is not on disk
    #[error("Pipeline did not produce the {what} at {location}")]
    MissingOutput {
        what: &'static str,
        location: String,
    },

    /// The affine transform file is not a 4x4 homogeneous matrix
    #[error("Invalid affine transform in {path}: {message}")]
    InvalidAffine { path: PathBuf, message: String },

    /// Failure opening one of the pipeline outputs
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

/// Top-level error for the load → register → export workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<IoError> for WorkflowError {
    fn from(err: IoError) -> Self {
        WorkflowError::Format(FormatError::Io(err))
    }
}
