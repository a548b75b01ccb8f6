//! Error types for land-cover classification

use thiserror::Error;

/// Main error type for classification pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Grid geometry mismatch for band '{band}': {reason}")]
    GeometryMismatch { band: String, reason: String },

    #[error("Band '{0}' not found in image")]
    MissingBand(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// No usable observations survived filtering or masking
    #[error("No data available at stage '{stage}': {reason}")]
    DataAvailability { stage: &'static str, reason: String },

    /// A class has zero training samples
    #[error("Class {class} has no training samples (per-class counts: {counts:?})")]
    InsufficientData { class: u8, counts: Vec<usize> },

    /// Feature vector length or order disagrees with the training schema
    #[error("Schema mismatch in {context}: expected {expected}, got {actual}")]
    SchemaMismatch {
        expected: String,
        actual: String,
        context: &'static str,
    },

    #[error("Accuracy requested on an empty test set")]
    EmptyTestSet,

    #[error("Export of {requested} pixels exceeds the limit of {max}")]
    ExportTooLarge { requested: u64, max: u64 },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for classification operations
pub type Result<T> = std::result::Result<T, Error>;
