//! Error types for building and reading postcode binfiles.

use thiserror::Error;

/// The error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum PcbinError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata document could not be encoded or decoded.
    #[error("metadata document error: {0}")]
    Json(#[from] serde_json::Error),

    /// The metadata codec failed to compress or decompress the blob.
    #[error("metadata codec error: {0}")]
    Codec(String),

    /// A value does not fit the bit width reserved for it. The dataset
    /// exceeds the fixed capacity of the format.
    #[error("capacity exceeded for {field}: value {value} does not fit in {bits} bits")]
    Capacity {
        field: &'static str,
        value: u64,
        bits: u32,
    },

    /// A postcode, incode or outcode is not present in the file.
    #[error("not found: {0}")]
    NotFound(String),

    /// The text cannot be split or encoded as a postcode.
    #[error("invalid postcode: {0}")]
    InvalidPostcode(String),

    /// The file is truncated or its metadata is inconsistent.
    #[error("malformed binfile: {0}")]
    Malformed(String),

    #[error("binfile is closed")]
    Closed,
}

impl PcbinError {
    /// True for the recoverable lookup miss; every other variant is fatal
    /// for the build or for the open file handle.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PcbinError::NotFound(_))
    }

    pub(crate) fn capacity(field: &'static str, value: u64, bits: u32) -> Self {
        PcbinError::Capacity { field, value, bits }
    }
}

/// A convenience `Result` alias using [`PcbinError`].
pub type Result<T> = std::result::Result<T, PcbinError>;
