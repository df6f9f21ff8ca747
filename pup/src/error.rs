//! Error types for PUP parsing and extraction.

use thiserror::Error;

/// Result type for PUP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PUP error types.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid PUP magic.
    #[error("Invalid PUP magic: {0:#010x}")]
    InvalidMagic(u32),

    /// A fixed header field does not hold its required value.
    #[error("Invalid header field {field}: expected {expected:#x}, got {actual:#x}")]
    InvalidHeaderField {
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    /// Feature present in the archive but not supported by this decoder.
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// No segment matches the requested id and role.
    #[error("Segment not found: id {id:#x} (info: {info})")]
    SegmentNotFound { id: u64, info: bool },

    /// Truncated data.
    #[error("Truncated data: expected {expected} bytes, got {actual}")]
    TruncatedData { expected: u64, actual: u64 },

    /// Decompression failed.
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Decompressed block size differs from the declared size.
    #[error("Decompressed size mismatch: expected {expected} bytes, got {actual}")]
    DecompressedSizeMismatch { expected: u64, actual: u64 },

    /// Crypto error from pup-crypto.
    #[error("Crypto error: {0}")]
    Crypto(#[from] pup_crypto::CryptoError),
}
