//! Encryption and key management support for PUP firmware archives.
//!
//! This crate provides:
//! - Named-key management for the archive-level keys (`"pup.hdr"`,
//!   `"pup.root_key"`)
//! - Raw AES-128-CBC encrypt/decrypt primitives
//! - The PUP segment cipher: AES-128-CBC with the format's custom
//!   ciphertext-stealing handling of non-block-aligned buffers
//! - Key file loading from disk

pub mod aes_cbc;
pub mod error;
pub mod key_store;

pub use error::CryptoError;
pub use key_store::{KeyStore, SegmentKey};

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
