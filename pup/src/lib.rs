//! PUP firmware-update archive decoding.
//!
//! A PUP archive is a header-described container of named segments, each
//! optionally encrypted, compressed, and block-split. This crate parses and
//! validates the archive header, builds the segment table, and reconstructs
//! individual segments from their encrypted/compressed blocks.
//!
//! The archive-level header-extension and metadata blocks are encrypted
//! under the named keys [`HEADER_KEY_NAME`] and [`ROOT_KEY_NAME`], resolved
//! through a [`pup_crypto::KeyStore`]. Per-segment payloads use raw
//! AES-128-CBC key/IV pairs carried in the metadata block.

pub mod decompress;
pub mod error;
pub mod header;
pub mod parser;
pub mod segment;
pub mod verify;

pub use error::{Error, Result};
pub use header::{PUP_MAGIC, PupHeader, PupHeaderEx};
pub use parser::{Extracted, PupParser};
pub use segment::{Digest, Extent, Segment, SegmentEntry, SegmentMeta};
pub use verify::{NoVerifier, SignatureVerifier, VerifyStatus};

/// Named key for the encrypted header-extension block.
pub const HEADER_KEY_NAME: &str = "pup.hdr";

/// Named key for the encrypted segment-metadata block.
pub const ROOT_KEY_NAME: &str = "pup.root_key";
