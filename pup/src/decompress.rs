//! Block decompression.

use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::trace;

use crate::{Error, Result};

/// Inflate one compressed block, expecting exactly `expected_len` output
/// bytes.
pub fn inflate_block(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    trace!("Inflating {} bytes, expecting {} out", data.len(), expected_len);

    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut result)
        .map_err(|e| Error::Decompress(e.to_string()))?;

    if result.len() != expected_len {
        return Err(Error::DecompressedSizeMismatch {
            expected: expected_len as u64,
            actual: result.len() as u64,
        });
    }

    Ok(result)
}
