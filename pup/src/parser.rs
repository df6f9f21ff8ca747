//! PUP archive parser and segment extractor.
//!
//! [`PupParser::open`] validates the fixed header, decrypts the
//! header-extension and metadata blocks with the archive-level named keys,
//! and builds the segment table. The table is immutable afterwards;
//! extraction only moves the stream cursor, so identical `get` calls return
//! identical output. `get` takes `&mut self` because seek+read pairs on the
//! shared stream must not interleave; concurrent extraction requires
//! independent parser instances over independent stream handles.

use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::{debug, trace};

use pup_crypto::{KeyStore, aes_cbc};

use crate::decompress::inflate_block;
use crate::header::{HEADER_EX_SIZE, HEADER_SIZE, PupHeader, PupHeaderEx};
use crate::segment::{
    DIGEST_SIZE, Digest, EXTENT_SIZE, Extent, SEGMENT_ENTRY_SIZE, SEGMENT_META_SIZE, Segment,
    SegmentEntry, SegmentMeta,
};
use crate::verify::{NoVerifier, SignatureVerifier, VerifyStatus};
use crate::{Error, HEADER_KEY_NAME, ROOT_KEY_NAME, Result};

/// Extracted segment data with its verification status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub data: Vec<u8>,
    pub verification: VerifyStatus,
}

/// PUP archive parser.
pub struct PupParser<S> {
    stream: S,
    header: PupHeader,
    header_ex: PupHeaderEx,
    segments: Vec<Segment>,
    verifier: Box<dyn SignatureVerifier>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for PupParser<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PupParser")
            .field("stream", &self.stream)
            .field("header", &self.header)
            .field("header_ex", &self.header_ex)
            .field("segments", &self.segments)
            .field("verifier", &"<dyn SignatureVerifier>")
            .finish()
    }
}

impl<S: Read + Seek> PupParser<S> {
    /// Open an archive with the default no-op signature verifier.
    pub fn open(stream: S, keys: &KeyStore) -> Result<Self> {
        Self::open_with_verifier(stream, keys, Box::new(NoVerifier))
    }

    /// Open an archive, verifying signed segments through `verifier`.
    pub fn open_with_verifier(
        mut stream: S,
        keys: &KeyStore,
        verifier: Box<dyn SignatureVerifier>,
    ) -> Result<Self> {
        // Read and validate the fixed header
        stream.seek(SeekFrom::Start(0))?;
        let mut fixed = [0u8; HEADER_SIZE];
        stream.read_exact(&mut fixed)?;
        let header = PupHeader::parse(&mut Cursor::new(&fixed[..]))?;

        // Decrypt the header extension and segment entries
        let mut ext_buffer = vec![0u8; header.ext_size()];
        stream.read_exact(&mut ext_buffer)?;
        keys.decrypt(HEADER_KEY_NAME, &mut ext_buffer)?;
        let (header_ex, entries) = parse_header_ext(&ext_buffer)?;

        debug!(
            "PUP archive: {} segments, image_size={}",
            header_ex.segment_count, header_ex.image_size
        );

        // Decrypt the segment metadata
        let mut meta_buffer = vec![0u8; header.meta_size as usize];
        stream.read_exact(&mut meta_buffer)?;
        keys.decrypt(ROOT_KEY_NAME, &mut meta_buffer)?;
        let metas = parse_metas(&meta_buffer, usize::from(header_ex.segment_count))?;

        let segments = entries
            .into_iter()
            .zip(metas)
            .map(|(entry, meta)| Segment { entry, meta })
            .collect();

        Ok(Self {
            stream,
            header,
            header_ex,
            segments,
            verifier,
        })
    }

    /// Fixed archive header.
    pub fn header(&self) -> &PupHeader {
        &self.header
    }

    /// Decrypted header extension.
    pub fn header_ex(&self) -> &PupHeaderEx {
        &self.header_ex
    }

    /// The segment table.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Index of the content segment with the given id.
    pub fn find(&self, id: u64) -> Result<usize> {
        self.find_by(id, false)
    }

    /// Index of the companion info segment for the given id.
    pub fn find_info(&self, id: u64) -> Result<usize> {
        self.find_by(id, true)
    }

    fn find_by(&self, id: u64, info: bool) -> Result<usize> {
        self.segments
            .iter()
            .position(|s| s.entry.id() == id && s.entry.is_info() == info)
            .ok_or(Error::SegmentNotFound { id, info })
    }

    /// Extract the content segment with the given id.
    pub fn get(&mut self, id: u64) -> Result<Extracted> {
        let index = self.find(id)?;
        if self.segments[index].entry.has_blocks() {
            self.get_blocked(index)
        } else {
            self.get_nonblocked(index)
        }
    }

    /// Reconstruct a block-split segment from its extents.
    fn get_blocked(&mut self, index: usize) -> Result<Extracted> {
        let Segment { entry, meta } = self.segments[index];
        let block_size = entry.block_size();
        let block_count = entry.block_count() as usize;

        // Locate and read the companion info segment
        let info_index = self.find_info(entry.id())?;
        let info = self.segments[info_index];

        debug!(
            "Extracting segment {:#x}: {} blocks of {} bytes, file_size={}",
            entry.id(),
            block_count,
            block_size,
            entry.file_size
        );

        let mut info_buffer = self.read_at(info.entry.offset, info.entry.file_size as usize)?;
        let mut verification = VerifyStatus::NotSigned;
        if info.entry.is_encrypted() {
            aes_cbc::decrypt_segment(&mut info_buffer, &info.meta.data_key, &info.meta.data_iv)?;
        }
        if info.entry.is_compressed() {
            return Err(Error::Unsupported("compressed info segments"));
        }
        if info.entry.is_signed() {
            verification = verification.combine(self.verifier.verify(&info_buffer, None)?);
        }

        let (digests, extents) = parse_info_tables(&info_buffer, &info.entry, block_count)?;

        // Walk the extents in block order
        let mut remaining = entry.file_size;
        let mut segment = Vec::with_capacity(entry.file_size as usize);
        for (block_index, extent) in extents.iter().enumerate() {
            let mut block =
                self.read_at(entry.offset + u64::from(extent.offset), extent.size as usize)?;

            // Usable compressed length: aligned size minus the low nibble,
            // not a plain round-down.
            let cur_zsize =
                (u64::from(extent.size) & !0xF).wrapping_sub(u64::from(extent.size) & 0xF);
            let cur_size = block_size.min(remaining);
            remaining -= cur_size;

            trace!(
                "Block {block_index}: extent ({}, {}), zsize={cur_zsize}, out={cur_size}",
                extent.offset, extent.size
            );

            if entry.is_signed() {
                verification =
                    verification.combine(self.verifier.verify(&block, digests.get(block_index))?);
            }
            if entry.is_encrypted() {
                // Blocks are ciphered independently; no chaining across blocks
                aes_cbc::decrypt_segment(&mut block, &meta.data_key, &meta.data_iv)?;
            }

            if entry.is_compressed() {
                let compressed =
                    block
                        .get(..cur_zsize as usize)
                        .ok_or(Error::TruncatedData {
                            expected: cur_zsize,
                            actual: block.len() as u64,
                        })?;
                let inflated = inflate_block(compressed, cur_size as usize)?;
                segment.extend_from_slice(&inflated);
            } else {
                let raw = block.get(..cur_size as usize).ok_or(Error::TruncatedData {
                    expected: cur_size,
                    actual: block.len() as u64,
                })?;
                segment.extend_from_slice(raw);
            }
        }

        Ok(Extracted {
            data: segment,
            verification,
        })
    }

    fn get_nonblocked(&mut self, _index: usize) -> Result<Extracted> {
        Err(Error::Unsupported("non-blocked segment extraction"))
    }

    /// Read `len` bytes at an absolute stream offset.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.stream.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        self.stream.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

/// Parse the decrypted header-extension block: the header extension followed
/// by `segment_count` contiguous segment entries.
fn parse_header_ext(buffer: &[u8]) -> Result<(PupHeaderEx, Vec<SegmentEntry>)> {
    if buffer.len() < HEADER_EX_SIZE {
        return Err(Error::TruncatedData {
            expected: HEADER_EX_SIZE as u64,
            actual: buffer.len() as u64,
        });
    }

    let mut cursor = Cursor::new(buffer);
    let header_ex = PupHeaderEx::parse(&mut cursor)?;

    let count = usize::from(header_ex.segment_count);
    let needed = HEADER_EX_SIZE + count * SEGMENT_ENTRY_SIZE;
    if buffer.len() < needed {
        return Err(Error::TruncatedData {
            expected: needed as u64,
            actual: buffer.len() as u64,
        });
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(SegmentEntry::parse(&mut cursor)?);
    }

    Ok((header_ex, entries))
}

/// Parse the decrypted metadata block into `count` metadata records.
fn parse_metas(buffer: &[u8], count: usize) -> Result<Vec<SegmentMeta>> {
    let needed = count * SEGMENT_META_SIZE;
    if buffer.len() < needed {
        return Err(Error::TruncatedData {
            expected: needed as u64,
            actual: buffer.len() as u64,
        });
    }

    let mut cursor = Cursor::new(buffer);
    let mut metas = Vec::with_capacity(count);
    for _ in 0..count {
        metas.push(SegmentMeta::parse(&mut cursor)?);
    }

    Ok(metas)
}

/// Parse an info segment's payload: optional digest table, then optional
/// extent table, both sized by the target segment's block count.
fn parse_info_tables(
    buffer: &[u8],
    info_entry: &SegmentEntry,
    block_count: usize,
) -> Result<(Vec<Digest>, Vec<Extent>)> {
    let mut needed = 0;
    if info_entry.has_digests() {
        needed += block_count * DIGEST_SIZE;
    }
    if info_entry.has_extents() {
        needed += block_count * EXTENT_SIZE;
    }
    if buffer.len() < needed {
        return Err(Error::TruncatedData {
            expected: needed as u64,
            actual: buffer.len() as u64,
        });
    }

    let mut cursor = Cursor::new(buffer);
    let mut digests = Vec::new();
    let mut extents = Vec::new();
    if info_entry.has_digests() {
        for _ in 0..block_count {
            digests.push(Digest::parse(&mut cursor)?);
        }
    }
    if info_entry.has_extents() {
        for _ in 0..block_count {
            extents.push(Extent::parse(&mut cursor)?);
        }
    }

    Ok((digests, extents))
}
