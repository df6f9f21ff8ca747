//! PUP header parsing.
//!
//! The fixed header is read unencrypted from the start of the archive and
//! validated against the format's required values. The header extension that
//! follows it on disk is encrypted and handled by the parser.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;
use tracing::debug;

use crate::{Error, Result};

/// PUP magic value.
pub const PUP_MAGIC: u32 = 0x1D3D154F;

/// Size of the fixed header on disk.
pub const HEADER_SIZE: usize = 20;

/// Size of the header extension on disk, excluding segment entries.
pub const HEADER_EX_SIZE: usize = 16;

/// JIG archives use a separate key set; explicitly unsupported.
pub const FLAG_JIG: u16 = 0x1;

const REQUIRED_VERSION: u8 = 0;
const REQUIRED_MODE: u8 = 1;
const ENDIAN_LITTLE: u8 = 1;
const REQUIRED_ATTR: u8 = 0x12;

/// Fixed PUP header.
#[derive(Debug, Clone)]
pub struct PupHeader {
    pub magic: u32,
    pub version: u8,
    pub mode: u8,
    pub endian: u8,
    pub attr: u8,
    pub flags: u16,
    pub content: u16,
    /// Size of the fixed header plus the encrypted header-extension block.
    pub hdr_size: u32,
    /// Size of the encrypted segment-metadata block.
    pub meta_size: u32,
}

impl PupHeader {
    /// Parse and validate the fixed header.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != PUP_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let version = r.read_u8()?;
        let mode = r.read_u8()?;
        let endian = r.read_u8()?;
        let attr = r.read_u8()?;
        check_field("version", REQUIRED_VERSION, version)?;
        check_field("mode", REQUIRED_MODE, mode)?;
        check_field("endian", ENDIAN_LITTLE, endian)?;
        check_field("attr", REQUIRED_ATTR, attr)?;

        let flags = r.read_u16::<LittleEndian>()?;
        if flags & FLAG_JIG != 0 {
            return Err(Error::Unsupported("JIG archives"));
        }

        let content = r.read_u16::<LittleEndian>()?;
        let hdr_size = r.read_u32::<LittleEndian>()?;
        let meta_size = r.read_u32::<LittleEndian>()?;

        debug!("PUP header: hdr_size={hdr_size}, meta_size={meta_size}, flags={flags:#x}");

        Ok(Self {
            magic,
            version,
            mode,
            endian,
            attr,
            flags,
            content,
            hdr_size,
            meta_size,
        })
    }

    /// Size of the encrypted header-extension block following the fixed
    /// header.
    pub fn ext_size(&self) -> usize {
        (self.hdr_size as usize).saturating_sub(HEADER_SIZE)
    }
}

fn check_field(field: &'static str, expected: u8, actual: u8) -> Result<()> {
    if actual != expected {
        return Err(Error::InvalidHeaderField {
            field,
            expected: u64::from(expected),
            actual: u64::from(actual),
        });
    }
    Ok(())
}

/// Header extension, recovered from the decrypted header-extension block.
#[derive(Debug, Clone)]
pub struct PupHeaderEx {
    pub image_size: u64,
    pub segment_count: u16,
    pub hash_count: u16,
    pub flags: u32,
}

impl PupHeaderEx {
    /// Parse the header extension from a decrypted buffer.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let image_size = r.read_u64::<LittleEndian>()?;
        let segment_count = r.read_u16::<LittleEndian>()?;
        let hash_count = r.read_u16::<LittleEndian>()?;
        let flags = r.read_u32::<LittleEndian>()?;

        Ok(Self {
            image_size,
            segment_count,
            hash_count,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn valid_header_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&PUP_MAGIC.to_le_bytes());
        data.push(0); // version
        data.push(1); // mode
        data.push(1); // endian
        data.push(0x12); // attr
        data.extend_from_slice(&0u16.to_le_bytes()); // flags
        data.extend_from_slice(&0u16.to_le_bytes()); // content
        data.extend_from_slice(&84u32.to_le_bytes()); // hdr_size
        data.extend_from_slice(&64u32.to_le_bytes()); // meta_size
        data
    }

    #[test]
    fn test_parse_valid_header() {
        let data = valid_header_bytes();
        assert_eq!(data.len(), HEADER_SIZE);

        let header = PupHeader::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(header.magic, PUP_MAGIC);
        assert_eq!(header.hdr_size, 84);
        assert_eq!(header.meta_size, 64);
        assert_eq!(header.ext_size(), 64);
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = valid_header_bytes();
        data[0] = 0xFF;
        let err = PupHeader::parse(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic(_)));
    }

    #[test]
    fn test_invalid_required_fields() {
        for (pos, field) in [(4, "version"), (5, "mode"), (6, "endian"), (7, "attr")] {
            let mut data = valid_header_bytes();
            data[pos] ^= 0xFF;
            let err = PupHeader::parse(&mut Cursor::new(&data)).unwrap_err();
            assert!(
                matches!(err, Error::InvalidHeaderField { field: f, .. } if f == field),
                "field {field}: actual error {err:?}",
            );
        }
    }

    #[test]
    fn test_jig_flag_rejected() {
        let mut data = valid_header_bytes();
        data[8] |= FLAG_JIG as u8;
        let err = PupHeader::parse(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(err, Error::Unsupported("JIG archives")));
    }

    #[test]
    fn test_header_ex_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x1000u64.to_le_bytes()); // image_size
        data.extend_from_slice(&5u16.to_le_bytes()); // segment_count
        data.extend_from_slice(&2u16.to_le_bytes()); // hash_count
        data.extend_from_slice(&0u32.to_le_bytes()); // flags
        assert_eq!(data.len(), HEADER_EX_SIZE);

        let ex = PupHeaderEx::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(ex.image_size, 0x1000);
        assert_eq!(ex.segment_count, 5);
        assert_eq!(ex.hash_count, 2);
    }
}
