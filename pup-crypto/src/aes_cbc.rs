//! AES-128-CBC primitives and the PUP segment cipher.
//!
//! Segment payloads are encrypted with AES-128-CBC without padding. Buffers
//! whose length is not a multiple of 16 carry a ciphertext-stealing tail
//! specific to this format: the keystream for the trailing partial block is
//! derived by re-encrypting the last aligned ciphertext block under the same
//! key with an all-zero IV, and XORed over the tail bytes.

use aes::Aes128;
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::{CryptoError, Result};

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// AES-128 key size in bytes.
pub const KEY_SIZE: usize = 16;
/// AES block / IV size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Decrypt a block-aligned buffer in place with AES-128-CBC, no padding.
pub fn decrypt_cbc(data: &mut [u8], key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::UnalignedBuffer(data.len()));
    }
    if data.is_empty() {
        return Ok(());
    }

    let decryptor = Aes128CbcDec::new(key.into(), iv.into());
    decryptor
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    Ok(())
}

/// Encrypt a block-aligned buffer in place with AES-128-CBC, no padding.
pub fn encrypt_cbc(data: &mut [u8], key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::UnalignedBuffer(data.len()));
    }
    if data.is_empty() {
        return Ok(());
    }

    let len = data.len();
    let encryptor = Aes128CbcEnc::new(key.into(), iv.into());
    encryptor
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    Ok(())
}

/// Keystream block for the ciphertext-stealing tail.
///
/// The re-encryption always runs under an all-zero IV.
fn tail_keystream(stolen: &[u8; BLOCK_SIZE], key: &[u8; KEY_SIZE]) -> Result<[u8; BLOCK_SIZE]> {
    let mut keystream = *stolen;
    encrypt_cbc(&mut keystream, key, &[0u8; BLOCK_SIZE])?;
    Ok(keystream)
}

/// Decrypt a PUP segment buffer in place.
///
/// The aligned prefix (`len & !0xF` bytes) is standard AES-128-CBC. A
/// non-empty tail (`len & 0xF` bytes) is recovered by XORing it with a
/// keystream derived from the last aligned *ciphertext* block, captured
/// before the prefix is decrypted. A buffer shorter than one block derives
/// the keystream from an all-zero block.
pub fn decrypt_segment(data: &mut [u8], key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE]) -> Result<()> {
    let aligned = data.len() & !0xF;
    let overflow = data.len() & 0xF;

    let mut stolen = [0u8; BLOCK_SIZE];
    if overflow != 0 && aligned >= BLOCK_SIZE {
        stolen.copy_from_slice(&data[aligned - BLOCK_SIZE..aligned]);
    }

    decrypt_cbc(&mut data[..aligned], key, iv)?;

    if overflow != 0 {
        let keystream = tail_keystream(&stolen, key)?;
        for (byte, ks) in data[aligned..].iter_mut().zip(keystream.iter()) {
            *byte ^= ks;
        }
    }

    Ok(())
}

/// Encrypt a PUP segment buffer in place. Exact inverse of
/// [`decrypt_segment`].
///
/// After CBC-encrypting the aligned prefix, the tail keystream derives from
/// the last aligned block of the freshly produced ciphertext, so decryption
/// captures the identical block.
pub fn encrypt_segment(data: &mut [u8], key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE]) -> Result<()> {
    let aligned = data.len() & !0xF;
    let overflow = data.len() & 0xF;

    encrypt_cbc(&mut data[..aligned], key, iv)?;

    if overflow != 0 {
        let mut stolen = [0u8; BLOCK_SIZE];
        if aligned >= BLOCK_SIZE {
            stolen.copy_from_slice(&data[aligned - BLOCK_SIZE..aligned]);
        }
        let keystream = tail_keystream(&stolen, key)?;
        for (byte, ks) in data[aligned..].iter_mut().zip(keystream.iter()) {
            *byte ^= ks;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A, F.2 CBC-AES128
    const NIST_KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    const NIST_IV: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];
    const NIST_PLAIN: [u8; 32] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a, 0xae, 0x2d, 0x8a, 0x57, 0x1e, 0x03, 0xac, 0x9c, 0x9e, 0xb7, 0x6f, 0xac, 0x45, 0xaf,
        0x8e, 0x51,
    ];
    const NIST_CIPHER: [u8; 32] = [
        0x76, 0x49, 0xab, 0xac, 0x81, 0x19, 0xb2, 0x46, 0xce, 0xe9, 0x8e, 0x9b, 0x12, 0xe9, 0x19,
        0x7d, 0x50, 0x86, 0xcb, 0x9b, 0x50, 0x72, 0x19, 0xee, 0x95, 0xdb, 0x11, 0x3a, 0x91, 0x76,
        0x78, 0xb2,
    ];

    #[test]
    fn test_cbc_decrypt_nist_vector() {
        let mut buf = NIST_CIPHER;
        decrypt_cbc(&mut buf, &NIST_KEY, &NIST_IV).unwrap();
        assert_eq!(buf, NIST_PLAIN);
    }

    #[test]
    fn test_cbc_encrypt_nist_vector() {
        let mut buf = NIST_PLAIN;
        encrypt_cbc(&mut buf, &NIST_KEY, &NIST_IV).unwrap();
        assert_eq!(buf, NIST_CIPHER);
    }

    #[test]
    fn test_cbc_rejects_unaligned() {
        let mut buf = [0u8; 17];
        let err = decrypt_cbc(&mut buf, &NIST_KEY, &NIST_IV).unwrap_err();
        assert!(matches!(err, CryptoError::UnalignedBuffer(17)));

        let err = encrypt_cbc(&mut buf, &NIST_KEY, &NIST_IV).unwrap_err();
        assert!(matches!(err, CryptoError::UnalignedBuffer(17)));
    }

    #[test]
    fn test_segment_cipher_aligned_matches_cbc() {
        // On aligned buffers the segment cipher is plain CBC.
        let mut segment = NIST_CIPHER;
        decrypt_segment(&mut segment, &NIST_KEY, &NIST_IV).unwrap();
        assert_eq!(segment, NIST_PLAIN);
    }

    #[test]
    fn test_segment_cipher_round_trip_unaligned() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];

        for len in [1usize, 5, 15, 17, 20, 31, 37, 48, 100] {
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let mut buf = plaintext.clone();

            encrypt_segment(&mut buf, &key, &iv).unwrap();
            if len >= BLOCK_SIZE {
                assert_ne!(buf, plaintext, "len {len} did not change under encryption");
            }
            decrypt_segment(&mut buf, &key, &iv).unwrap();
            assert_eq!(buf, plaintext, "round trip failed for len {len}");
        }
    }

    #[test]
    fn test_tail_xor_construction() {
        // The tail must be exactly ciphertext XOR E_k(last aligned ciphertext
        // block) under a zero IV.
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let ciphertext: Vec<u8> = (0..37).map(|i| (i * 7) as u8).collect();

        let mut expected_ks = [0u8; BLOCK_SIZE];
        expected_ks.copy_from_slice(&ciphertext[16..32]);
        encrypt_cbc(&mut expected_ks, &key, &[0u8; BLOCK_SIZE]).unwrap();

        let mut buf = ciphertext.clone();
        decrypt_segment(&mut buf, &key, &iv).unwrap();

        for i in 0..5 {
            assert_eq!(buf[32 + i], ciphertext[32 + i] ^ expected_ks[i]);
        }
    }

    #[test]
    fn test_sub_block_buffer_uses_zero_block() {
        // A buffer shorter than one block has no aligned prefix; the
        // keystream derives from an all-zero block.
        let key = [0x33u8; 16];
        let iv = [0x44u8; 16];
        let ciphertext = [0xA5u8; 7];

        let mut expected_ks = [0u8; BLOCK_SIZE];
        encrypt_cbc(&mut expected_ks, &key, &[0u8; BLOCK_SIZE]).unwrap();

        let mut buf = ciphertext;
        decrypt_segment(&mut buf, &key, &iv).unwrap();

        for i in 0..7 {
            assert_eq!(buf[i], ciphertext[i] ^ expected_ks[i]);
        }
    }
}
