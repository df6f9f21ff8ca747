//! Named-key management for PUP archives.
//!
//! The archive header and segment metadata blocks are encrypted under
//! well-known named keys (`"pup.hdr"`, `"pup.root_key"`). Key material is
//! not distributable with this crate; it is loaded from key files or
//! inserted by the host program.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::aes_cbc::{self, BLOCK_SIZE, KEY_SIZE};
use crate::error::CryptoError;

/// A 16-byte AES key with its 16-byte IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentKey {
    pub key: [u8; KEY_SIZE],
    pub iv: [u8; BLOCK_SIZE],
}

/// Store of named encryption keys.
#[derive(Debug, Default)]
pub struct KeyStore {
    /// Map of key name to key material.
    keys: HashMap<String, SegmentKey>,
}

impl KeyStore {
    /// Create a key store with no pre-loaded keys.
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Get a key by name.
    pub fn get(&self, name: &str) -> Option<&SegmentKey> {
        self.keys.get(name)
    }

    /// Add a key to the store.
    pub fn insert(&mut self, name: impl Into<String>, key: SegmentKey) {
        self.keys.insert(name.into(), key);
    }

    /// Number of keys in the store.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Decrypt a buffer in place under a named key, using the PUP segment
    /// cipher.
    pub fn decrypt(&self, name: &str, data: &mut [u8]) -> Result<(), CryptoError> {
        let entry = self
            .keys
            .get(name)
            .ok_or_else(|| CryptoError::KeyNotFound(name.to_string()))?;
        aes_cbc::decrypt_segment(data, &entry.key, &entry.iv)
    }

    /// Load keys from a text file.
    ///
    /// Each line holds `name keyhex ivhex`, whitespace-separated. Empty
    /// lines and `#`/`//` comments are skipped; malformed lines are logged
    /// and skipped. Returns the number of keys loaded.
    pub fn load_key_file(&mut self, path: &Path) -> Result<usize, CryptoError> {
        let content = fs::read_to_string(path)?;
        let mut loaded = 0;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                warn!("Skipping invalid key line {}: {}", line_num + 1, line);
                continue;
            }

            match (parse_hex_16(parts[1]), parse_hex_16(parts[2])) {
                (Ok(key), Ok(iv)) => {
                    self.insert(parts[0], SegmentKey { key, iv });
                    loaded += 1;
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Failed to parse key on line {}: {}", line_num + 1, e);
                }
            }
        }

        info!("Loaded {} keys from {:?}", loaded, path);
        Ok(loaded)
    }

    /// Load keys from standard locations: the `PUP_KEYS_PATH` environment
    /// variable (file or directory), then `~/.config/pup/`.
    pub fn load_from_standard_dirs(&mut self) -> Result<usize, CryptoError> {
        let mut total_loaded = 0;

        if let Ok(path) = std::env::var("PUP_KEYS_PATH") {
            let path = PathBuf::from(path);
            if path.is_file() {
                match self.load_key_file(&path) {
                    Ok(count) => total_loaded += count,
                    Err(e) => warn!("Failed to load keys from PUP_KEYS_PATH: {}", e),
                }
            } else if path.is_dir() {
                total_loaded += self.load_keys_from_dir(&path)?;
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let config_dir = home_dir.join(".config").join("pup");
            if config_dir.exists() {
                total_loaded += self.load_keys_from_dir(&config_dir)?;
            }
        }

        Ok(total_loaded)
    }

    /// Load all key files from a directory.
    fn load_keys_from_dir(&mut self, dir: &Path) -> Result<usize, CryptoError> {
        let mut total_loaded = 0;

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.ends_with(".txt") || name.contains("key") {
                match self.load_key_file(&path) {
                    Ok(count) => {
                        total_loaded += count;
                        debug!("Loaded {} keys from {:?}", count, path);
                    }
                    Err(e) => {
                        warn!("Failed to load keys from {:?}: {}", path, e);
                    }
                }
            }
        }

        Ok(total_loaded)
    }
}

/// Parse a 32-hex-digit string into 16 bytes.
fn parse_hex_16(hex_str: &str) -> Result<[u8; 16], CryptoError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes =
        hex::decode(hex_str).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeySize {
            expected: 16,
            actual,
        })
}
