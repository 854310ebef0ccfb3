//! Symmetric key material for sealing capabilities.

use crate::error::StartupError;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Accepted key sizes in bytes (AES-128 and AES-256).
pub const KEY_LENGTHS: [usize; 2] = [16, 32];

/// A validated AES key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    /// Wrap raw key bytes, rejecting any length other than 16 or 32.
    pub fn new(bytes: Vec<u8>) -> Result<Self, StartupError> {
        if !KEY_LENGTHS.contains(&bytes.len()) {
            return Err(StartupError::KeyLength(bytes.len()));
        }
        Ok(Self { bytes })
    }

    /// Generate a fresh key from the OS RNG.
    pub fn generate(len: usize) -> Result<Self, StartupError> {
        if !KEY_LENGTHS.contains(&len) {
            return Err(StartupError::KeyLength(len));
        }
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Ok(Self { bytes })
    }

    /// Parse key file contents.
    ///
    /// Hex text (32 or 64 hex digits, surrounding whitespace ignored) is
    /// decoded; anything else is taken as raw key bytes.
    pub fn parse(contents: &[u8], origin: &str) -> Result<Self, StartupError> {
        let trimmed = contents.trim_ascii();
        let looks_hex = matches!(trimmed.len(), 32 | 64)
            && trimmed.iter().all(|b| b.is_ascii_hexdigit());
        if looks_hex {
            let bytes =
                hex::decode(trimmed).map_err(|_| StartupError::KeyEncoding(origin.to_string()))?;
            return Self::new(bytes);
        }
        Self::new(contents.to_vec())
    }

    /// Load key material from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let contents = std::fs::read(path).map_err(|source| StartupError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents, &path.display().to_string())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex form, as written by `revcaps keygen`.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
