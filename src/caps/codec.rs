//! Sealing and opening capability envelopes.
//!
//! # Token format
//!
//! ```text
//! base64url_nopad( nonce[12] || AES-GCM(json(envelope)) || tag[16] )
//! ```
//!
//! The key is 16 bytes (AES-128-GCM) or 32 bytes (AES-256-GCM). The GCM tag
//! is the integrity check: any modified byte fails authentication and the
//! token is rejected as unparseable.
//!
//! # Nonces
//!
//! [`SealMode::Randomized`] draws a fresh nonce per seal, so granting the same
//! capability twice yields two different URLs. [`SealMode::Deterministic`]
//! derives the nonce from the plaintext with a keyed HMAC (a synthetic IV),
//! so identical grants yield identical URLs. A nonce only repeats when the
//! plaintext repeats, which reveals nothing beyond that equality.
//!
//! Opening does not care which mode minted a token.

use super::envelope::Envelope;
use super::key::KeyMaterial;
use crate::error::{DispatchError, SealError, StartupError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Label for deriving the synthetic-nonce subkey from the master key.
const NONCE_KEY_LABEL: &[u8] = b"revcaps/synthetic-nonce/v1";

/// URL-safe base64. Encodes without padding, decodes with or without it.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Nonce policy used when sealing.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SealMode {
    /// Fresh random nonce per seal.
    #[default]
    Randomized,
    /// Nonce derived from the plaintext; same grant, same URL.
    Deterministic,
}

impl SealMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Randomized => "randomized",
            Self::Deterministic => "deterministic",
        }
    }
}

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Cipher {
    fn new(key: &KeyMaterial) -> Result<Self, StartupError> {
        let bad_len = |_| StartupError::KeyLength(key.len());
        match key.len() {
            16 => Ok(Self::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key.as_bytes()).map_err(bad_len)?,
            ))),
            32 => Ok(Self::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key.as_bytes()).map_err(bad_len)?,
            ))),
            other => Err(StartupError::KeyLength(other)),
        }
    }

    fn bits(&self) -> usize {
        match self {
            Self::Aes128(_) => 128,
            Self::Aes256(_) => 256,
        }
    }

    fn encrypt(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|_| SealError::Encrypt)
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
        .ok()
    }
}

/// Seals envelopes into URL-safe tokens and opens them again.
///
/// Immutable after construction; share it behind an `Arc` and call from any
/// number of tasks without locking.
pub struct Codec {
    cipher: Cipher,
    nonce_mac: HmacSha256,
    mode: SealMode,
}

impl Codec {
    /// Build a codec. Fails only if the key length is unsupported.
    pub fn new(key: &KeyMaterial, mode: SealMode) -> Result<Self, StartupError> {
        let cipher = Cipher::new(key)?;

        let mut kdf = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
            .map_err(|_| StartupError::KeyLength(key.len()))?;
        kdf.update(NONCE_KEY_LABEL);
        let nonce_key = kdf.finalize().into_bytes();
        let nonce_mac = <HmacSha256 as Mac>::new_from_slice(&nonce_key)
            .map_err(|_| StartupError::KeyLength(key.len()))?;

        Ok(Self {
            cipher,
            nonce_mac,
            mode,
        })
    }

    #[inline]
    pub fn mode(&self) -> SealMode {
        self.mode
    }

    fn nonce_for(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        match self.mode {
            SealMode::Randomized => OsRng.fill_bytes(&mut nonce),
            SealMode::Deterministic => {
                let mut mac = self.nonce_mac.clone();
                mac.update(plaintext);
                let tag = mac.finalize().into_bytes();
                nonce.copy_from_slice(&tag[..NONCE_LEN]);
            }
        }
        nonce
    }

    /// Seal an envelope into a token (without the base path).
    pub fn seal(&self, envelope: &Envelope) -> Result<String, SealError> {
        let plaintext = serde_json::to_vec(envelope)?;
        let nonce = self.nonce_for(&plaintext);
        let ciphertext = self.cipher.encrypt(&nonce, &plaintext)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(TOKEN_ENGINE.encode(sealed))
    }

    /// Open a token (without the base path) back into its envelope.
    pub fn open(&self, token: &str) -> Result<Envelope, DispatchError> {
        let sealed = TOKEN_ENGINE
            .decode(token)
            .map_err(|e| DispatchError::Decode(e.to_string()))?;
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(DispatchError::Decode(format!(
                "token is {} bytes, need at least {}",
                sealed.len(),
                NONCE_LEN + TAG_LEN
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .ok_or_else(|| DispatchError::Parse("authentication failed".to_string()))?;

        serde_json::from_slice(&plaintext).map_err(|e| DispatchError::Parse(e.to_string()))
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("cipher", &format_args!("AES-{}-GCM", self.cipher.bits()))
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(len: usize, mode: SealMode) -> Codec {
        Codec::new(&KeyMaterial::generate(len).unwrap(), mode).unwrap()
    }

    fn raw(token: &str) -> Vec<u8> {
        TOKEN_ENGINE.decode(token).unwrap()
    }

    #[test]
    fn round_trip_both_key_sizes_and_modes() {
        for len in [16, 32] {
            for mode in [SealMode::Randomized, SealMode::Deterministic] {
                let c = codec(len, mode);
                let env = Envelope::new("data", "alice@example.edu");
                let token = c.seal(&env).unwrap();
                assert_eq!(c.open(&token).unwrap(), env, "len={len} mode={mode:?}");
            }
        }
    }

    #[test]
    fn round_trip_preserves_trailing_spaces() {
        let c = codec(16, SealMode::Deterministic);
        for value in ["", " ", "x   ", "   ", "\u{e9}t\u{e9} "] {
            let env = Envelope::new("k", value);
            assert_eq!(c.open(&c.seal(&env).unwrap()).unwrap(), env);
        }
    }

    #[test]
    fn round_trip_with_expiry() {
        let c = codec(32, SealMode::Randomized);
        let env = Envelope::new("resetPassword", r#"{"n":"bob"}"#).expiring_at(1_800_000_000);
        assert_eq!(c.open(&c.seal(&env).unwrap()).unwrap(), env);
    }

    #[test]
    fn deterministic_mode_repeats_tokens() {
        let c = codec(16, SealMode::Deterministic);
        let env = Envelope::new("setScore", r#"{"a":"emb123"}"#);
        assert_eq!(c.seal(&env).unwrap(), c.seal(&env).unwrap());

        let other = Envelope::new("setScore", r#"{"a":"emb124"}"#);
        assert_ne!(c.seal(&env).unwrap(), c.seal(&other).unwrap());
    }

    #[test]
    fn randomized_mode_varies_tokens() {
        let c = codec(16, SealMode::Randomized);
        let env = Envelope::new("setScore", r#"{"a":"emb123"}"#);
        let a = c.seal(&env).unwrap();
        let b = c.seal(&env).unwrap();
        assert_ne!(a, b);
        assert_eq!(c.open(&a).unwrap(), c.open(&b).unwrap());
    }

    #[test]
    fn either_mode_opens_the_other() {
        let key = KeyMaterial::generate(32).unwrap();
        let det = Codec::new(&key, SealMode::Deterministic).unwrap();
        let rnd = Codec::new(&key, SealMode::Randomized).unwrap();
        let env = Envelope::new("material", "carol");
        assert_eq!(rnd.open(&det.seal(&env).unwrap()).unwrap(), env);
        assert_eq!(det.open(&rnd.seal(&env).unwrap()).unwrap(), env);
    }

    #[test]
    fn tokens_are_url_safe() {
        let c = codec(32, SealMode::Randomized);
        for i in 0..64 {
            let token = c.seal(&Envelope::new("k", "v".repeat(i))).unwrap();
            assert!(
                token
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
                "{token}"
            );
        }
    }

    #[test]
    fn padded_tokens_still_open() {
        let c = codec(16, SealMode::Randomized);
        let env = Envelope::new("data", "a");
        let token = c.seal(&env).unwrap();
        let padded = base64::engine::general_purpose::URL_SAFE.encode(raw(&token));
        assert_eq!(c.open(&padded).unwrap(), env);
    }

    #[test]
    fn every_single_byte_flip_is_rejected() {
        let c = codec(16, SealMode::Deterministic);
        let env = Envelope::new("setScore", r#"{"a":"emb123"}"#);
        let bytes = raw(&c.seal(&env).unwrap());

        for i in 0..bytes.len() {
            for bit in [0x01u8, 0x80] {
                let mut tampered = bytes.clone();
                tampered[i] ^= bit;
                let result = c.open(&TOKEN_ENGINE.encode(&tampered));
                assert!(
                    matches!(result, Err(DispatchError::Parse(_))),
                    "byte {i} bit {bit:#x} gave {result:?}"
                );
            }
        }
    }

    #[test]
    fn truncated_and_extended_tokens_are_rejected() {
        let c = codec(16, SealMode::Randomized);
        let bytes = raw(&c.seal(&Envelope::new("k", "v")).unwrap());

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(
            c.open(&TOKEN_ENGINE.encode(&longer)),
            Err(DispatchError::Parse(_))
        ));

        let shorter = &bytes[..bytes.len() - 1];
        assert!(matches!(
            c.open(&TOKEN_ENGINE.encode(shorter)),
            Err(DispatchError::Parse(_))
        ));
    }

    #[test]
    fn malformed_text_is_a_decode_error() {
        let c = codec(16, SealMode::Randomized);
        assert!(matches!(c.open("not base64!"), Err(DispatchError::Decode(_))));
        assert!(matches!(c.open("a+b/"), Err(DispatchError::Decode(_))));
        assert!(matches!(c.open(""), Err(DispatchError::Decode(_))));
        assert!(matches!(c.open("AAAA"), Err(DispatchError::Decode(_))));
        // single trailing character cannot be valid base64
        assert!(matches!(c.open("AAAAA"), Err(DispatchError::Decode(_))));
    }

    #[test]
    fn wrong_key_is_a_parse_error() {
        let a = codec(16, SealMode::Randomized);
        let b = codec(16, SealMode::Randomized);
        let token = a.seal(&Envelope::new("data", "alice")).unwrap();
        assert!(matches!(b.open(&token), Err(DispatchError::Parse(_))));
    }

    #[test]
    fn authenticated_garbage_is_a_parse_error() {
        let key = KeyMaterial::generate(16).unwrap();
        let c = Codec::new(&key, SealMode::Randomized).unwrap();

        let nonce = [3u8; NONCE_LEN];
        let ciphertext = c.cipher.encrypt(&nonce, br#"{"key":"data"}"#).unwrap();
        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        assert!(matches!(
            c.open(&TOKEN_ENGINE.encode(sealed)),
            Err(DispatchError::Parse(_))
        ));
    }

    #[test]
    fn debug_shows_cipher_not_key() {
        let c = codec(32, SealMode::Deterministic);
        let debug = format!("{:?}", c);
        assert!(debug.contains("AES-256-GCM"));
        assert!(debug.contains("Deterministic"));
    }
}
