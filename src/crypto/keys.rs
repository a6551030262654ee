//! Reviewer key material
//!
//! Fixed-size byte types shared by every ring-signature backend, plus the
//! seed-based key derivation used when a reviewer is enrolled.
//!
//! ## Derivation
//!
//! ```text
//! Seed (32 random bytes)
//!         │
//!         ▼
//! HKDF-SHA256(salt="ringtally-keygen-v1", seed)
//!         │
//!         └─► HKDF expand("reviewer-signing-key") → 64 bytes (reduced by the backend)
//! ```
//!
//! Secret material (`Seed`, `SecretKey`, the wide expansion) is zeroized on drop.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of public keys, secret keys, seeds and key images.
pub const KEY_BYTES: usize = 32;

/// Domain separation salt for key derivation (versioned for rotation)
const KEYGEN_SALT: &[u8] = b"ringtally-keygen-v1";

/// HKDF info string for the signing key
const SIGNING_KEY_INFO: &[u8] = b"reviewer-signing-key";

/// Errors from parsing or deriving key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),
}

fn array_from_slice(bytes: &[u8]) -> Result<[u8; KEY_BYTES], KeyError> {
    bytes.try_into().map_err(|_| KeyError::InvalidLength {
        expected: KEY_BYTES,
        actual: bytes.len(),
    })
}

fn array_from_hex(s: &str) -> Result<[u8; KEY_BYTES], KeyError> {
    let bytes = hex::decode(s.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
    array_from_slice(&bytes)
}

/// A reviewer's published public key (32 bytes, hex on the wire).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; KEY_BYTES]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        array_from_slice(bytes).map(Self)
    }

    /// Parse the 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        array_from_hex(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}…)", &self.to_hex()[..16])
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

/// Linking tag carried by every signature.
///
/// Deterministic per secret key and independent of ring and message, so two
/// signatures by the same key on one submission share it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyImage([u8; KEY_BYTES]);

impl KeyImage {
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        array_from_slice(bytes).map(Self)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        array_from_hex(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for debug logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({}…)", self.short())
    }
}

impl From<KeyImage> for String {
    fn from(image: KeyImage) -> Self {
        image.to_hex()
    }
}

impl TryFrom<String> for KeyImage {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

/// A reviewer's secret signing key (zeroized on drop).
///
/// The byte layout is backend-defined; for the LSAG backend it is a
/// canonical little-endian scalar.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_BYTES]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        array_from_hex(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Enrollment seed from which a reviewer keypair is derived.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; KEY_BYTES]);

impl Seed {
    /// Draw a fresh seed from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        array_from_hex(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }

    /// Expand the seed into 64 uniformly distributed bytes.
    ///
    /// Backends reduce this wide output into their scalar field, which keeps
    /// the bias negligible for 252-bit groups.
    pub fn expand_wide(&self) -> Result<Zeroizing<[u8; 64]>, KeyError> {
        let hkdf = Hkdf::<Sha256>::new(Some(KEYGEN_SALT), &self.0);
        let mut wide = Zeroizing::new([0u8; 64]);
        hkdf.expand(SIGNING_KEY_INFO, &mut wide[..])
            .map_err(|e| KeyError::DerivationFailed(format!("{:?}", e)))?;
        Ok(wide)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}
