//! Ring signature engine.
//!
//! The cryptographic primitive is an injected capability (`RingPrimitive`).
//! The engine owns the ring preconditions that every backend must honour so
//! the vote path never depends on one backend's internal representation.
//!
//! Ring order is significant: the ring used to verify must be exactly the
//! ring that was signed, element order included.

use super::keys::{KeyImage, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Smallest ring that still hides the signer.
pub const MIN_RING_SIZE: usize = 2;

/// Signing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("ring has {distinct} distinct member(s), need at least 2")]
    RingTooSmall { distinct: usize },

    #[error("secret key does not match the ring member at the signer index")]
    InvalidSecretKey,

    #[error("ring member {index} is not a valid public key")]
    MalformedRingMember { index: usize },
}

/// A linkable ring signature.
///
/// `material` holds the backend's challenge/response data and is opaque to
/// everything outside the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    key_image: KeyImage,
    #[serde(with = "hex_bytes")]
    material: Vec<u8>,
}

impl Signature {
    pub fn new(key_image: KeyImage, material: Vec<u8>) -> Self {
        Self {
            key_image,
            material,
        }
    }

    pub fn key_image(&self) -> KeyImage {
        self.key_image
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Linkable ring-signature primitive.
///
/// Implementations must guarantee:
/// - `verify` never panics and returns `false` for any mismatch
/// - `verify` depends on every message byte and on ring order
/// - the key image is a function of the secret key alone
pub trait RingPrimitive: Send + Sync + 'static {
    /// Public key corresponding to `secret`.
    fn public_key(&self, secret: &SecretKey) -> Result<PublicKey, SigningError>;

    /// Produce a signature. Callers go through `RingSignatureEngine::sign`,
    /// which has already checked ring size and signer position.
    fn sign(
        &self,
        message: &[u8],
        ring: &[PublicKey],
        secret: &SecretKey,
        signer_index: usize,
    ) -> Result<Signature, SigningError>;

    fn verify(&self, message: &[u8], ring: &[PublicKey], signature: &Signature) -> bool;
}

/// Number of distinct keys in a ring.
pub fn distinct_members(ring: &[PublicKey]) -> usize {
    ring.iter().collect::<HashSet<_>>().len()
}

/// Stable sign/verify/key-image interface over an injected primitive.
#[derive(Debug, Clone, Default)]
pub struct RingSignatureEngine<P> {
    primitive: P,
}

impl<P: RingPrimitive> RingSignatureEngine<P> {
    pub fn new(primitive: P) -> Self {
        Self { primitive }
    }

    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    /// Sign `message` as `ring[signer_index]`.
    ///
    /// # Errors
    ///
    /// - `RingTooSmall` if the ring has fewer than two distinct members
    /// - `InvalidSecretKey` if `signer_index` is out of range or `ring[signer_index]`
    ///   is not the public key of `secret`
    pub fn sign(
        &self,
        message: &[u8],
        ring: &[PublicKey],
        secret: &SecretKey,
        signer_index: usize,
    ) -> Result<Signature, SigningError> {
        let distinct = distinct_members(ring);
        if distinct < MIN_RING_SIZE {
            return Err(SigningError::RingTooSmall { distinct });
        }

        let claimed = ring
            .get(signer_index)
            .ok_or(SigningError::InvalidSecretKey)?;
        if self.primitive.public_key(secret)? != *claimed {
            return Err(SigningError::InvalidSecretKey);
        }

        self.primitive.sign(message, ring, secret, signer_index)
    }

    /// Pure predicate: does `signature` bind `message` to `ring`?
    pub fn verify(&self, message: &[u8], ring: &[PublicKey], signature: &Signature) -> bool {
        self.primitive.verify(message, ring, signature)
    }

    pub fn key_image_of(&self, signature: &Signature) -> KeyImage {
        signature.key_image()
    }

    pub fn public_key_of(&self, secret: &SecretKey) -> Result<PublicKey, SigningError> {
        self.primitive.public_key(secret)
    }
}
