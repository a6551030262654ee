/// Cryptographic building blocks for anonymous reviewer votes
///
/// This module provides:
/// - Reviewer key material and seed-based key derivation (keys)
/// - The injected ring-signature capability and its engine wrapper (engine)
/// - An LSAG backend over Ristretto255 (lsag)
pub mod engine;
pub mod keys;
pub mod lsag;

pub use engine::{
    distinct_members, RingPrimitive, RingSignatureEngine, Signature, SigningError, MIN_RING_SIZE,
};
pub use keys::{KeyError, KeyImage, PublicKey, SecretKey, Seed, KEY_BYTES};
pub use lsag::Lsag;
