//! LSAG ring signatures over Ristretto255.
//!
//! Linkable Spontaneous Anonymous Group signatures (Liu–Wei–Wong) with the
//! Monero-style key image. Used as the default `RingPrimitive` backend.
//!
//! ## Construction
//!
//! ```text
//! x          secret scalar          P = x·G
//! Hp(P)      hash-to-group (SHA-512, domain separated)
//! I = x·Hp(P)                       key image (ring/message independent)
//!
//! c_{i+1} = H(transcript ‖ s_i·G + c_i·P_i ‖ s_i·Hp(P_i) + c_i·I)
//! transcript = domain ‖ len(m) ‖ m ‖ len(ring) ‖ P_0 ‖ … ‖ P_{n-1} ‖ I
//! ```
//!
//! Signature material is `c_0 ‖ s_0 ‖ … ‖ s_{n-1}`, 32 bytes each.

use super::engine::{RingPrimitive, Signature, SigningError};
use super::keys::{KeyError, KeyImage, PublicKey, SecretKey, Seed, KEY_BYTES};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

const HASH_TO_POINT_DOMAIN: &[u8] = b"ringtally-lsag-hp-v1";
const CHALLENGE_DOMAIN: &[u8] = b"ringtally-lsag-challenge-v1";

/// LSAG backend (stateless).
#[derive(Debug, Clone, Copy, Default)]
pub struct Lsag;

impl Lsag {
    /// Derive a keypair from an enrollment seed.
    pub fn derive_keypair(seed: &Seed) -> Result<(SecretKey, PublicKey), KeyError> {
        let wide = seed.expand_wide()?;
        let mut x = Scalar::from_bytes_mod_order_wide(&wide);
        let public = PublicKey::from_bytes(RistrettoPoint::mul_base(&x).compress().to_bytes());
        let secret = SecretKey::from_bytes(x.to_bytes());
        x.zeroize();
        Ok((secret, public))
    }

    /// Generate a fresh keypair, returning the seed it came from.
    pub fn generate_keypair() -> Result<(Seed, SecretKey, PublicKey), KeyError> {
        let seed = Seed::generate();
        let (secret, public) = Self::derive_keypair(&seed)?;
        Ok((seed, secret, public))
    }

    /// Key image for `secret`, without producing a signature.
    pub fn key_image(&self, secret: &SecretKey) -> Result<KeyImage, SigningError> {
        let mut x = secret_scalar(secret)?;
        let public = PublicKey::from_bytes(RistrettoPoint::mul_base(&x).compress().to_bytes());
        let image = x * hash_to_point(&public);
        x.zeroize();
        Ok(KeyImage::from_bytes(image.compress().to_bytes()))
    }
}

fn secret_scalar(secret: &SecretKey) -> Result<Scalar, SigningError> {
    let scalar: Option<Scalar> = Scalar::from_canonical_bytes(*secret.as_bytes()).into();
    match scalar {
        Some(x) if x != Scalar::ZERO => Ok(x),
        _ => Err(SigningError::InvalidSecretKey),
    }
}

fn hash_to_point(key: &PublicKey) -> RistrettoPoint {
    let mut input = Vec::with_capacity(HASH_TO_POINT_DOMAIN.len() + KEY_BYTES);
    input.extend_from_slice(HASH_TO_POINT_DOMAIN);
    input.extend_from_slice(key.as_bytes());
    RistrettoPoint::hash_from_bytes::<Sha512>(&input)
}

fn decompress(bytes: &[u8; KEY_BYTES]) -> Option<RistrettoPoint> {
    CompressedRistretto(*bytes).decompress()
}

fn scalar_at(material: &[u8], slot: usize) -> Option<Scalar> {
    let start = slot * KEY_BYTES;
    let bytes: [u8; KEY_BYTES] = material.get(start..start + KEY_BYTES)?.try_into().ok()?;
    Scalar::from_canonical_bytes(bytes).into()
}

/// Hash state shared by every link of the challenge chain.
fn transcript(message: &[u8], ring: &[PublicKey], image: &KeyImage) -> Sha512 {
    let mut hasher = Sha512::new();
    hasher.update(CHALLENGE_DOMAIN);
    hasher.update((message.len() as u64).to_le_bytes());
    hasher.update(message);
    hasher.update((ring.len() as u64).to_le_bytes());
    for member in ring {
        hasher.update(member.as_bytes());
    }
    hasher.update(image.as_bytes());
    hasher
}

fn challenge(transcript: &Sha512, l: &RistrettoPoint, r: &RistrettoPoint) -> Scalar {
    let mut hasher = transcript.clone();
    hasher.update(l.compress().as_bytes());
    hasher.update(r.compress().as_bytes());
    Scalar::from_hash(hasher)
}

impl RingPrimitive for Lsag {
    fn public_key(&self, secret: &SecretKey) -> Result<PublicKey, SigningError> {
        let mut x = secret_scalar(secret)?;
        let public = RistrettoPoint::mul_base(&x).compress().to_bytes();
        x.zeroize();
        Ok(PublicKey::from_bytes(public))
    }

    fn sign(
        &self,
        message: &[u8],
        ring: &[PublicKey],
        secret: &SecretKey,
        signer_index: usize,
    ) -> Result<Signature, SigningError> {
        let n = ring.len();
        if signer_index >= n {
            return Err(SigningError::InvalidSecretKey);
        }

        let points = ring
            .iter()
            .enumerate()
            .map(|(index, key)| {
                decompress(key.as_bytes()).ok_or(SigningError::MalformedRingMember { index })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut x = secret_scalar(secret)?;
        if RistrettoPoint::mul_base(&x) != points[signer_index] {
            x.zeroize();
            return Err(SigningError::InvalidSecretKey);
        }

        let hp_signer = hash_to_point(&ring[signer_index]);
        let image_point = x * hp_signer;
        let image = KeyImage::from_bytes(image_point.compress().to_bytes());
        let base = transcript(message, ring, &image);

        let mut challenges = vec![Scalar::ZERO; n];
        let mut responses = vec![Scalar::ZERO; n];

        let mut alpha = Scalar::random(&mut OsRng);
        let next = (signer_index + 1) % n;
        challenges[next] = challenge(
            &base,
            &RistrettoPoint::mul_base(&alpha),
            &(alpha * hp_signer),
        );

        let mut i = next;
        while i != signer_index {
            responses[i] = Scalar::random(&mut OsRng);
            let l = RistrettoPoint::mul_base(&responses[i]) + challenges[i] * points[i];
            let r = responses[i] * hash_to_point(&ring[i]) + challenges[i] * image_point;
            challenges[(i + 1) % n] = challenge(&base, &l, &r);
            i = (i + 1) % n;
        }

        responses[signer_index] = alpha - challenges[signer_index] * x;
        alpha.zeroize();
        x.zeroize();

        let mut material = Vec::with_capacity((n + 1) * KEY_BYTES);
        material.extend_from_slice(challenges[0].as_bytes());
        for s in &responses {
            material.extend_from_slice(s.as_bytes());
        }

        Ok(Signature::new(image, material))
    }

    fn verify(&self, message: &[u8], ring: &[PublicKey], signature: &Signature) -> bool {
        let n = ring.len();
        let material = signature.material();
        if n == 0 || material.len() != (n + 1) * KEY_BYTES {
            return false;
        }

        let Some(c0) = scalar_at(material, 0) else {
            return false;
        };
        let Some(image_point) = decompress(signature.key_image().as_bytes()) else {
            return false;
        };

        let base = transcript(message, ring, &signature.key_image());
        let mut c = c0;
        for (i, member) in ring.iter().enumerate() {
            let Some(point) = decompress(member.as_bytes()) else {
                return false;
            };
            let Some(s) = scalar_at(material, i + 1) else {
                return false;
            };
            let l = RistrettoPoint::mul_base(&s) + c * point;
            let r = s * hash_to_point(member) + c * image_point;
            c = challenge(&base, &l, &r);
        }

        c == c0
    }
}
