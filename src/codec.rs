//! Canonical vote message codec.
//!
//! Produces the bytes a reviewer signs. Encoding is a CBOR array via
//! `ciborium`:
//!
//! ```text
//! [ "ringtally/vote", 1, submission_id, genre, vote_type, round_nonce, h'extra_nonce' ]
//! ```
//!
//! - Fixed field order, no maps, so no key ordering questions
//! - Every text and byte string is length-prefixed by CBOR itself, so no
//!   separator can be forged from inside a field
//! - Text fields are UTF-8 text strings, integers use CBOR's shortest form
//!
//! The message is signed, never parsed back, so there is no decoder.

use crate::types::{SubmissionId, VoteType};
use ciborium::value::{Integer, Value};
use thiserror::Error;

/// Domain tag; keeps vote signatures from being replayed as any other message.
pub const DOMAIN_TAG: &str = "ringtally/vote";

/// Layout version. Bump on any change to the field list.
pub const CODEC_VERSION: u64 = 1;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// CBOR encoding failed.
    #[error("CBOR encoding failed: {0}")]
    Encode(String),
}

/// Encode the semantic fields of a vote into signable bytes.
pub fn encode(
    submission_id: SubmissionId,
    genre: &str,
    vote_type: VoteType,
    round_nonce: u64,
    extra_nonce: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let value = Value::Array(vec![
        Value::Text(DOMAIN_TAG.to_string()),
        Value::Integer(Integer::from(CODEC_VERSION)),
        Value::Integer(Integer::from(submission_id.0)),
        Value::Text(genre.to_string()),
        Value::Text(vote_type.code().to_string()),
        Value::Integer(Integer::from(round_nonce)),
        Value::Bytes(extra_nonce.to_vec()),
    ]);

    let mut bytes = Vec::new();
    ciborium::into_writer(&value, &mut bytes)
        .map_err(|e| CodecError::Encode(format!("{:?}", e)))?;
    Ok(bytes)
}
