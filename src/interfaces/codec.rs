//! Binary encoding of payment requests carried on the work queue.
//!
//! # Wire Format
//!
//! Fixed-width bincode, big-endian, 37 bytes:
//!
//! ```text
//! [tag "PAYR": 4][version: 1][client_id: u64][payment_id: u64][payment_sum: 16]
//! ```
//!
//! `payment_sum` is the 16-byte `rust_decimal` representation, so the decimal
//! scale survives the round trip (`10.50` stays `10.50`).

use crate::domain::payment::PaymentRequest;
use crate::error::DecodeError;
use bincode::Options;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Structural tag leading every encoded payment.
pub const PAYLOAD_TAG: [u8; 4] = *b"PAYR";
/// Current wire version.
pub const PAYLOAD_VERSION: u8 = 1;
/// Size of an encoded payment in bytes.
pub const PAYLOAD_LEN: usize = 4 + 1 + 8 + 8 + 16;

const HEADER_LEN: usize = 5;
const MAX_DECIMAL_SCALE: u8 = 28;

#[derive(Deserialize)]
struct WirePayment {
    tag: [u8; 4],
    version: u8,
    client_id: u64,
    payment_id: u64,
    payment_sum: [u8; 16],
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .reject_trailing_bytes()
}

/// Encodes a request for the queue.
///
/// Writes the same fixed-width big-endian layout `decode` reads back through
/// bincode.
pub fn encode(request: &PaymentRequest) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(PAYLOAD_LEN);
    bytes.extend_from_slice(&PAYLOAD_TAG);
    bytes.push(PAYLOAD_VERSION);
    bytes.extend_from_slice(&request.client_id().to_be_bytes());
    bytes.extend_from_slice(&request.payment_id().to_be_bytes());
    bytes.extend_from_slice(&request.payment_sum().value().serialize());
    bytes
}

/// Decodes a queue payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<PaymentRequest, DecodeError> {
    if payload.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            expected: PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    let mut found = [0u8; 4];
    found.copy_from_slice(&payload[..4]);
    if found != PAYLOAD_TAG {
        return Err(DecodeError::TagMismatch { found });
    }
    if payload[4] != PAYLOAD_VERSION {
        return Err(DecodeError::UnsupportedVersion(payload[4]));
    }
    if payload.len() < PAYLOAD_LEN {
        return Err(DecodeError::Truncated {
            expected: PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    let wire: WirePayment = wire_options()
        .deserialize(payload)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let payment_sum = decimal_from_bytes(wire.payment_sum)?;
    PaymentRequest::new(wire.client_id, wire.payment_id, payment_sum)
        .map_err(|e| DecodeError::Invalid(e.to_string()))
}

fn decimal_from_bytes(bytes: [u8; 16]) -> Result<Decimal, DecodeError> {
    // Flags word: scale in byte 2, sign in the top bit of byte 3, rest zero.
    let scale = bytes[2];
    if bytes[0] != 0 || bytes[1] != 0 || bytes[3] & 0x7f != 0 || scale > MAX_DECIMAL_SCALE {
        return Err(DecodeError::Malformed(
            "payment sum is not a valid decimal".to_string(),
        ));
    }
    Ok(Decimal::deserialize(bytes))
}
