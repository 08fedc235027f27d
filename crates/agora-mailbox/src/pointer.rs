//! Pointer wire payload.
//!
//! What the lookup service stores under a rendezvous key is a CBOR map:
//!
//! | field             | CBOR type | content                          |
//! |-------------------|-----------|----------------------------------|
//! | `pointer_id`      | text      | hex, 32 bytes                    |
//! | `rendezvous_key`  | text      | hex, 32 bytes                    |
//! | `payload_location`| text      | content address                  |
//! | `purpose`         | uint      | purpose code                     |
//! | `timestamp`       | int       | publication time, ms since epoch |
//!
//! Fields are written in declaration order.

use agora_storage::PointerRecord;
use agora_types::{AgoraError, PayloadLocation, PointerId, PointerPurpose, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Upper bound on an encoded pointer; larger payloads are rejected
/// without decoding.
pub const MAX_POINTER_BYTES: usize = 2048;

#[derive(Serialize, Deserialize)]
struct WirePointer {
    pointer_id: String,
    rendezvous_key: String,
    payload_location: String,
    purpose: u8,
    timestamp: i64,
}

pub fn encode_pointer(record: &PointerRecord) -> Result<Vec<u8>> {
    let wire = WirePointer {
        pointer_id: record.pointer_id.to_string(),
        rendezvous_key: record.rendezvous_key.to_string(),
        payload_location: record.payload_location.as_str().to_string(),
        purpose: record.purpose.as_u8(),
        timestamp: record.timestamp.as_millis(),
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&wire, &mut buf).map_err(|e| AgoraError::Validation {
        reason: format!("pointer CBOR encoding failed: {e}"),
    })?;
    Ok(buf)
}

/// Parses a pointer read back from the lookup service.
///
/// The result is marked `published`, since it was found there.
///
/// # Errors
///
/// [`AgoraError::Validation`] for oversized or malformed payloads and for
/// fields that fail their own validation.
pub fn decode_pointer(bytes: &[u8]) -> Result<PointerRecord> {
    if bytes.len() > MAX_POINTER_BYTES {
        return Err(AgoraError::Validation {
            reason: format!("pointer payload of {} bytes exceeds {MAX_POINTER_BYTES}", bytes.len()),
        });
    }
    let wire: WirePointer = ciborium::de::from_reader(bytes).map_err(|e| AgoraError::Validation {
        reason: format!("malformed pointer payload: {e}"),
    })?;
    let pointer_id: PointerId = wire.pointer_id.parse()?;
    Ok(PointerRecord {
        pointer_id,
        origin_id: pointer_id,
        rendezvous_key: wire.rendezvous_key.parse()?,
        payload_location: PayloadLocation::new(wire.payload_location)?,
        purpose: PointerPurpose::from_u8(wire.purpose)?,
        timestamp: Timestamp::from_millis(wire.timestamp),
        published: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{PointerId, RendezvousKey};

    fn record() -> Result<PointerRecord> {
        Ok(PointerRecord {
            pointer_id: PointerId::new([3; 32]),
            origin_id: PointerId::new([3; 32]),
            rendezvous_key: RendezvousKey::new([4; 32]),
            payload_location: PayloadLocation::new("zb2rhZfjRh2FHHB2RkHVEvL2vJnCTcu7kwRqgVsf9gpkLgteo")?,
            purpose: PointerPurpose::Moderator,
            timestamp: Timestamp::from_millis(1_700_000_123_456),
            published: true,
        })
    }

    #[test]
    fn decodes_what_it_encodes() -> Result<()> {
        let original = record()?;
        assert_eq!(decode_pointer(&encode_pointer(&original)?)?, original);
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            decode_pointer(b"\xff\x00not cbor"),
            Err(AgoraError::Validation { .. })
        ));
    }

    #[test]
    fn unknown_purpose_code_is_rejected() -> Result<()> {
        let wire = WirePointer {
            pointer_id: PointerId::new([1; 32]).to_string(),
            rendezvous_key: RendezvousKey::new([2; 32]).to_string(),
            payload_location: "loc".into(),
            purpose: 9,
            timestamp: 0,
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&wire, &mut buf).map_err(|e| AgoraError::Validation { reason: e.to_string() })?;
        assert!(decode_pointer(&buf).is_err());
        Ok(())
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(decode_pointer(&vec![0u8; MAX_POINTER_BYTES + 1]).is_err());
    }
}
