//! Rendezvous key derivation.
//!
//! `key = SHA3-256(recipient || purpose_code || purpose_salt)`
//!
//! Any party that knows the recipient's [`NodeId`] can compute where
//! pointers for it are published, and the recipient computes the same
//! key from its own id when scanning.

use agora_crypto::hash::sha3_256_parts;
use agora_types::{NodeId, PointerPurpose, RendezvousKey};

const MESSAGE_SALT: &[u8] = b"agora.rendezvous.message.v1";
const MODERATOR_SALT: &[u8] = b"agora.rendezvous.moderator.v1";
const PUBLIC_KEY_SALT: &[u8] = b"agora.rendezvous.public_key.v1";

/// Fixed salt mixed into every rendezvous key of `purpose`.
pub fn purpose_salt(purpose: PointerPurpose) -> &'static [u8] {
    match purpose {
        PointerPurpose::Message => MESSAGE_SALT,
        PointerPurpose::Moderator => MODERATOR_SALT,
        PointerPurpose::PublicKey => PUBLIC_KEY_SALT,
    }
}

pub fn rendezvous_key(recipient: &NodeId, purpose: PointerPurpose) -> RendezvousKey {
    RendezvousKey::new(sha3_256_parts(&[
        recipient.as_bytes(),
        &[purpose.as_u8()],
        purpose_salt(purpose),
    ]))
}
