//! Cryptographic primitives for the Agora node.
//!
//! Every hash, key derivation and cipher call in the workspace goes
//! through this crate.
//!
//! # Modules
//!
//! - [`hash`]: SHA3-256 and double SHA-256 digests
//! - [`kdf`]: Argon2id passphrase stretching for the encrypted store
//! - [`hkdf`]: splitting a store master key into cipher and MAC keys
//! - [`aead`]: XChaCha20-Poly1305 record sealing
//! - [`mac`]: HMAC-SHA256 tags for Encrypt-then-MAC
//! - [`signing`]: Ed25519 keypairs and spend-script derivation
//! - [`mnemonic`]: BIP39 wallet seed phrases
//! - [`hd_derive`]: SLIP-0010 wallet key derivation per purpose

pub mod aead;
pub mod hash;
pub mod hd_derive;
pub mod hkdf;
pub mod kdf;
pub mod mac;
pub mod mnemonic;
pub mod signing;
