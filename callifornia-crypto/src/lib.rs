//! # Callifornia Crypto
//!
//! The cryptographic envelope described in §4.4: RSA keypair generation,
//! per-packet symmetric key wrap/unwrap, AEAD encryption of nicknames and
//! call keys, and the deterministic nickname hash used as the stable user
//! identity on the wire.

pub mod envelope;
pub mod error;
pub mod hash;
pub mod keys;

pub use error::CryptoError;
pub use hash::hash_nickname;
pub use keys::{parse_public_key_pem, AsymKeyPair, SymmetricKey};
