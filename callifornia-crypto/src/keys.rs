//! Key material (§3 "Crypto material").

use rand::RngCore;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::CryptoError;

const RSA_KEY_BITS: usize = 2048;
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// RSA-OAEP public/private pair, generated once per client process and
/// never persisted (§3).
#[derive(Clone)]
pub struct AsymKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl AsymKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Serializes the public key as PEM, the representation carried in the
    /// `public_key` wire field (§6.1).
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.public
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

/// Parses a peer's public key out of the PEM string carried on the wire.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// A fresh 256-bit symmetric key. Used both as the per-packet `PacketKey`
/// (wrapping the nickname) and the per-call `CallKey` (wrapping media).
#[derive(Clone)]
pub struct SymmetricKey(pub [u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        SymmetricKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }
}
