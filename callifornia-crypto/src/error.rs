use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("RSA key generation failed: {0}")]
    KeyGeneration(String),
    #[error("RSA wrap/unwrap of the packet key failed")]
    KeyWrap,
    #[error("AEAD encryption failed")]
    Encryption,
    #[error("AEAD decryption failed (wrong key or tampered ciphertext)")]
    Decryption,
    #[error("public key is not valid PEM/DER: {0}")]
    InvalidPublicKey(String),
    #[error("decrypted plaintext was not valid UTF-8")]
    InvalidUtf8,
}
