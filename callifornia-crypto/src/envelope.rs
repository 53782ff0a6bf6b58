//! The cryptographic envelope (§4.4): a fresh symmetric `PacketKey` wraps an
//! AEAD-encrypted nickname (and, for call invitations, a separately
//! RSA-wrapped `CallKey`). Hashes of nicknames need no key and live in
//! [`crate::hash`].

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::keys::{SymmetricKey, SYMMETRIC_KEY_LEN};

const NONCE_LEN: usize = 12;

/// RSA-OAEP(SHA-256)-wraps a symmetric key under `recipient_public_key`,
/// hex-encoded for a JSON field.
pub fn wrap_key(recipient_public_key: &RsaPublicKey, key: &SymmetricKey) -> Result<String, CryptoError> {
    let mut rng = rand::thread_rng();
    let ciphertext = recipient_public_key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|_| CryptoError::KeyWrap)?;
    Ok(hex::encode(ciphertext))
}

/// Unwraps a symmetric key previously wrapped with [`wrap_key`].
pub fn unwrap_key(private_key: &RsaPrivateKey, wrapped_hex: &str) -> Result<SymmetricKey, CryptoError> {
    let ciphertext = hex::decode(wrapped_hex).map_err(|_| CryptoError::KeyWrap)?;
    let plaintext = private_key
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .map_err(|_| CryptoError::KeyWrap)?;
    let bytes: [u8; SYMMETRIC_KEY_LEN] = plaintext.try_into().map_err(|_| CryptoError::KeyWrap)?;
    Ok(SymmetricKey(bytes))
}

/// AES-256-GCM encrypts `plaintext` under `key`, returning raw
/// `nonce || ciphertext || tag` bytes.
pub fn encrypt_bytes(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Encryption)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a payload produced by [`encrypt_bytes`].
pub fn decrypt_bytes(key: &SymmetricKey, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if payload.len() < NONCE_LEN {
        return Err(CryptoError::Decryption);
    }
    let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Decryption)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

/// AES-256-GCM encrypts `plaintext` under `key`, returning
/// `hex(nonce || ciphertext || tag)` for use in a JSON field.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    Ok(hex::encode(encrypt_bytes(key, plaintext)?))
}

/// Decrypts a payload produced by [`encrypt`].
pub fn decrypt(key: &SymmetricKey, hex_payload: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(hex_payload).map_err(|_| CryptoError::Decryption)?;
    decrypt_bytes(key, &bytes)
}

/// The `(packet_key, encrypted_nickname)` pair carried by every envelope
/// that names a plaintext nickname (§4.4 steps 1–2).
pub struct NicknameEnvelope {
    pub packet_key_wrapped: String,
    pub encrypted_nickname: String,
}

/// Builds the nickname half of an envelope: a fresh `PacketKey`, the
/// AEAD-encrypted nickname under it, and the key wrapped for `recipient`.
pub fn seal_nickname(recipient_public_key: &RsaPublicKey, nickname: &str) -> Result<NicknameEnvelope, CryptoError> {
    let packet_key = SymmetricKey::generate();
    let encrypted_nickname = encrypt(&packet_key, nickname.as_bytes())?;
    let packet_key_wrapped = wrap_key(recipient_public_key, &packet_key)?;
    Ok(NicknameEnvelope {
        packet_key_wrapped,
        encrypted_nickname,
    })
}

/// Reverses [`seal_nickname`]: unwraps the packet key with `private_key`
/// and decrypts the nickname under it.
pub fn open_nickname(
    private_key: &RsaPrivateKey,
    packet_key_wrapped: &str,
    encrypted_nickname: &str,
) -> Result<String, CryptoError> {
    let packet_key = unwrap_key(private_key, packet_key_wrapped)?;
    let plaintext = decrypt(&packet_key, encrypted_nickname)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_round_trips() {
        let keys = crate::keys::AsymKeyPair::generate().unwrap();
        let sealed = seal_nickname(keys.public_key(), "alice").unwrap();
        let opened = open_nickname(
            keys.private_key(),
            &sealed.packet_key_wrapped,
            &sealed.encrypted_nickname,
        )
        .unwrap();
        assert_eq!(opened, "alice");
    }

    #[test]
    fn call_key_round_trips_independently_of_packet_key() {
        let keys = crate::keys::AsymKeyPair::generate().unwrap();
        let call_key = SymmetricKey::generate();
        let wrapped = wrap_key(keys.public_key(), &call_key).unwrap();
        let unwrapped = unwrap_key(keys.private_key(), &wrapped).unwrap();
        assert_eq!(call_key.0, unwrapped.0);
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = SymmetricKey::generate();
        let mut sealed = hex::decode(encrypt(&key, b"hello").unwrap()).unwrap();
        *sealed.last_mut().unwrap() ^= 0xFF;
        let err = decrypt(&key, &hex::encode(sealed));
        assert!(err.is_err());
    }
}
