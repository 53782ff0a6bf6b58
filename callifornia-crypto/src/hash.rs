//! Deterministic, unkeyed nickname hashing (§3, §4.4 "Hashes of nicknames").

use callifornia_protocol::NicknameHash;

/// Computes the stable wire identity for a plaintext nickname.
pub fn hash_nickname(nickname: &str) -> NicknameHash {
    let digest = blake3::hash(nickname.as_bytes());
    NicknameHash(digest.to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic() {
        assert_eq!(hash_nickname("alice"), hash_nickname("alice"));
    }

    #[test]
    fn differs_by_nickname() {
        assert_ne!(hash_nickname("alice"), hash_nickname("bob"));
    }
}
