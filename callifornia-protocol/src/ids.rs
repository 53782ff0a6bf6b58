//! Stable wire identifiers (§3 of the spec).
//!
//! Each identifier is a thin newtype so the compiler stops a `Token` from
//! being passed where a `Uid` is expected, even though both are hex strings
//! under the hood.

use rand::RngCore;
use std::fmt;

macro_rules! hex_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

hex_id!(
    NicknameHash,
    "Deterministic BLAKE3 hash of a plaintext nickname; the stable user identity on the wire."
);
hex_id!(
    Token,
    "Server-issued opaque random string proving prior authorization across a reconnect."
);
hex_id!(
    Uid,
    "Per-request unique string matching reliable responses to their requests."
);

impl Uid {
    /// Generates a fresh UID with 128 bits of entropy, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Uid(hex::encode(bytes))
    }
}

impl Token {
    /// Generates a fresh 256-bit token, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Token(hex::encode(bytes))
    }
}

/// 64-bit monotonic counter per sender, used by the datagram transport to
/// group fragments of one logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(pub u64);

impl PacketId {
    pub fn wrapping_add(self, val: u64) -> Self {
        PacketId(self.0.wrapping_add(val))
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates a randomly seeded starting `PacketId` for a fresh transport
/// instance, so packet ids from a restarted process don't collide with a
/// stale reassembly record the peer might still be holding.
pub fn random_initial_packet_id() -> PacketId {
    PacketId(rand::thread_rng().next_u64())
}
