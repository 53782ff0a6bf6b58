//! JSON body schemas for each signaling packet type (§6.1, §4.7).
//!
//! Field names match the original implementation's wire format
//! (`sender_nickname_hash`, `receiver_nickname_hash`, ...) so a packet
//! capture from either side is self-describing.

use serde::{Deserialize, Serialize};

use crate::ids::{NicknameHash, Token, Uid};
use crate::kinds::ErrorKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub uid: Uid,
    pub sender_nickname_hash: NicknameHash,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub uid: Uid,
    pub result: bool,
    pub nickname_hash: NicknameHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_nickname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logout {
    pub uid: Uid,
    pub sender_nickname_hash: NicknameHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconnect {
    pub uid: Uid,
    pub sender_nickname_hash: NicknameHash,
    pub token: Token,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectResult {
    pub uid: Uid,
    pub result: bool,
    pub nickname_hash: NicknameHash,
    pub token: Token,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active_call: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_partner_nickname_hash: Option<NicknameHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserInfo {
    pub uid: Uid,
    pub sender_nickname_hash: NicknameHash,
    pub nickname_hash: NicknameHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserInfoResult {
    pub uid: Uid,
    pub result: bool,
    pub nickname_hash: NicknameHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Shared body for `CALLING_BEGIN` and `CALL_ACCEPT`: a call-key envelope
/// plus both parties' identity, per §6.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub sender_nickname_hash: NicknameHash,
    pub receiver_nickname_hash: NicknameHash,
    pub sender_public_key: String,
    pub encrypted_call_key: String,
    pub sender_encrypted_nickname: String,
    pub packet_key: String,
}

/// Shared body for messages that only name the two parties:
/// `CALLING_END`, `CALL_END`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoParties {
    pub sender_nickname_hash: NicknameHash,
    pub receiver_nickname_hash: NicknameHash,
}

/// `CALL_DECLINE` body. Ordinarily identical to [`TwoParties`]; carries an
/// optional `kind` when the server itself generated the decline rather
/// than forwarding a client's own (the accept-while-ringing-others
/// cascade in §4.6/§9, which declines every other incoming ring with
/// `DeclinedBusy` so the declined peer's UI can tell it apart from a
/// plain decline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDecline {
    pub sender_nickname_hash: NicknameHash,
    pub receiver_nickname_hash: NicknameHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// Shared body for `CONNECTION_DOWN_WITH_USER`, `CONNECTION_RESTORED_WITH_USER`,
/// and `USER_LOGOUT`: the server names which user the event concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    pub uid: Uid,
    pub nickname_hash: NicknameHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub uid: Uid,
    pub receiver_nickname_hash: NicknameHash,
}
