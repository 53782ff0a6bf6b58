//! The client's small object graph: the authorized [`Session`] and its
//! call entities (§3, §4.5). Mirrors the shape of
//! `callifornia-server`'s `entities.rs`, seen from the other side of the
//! wire: one party instead of a registry of them.

use std::time::Instant;

use callifornia_crypto::SymmetricKey;
use callifornia_protocol::{NicknameHash, Token, Uid};

/// State held only while `AUTHORIZATION`/`RECONNECT`/`GET_USER_INFO` is
/// in flight and awaiting its reliable-request reply.
pub struct PendingLookup {
    pub peer_nickname: String,
    pub peer_nickname_hash: NicknameHash,
    pub uid: Uid,
}

/// A ring we initiated, from `start_outgoing_call` up to either
/// `on_outgoing_call_accepted`/`_declined`/`_timeout`.
pub struct OutgoingCall {
    pub peer_nickname: String,
    pub peer_nickname_hash: NicknameHash,
    pub peer_public_key_pem: String,
    pub call_key: SymmetricKey,
    pub started_at: Instant,
}

/// A ring someone else initiated at us, from the inbound `CALLING_BEGIN`
/// up to `accept_call`/`decline_call`/expiry.
pub struct IncomingCall {
    pub peer_nickname: String,
    pub peer_nickname_hash: NicknameHash,
    pub peer_public_key_pem: String,
    pub call_key: SymmetricKey,
    pub started_at: Instant,
}

/// An established call (§4.4's `CallKey` now in steady use for media).
pub struct ActiveCall {
    pub peer_nickname: String,
    pub peer_nickname_hash: NicknameHash,
    pub call_key: SymmetricKey,
    pub partner_down: bool,
}

/// Everything that exists only once `authorize` has succeeded.
pub struct Session {
    pub nickname: String,
    pub nickname_hash: NicknameHash,
    pub token: Token,
    pub outgoing_lookup: Option<PendingLookup>,
    pub outgoing: Option<OutgoingCall>,
    pub incoming: Vec<IncomingCall>,
    pub active: Option<ActiveCall>,
}

impl Session {
    pub fn new(nickname: String, nickname_hash: NicknameHash, token: Token) -> Self {
        Self {
            nickname,
            nickname_hash,
            token,
            outgoing_lookup: None,
            outgoing: None,
            incoming: Vec::new(),
            active: None,
        }
    }

    /// Free to place or receive a call: no ring in progress, no active call.
    pub fn is_free(&self) -> bool {
        self.outgoing_lookup.is_none() && self.outgoing.is_none() && self.active.is_none()
    }

    pub fn incoming_from(&self, peer_nickname: &str) -> Option<&IncomingCall> {
        self.incoming.iter().find(|c| c.peer_nickname == peer_nickname)
    }

    pub fn take_incoming_from(&mut self, peer_nickname: &str) -> Option<IncomingCall> {
        let index = self.incoming.iter().position(|c| c.peer_nickname == peer_nickname)?;
        Some(self.incoming.remove(index))
    }
}

/// The four macro-states of §4.5, derived from [`Session`] rather than
/// tracked redundantly: an absent session is `Unauthorized`, and the
/// rest follow from what the session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthorized,
    Free,
    Calling,
    InCall,
}

pub fn phase_of(session: Option<&Session>) -> SessionPhase {
    match session {
        None => SessionPhase::Unauthorized,
        Some(s) if s.active.is_some() => SessionPhase::InCall,
        Some(s) if s.outgoing.is_some() || s.outgoing_lookup.is_some() => SessionPhase::Calling,
        Some(_) => SessionPhase::Free,
    }
}
