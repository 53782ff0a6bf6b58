//! The server's small object graph: `User`, `Call`, `PendingCall` (§4.6, §9).

use std::net::SocketAddr;
use std::time::Instant;

use callifornia_protocol::{NicknameHash, Token};

use crate::ids::{CallId, PendingCallId};

/// One authorised user. `active_call`/`outgoing_pending`/`incoming_pending`
/// are indices into the server's owning maps, not owning references
/// themselves — see [`crate::ids`].
#[derive(Debug, Clone)]
pub struct User {
    pub nickname_hash: NicknameHash,
    pub token: Token,
    pub public_key_pem: String,
    pub endpoint: SocketAddr,
    pub down: bool,
    pub down_since: Option<Instant>,
    pub active_call: Option<CallId>,
    pub outgoing_pending: Option<PendingCallId>,
    pub incoming_pending: Vec<PendingCallId>,
}

impl User {
    pub fn new(
        nickname_hash: NicknameHash,
        token: Token,
        public_key_pem: String,
        endpoint: SocketAddr,
    ) -> Self {
        Self {
            nickname_hash,
            token,
            public_key_pem,
            endpoint,
            down: false,
            down_since: None,
            active_call: None,
            outgoing_pending: None,
            incoming_pending: Vec::new(),
        }
    }

    pub fn is_free(&self) -> bool {
        self.active_call.is_none() && self.outgoing_pending.is_none()
    }
}

/// An established call between two users. The server is its sole owner;
/// both `User`s hold only its [`CallId`].
#[derive(Debug, Clone)]
pub struct Call {
    pub id: CallId,
    pub a: NicknameHash,
    pub b: NicknameHash,
}

impl Call {
    pub fn partner_of<'a>(&'a self, hash: &NicknameHash) -> Option<&'a NicknameHash> {
        if &self.a == hash {
            Some(&self.b)
        } else if &self.b == hash {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// A ring in progress, not yet accepted. The server is its sole owner;
/// both `User`s hold only its [`PendingCallId`].
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: PendingCallId,
    pub caller: NicknameHash,
    pub callee: NicknameHash,
    pub started_at: Instant,
}
