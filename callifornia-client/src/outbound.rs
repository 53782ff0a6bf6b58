//! Handler output on the client side: one message to the server,
//! optionally registered for retry-until-ack delivery. Mirrors
//! `callifornia-server`'s `outbound.rs`, minus the `to` field — the
//! client only ever talks to the one server it connected to.

use std::time::Duration;

use callifornia_protocol::{PacketType, Uid};
use serde::Serialize;

pub enum Send {
    Once {
        packet_type: PacketType,
        body: Vec<u8>,
    },
    /// Registered with the `ReliableRequestManager` under `uid`: resent
    /// every `period` until the matching `*_RESULT`/`CONFIRMATION`
    /// completes it, up to `max_attempts` (§4.3, §6.1).
    Reliable {
        packet_type: PacketType,
        body: Vec<u8>,
        uid: Uid,
        period: Duration,
        max_attempts: u32,
    },
}

impl Send {
    pub fn once<T: Serialize>(packet_type: PacketType, body: &T) -> Send {
        Send::Once {
            packet_type,
            body: serde_json::to_vec(body).expect("signalling bodies are always serialisable"),
        }
    }

    pub fn reliable<T: Serialize>(
        packet_type: PacketType,
        uid: Uid,
        period: Duration,
        max_attempts: u32,
        body: &T,
    ) -> Send {
        Send::Reliable {
            packet_type,
            body: serde_json::to_vec(body).expect("signalling bodies are always serialisable"),
            uid,
            period,
            max_attempts,
        }
    }
}

/// What an embedding application should be told as a result of handling
/// one inbound packet or one background tick (§6.2).
#[derive(Debug, Clone)]
pub enum Event {
    AuthorizationResult {
        ok: bool,
        err: Option<callifornia_protocol::ErrorKind>,
    },
    IncomingCall {
        peer_nickname: String,
    },
    IncomingCallExpired {
        peer_nickname: String,
    },
    OutgoingCallAccepted {
        peer_nickname: String,
    },
    OutgoingCallDeclined {
        peer_nickname: String,
        err: Option<callifornia_protocol::ErrorKind>,
    },
    OutgoingCallTimeout {
        peer_nickname: String,
        err: Option<callifornia_protocol::ErrorKind>,
    },
    CallEndedByRemote {
        peer_nickname: String,
    },
    CallParticipantConnectionDown {
        peer_nickname: String,
    },
    CallParticipantConnectionRestored {
        peer_nickname: String,
    },
    ConnectionDown,
    ConnectionRestored,
    ConnectionRestoredAuthorizationNeeded,
}

/// What a handler did: messages to send and events to raise, both
/// performed by the caller once the state lock is released (same split
/// as the server's `Vec<Outbound>`, see `callifornia-server::state`).
#[derive(Default)]
pub struct Effects {
    pub sends: Vec<Send>,
    pub events: Vec<Event>,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(send: Send) -> Self {
        Self {
            sends: vec![send],
            events: Vec::new(),
        }
    }

    pub fn event(event: Event) -> Self {
        Self {
            sends: Vec::new(),
            events: vec![event],
        }
    }

    pub fn push_send(&mut self, send: Send) {
        self.sends.push(send);
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }
}
