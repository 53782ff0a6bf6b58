//! Handler output: messages to emit, decoupled from the transport so
//! handlers stay testable without a real socket.

use std::net::SocketAddr;

use callifornia_protocol::{PacketType, Uid};
use serde::Serialize;

pub struct Outbound {
    pub to: SocketAddr,
    pub packet_type: PacketType,
    pub body: Vec<u8>,
    /// `Some(uid)` for the packet types the catalogue marks "reliable"
    /// (§6.1): the caller is expected to retry via a
    /// `ReliableRequestManager` under this uid until the client's
    /// `CONFIRMATION` completes it, rather than fire-and-forget once.
    pub reliable: Option<Uid>,
}

impl Outbound {
    pub fn json<T: Serialize>(to: SocketAddr, packet_type: PacketType, body: &T) -> Outbound {
        Outbound {
            to,
            packet_type,
            body: serde_json::to_vec(body).expect("signalling bodies are always serialisable"),
            reliable: None,
        }
    }

    /// Like [`json`](Self::json), but marks the message for retry-until-ack
    /// delivery under `uid` (§4.3), per the "Reliable?" column of §6.1.
    pub fn json_reliable<T: Serialize>(
        to: SocketAddr,
        packet_type: PacketType,
        uid: Uid,
        body: &T,
    ) -> Outbound {
        Outbound {
            to,
            packet_type,
            body: serde_json::to_vec(body).expect("signalling bodies are always serialisable"),
            reliable: Some(uid),
        }
    }

    /// Forwards an already-serialised body verbatim (e.g. relaying a call
    /// envelope the server never needed to fully understand).
    pub fn raw(to: SocketAddr, packet_type: PacketType, body: Vec<u8>) -> Outbound {
        Outbound {
            to,
            packet_type,
            body,
            reliable: None,
        }
    }
}
