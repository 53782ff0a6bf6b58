//! # Callifornia Protocol
//!
//! Wire-level data model shared by the client and server: stable
//! identifiers, the datagram fragment header, the `packet_type` catalogue,
//! and the JSON bodies carried by each signaling message.
//!
//! This crate has no opinion about sockets, threads, or state machines — it
//! only knows how to name and (de)serialize the bytes on the wire.

pub mod constants;
pub mod error;
pub mod frame;
pub mod ids;
pub mod kinds;
pub mod messages;
pub mod packet;

pub use error::ProtocolError;
pub use frame::{fragment, FrameHeader, HEADER_SIZE, MAX_CHUNK_SIZE, MAX_UDP_DATAGRAM};
pub use ids::{NicknameHash, PacketId, Token, Uid};
pub use kinds::ErrorKind;
pub use packet::PacketType;
