//! Client-local error conditions (§4.5, §4.9). Remote rejections are
//! reported through [`crate::events::ClientEventListener`], not here —
//! this enum is for calls the embedding API can reject before a packet
//! is ever sent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not authorized")]
    NotAuthorized,
    #[error("already authorized")]
    AlreadyAuthorized,
    #[error("nickname must not be empty")]
    EmptyNickname,
    #[error("peer nickname must be non-empty and not your own")]
    InvalidPeer,
    #[error("already calling, ringing, or in a call")]
    Busy,
    #[error("no incoming call from that peer")]
    NoSuchIncomingCall,
    #[error("no outgoing call in progress")]
    NoOutgoingCall,
    #[error("no active call")]
    NoActiveCall,
    #[error(transparent)]
    Protocol(#[from] callifornia_protocol::ProtocolError),
    #[error(transparent)]
    Crypto(#[from] callifornia_crypto::CryptoError),
    #[error(transparent)]
    Transport(#[from] callifornia_transport::TransportError),
    #[error("malformed signalling body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}
