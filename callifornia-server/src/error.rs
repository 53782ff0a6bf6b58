use thiserror::Error;

/// Errors the server's handling layer distinguishes. Handlers return a
/// `Result` rather than panicking on malformed or out-of-context input,
/// per the "state-object replacement of exceptions" design note (§9).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Protocol(#[from] callifornia_protocol::ProtocolError),
    #[error(transparent)]
    Transport(#[from] callifornia_transport::TransportError),
    #[error("malformed signalling body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("packet referenced an endpoint with no authorised user")]
    UnknownSender,
    #[error("packet named a party with no authorised user")]
    UnknownParty,
    #[error("no matching pending call")]
    NoSuchPendingCall,
    #[error("no matching active call")]
    NoSuchCall,
}
