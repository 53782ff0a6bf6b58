use thiserror::Error;

/// Socket errors the transport distinguishes (§4.1 "Errors").
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was asked to stop, or the underlying socket was
    /// already closed by us. Never surfaced through `on_transport_error`.
    #[error("transport is shutting down")]
    ShuttingDown,
    /// A recoverable network condition (connection reset, unreachable).
    /// The transport continues receiving where possible.
    #[error("network error: {0}")]
    Network(std::io::Error),
    /// An unrecoverable socket failure. Surfaced through
    /// `on_transport_error`; the caller typically tears the session down.
    #[error("fatal transport error: {0}")]
    Fatal(std::io::Error),
    #[error(transparent)]
    Protocol(#[from] callifornia_protocol::ProtocolError),
}

impl TransportError {
    /// Classifies a raw socket I/O error the way §4.1 asks: shutting-down
    /// vs. network vs. fatal.
    pub fn classify(err: std::io::Error) -> TransportError {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotConnected | BrokenPipe => TransportError::ShuttingDown,
            ConnectionReset | ConnectionAborted | ConnectionRefused | AddrNotAvailable
            | TimedOut | WouldBlock => TransportError::Network(err),
            _ => TransportError::Fatal(err),
        }
    }
}
