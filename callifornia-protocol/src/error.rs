use thiserror::Error;

/// Errors surfaced while decoding wire data: malformed frame headers or
/// JSON bodies that don't match the expected packet-type schema.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("datagram shorter than the frame header ({0} bytes)")]
    TruncatedHeader(usize),
    #[error("declared total_chunks is zero")]
    ZeroTotalChunks,
    #[error("declared total_chunks {total} exceeds the {max} allowed for one message")]
    TooManyChunks { total: u16, max: u16 },
    #[error("chunk_index {index} out of range for total_chunks {total}")]
    ChunkIndexOutOfRange { index: u16, total: u16 },
    #[error("payload_length {declared} does not match datagram remainder {actual}")]
    PayloadLengthMismatch { declared: u16, actual: usize },
    #[error("unknown packet type {0}")]
    UnknownPacketType(u32),
    #[error("invalid JSON body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}
