//! Datagram fragment header (§4.1).
//!
//! ```text
//! offset  size  field
//! 0       8     packet_id
//! 8       2     chunk_index           (0-based)
//! 10      2     total_chunks
//! 12      2     payload_length        (bytes in this datagram)
//! 14      4     packet_type
//! 18      N     payload bytes
//! ```
//!
//! All integers are big-endian. This is a fixed binary layout read directly
//! off the wire; it is not run through serde.

use crate::error::ProtocolError;
use crate::ids::PacketId;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 18;

/// Maximum UDP payload the transport will emit, including the header.
pub const MAX_UDP_DATAGRAM: usize = 1500;

/// Practical maximum fragment data size, chosen to stay clear of typical
/// path MTU even though `MAX_UDP_DATAGRAM - HEADER_SIZE` allows more.
pub const MAX_CHUNK_SIZE: usize = 1300;

/// Reserved `packet_type` values delivered directly to the ping controller,
/// bypassing the reassembly buffer.
pub const PACKET_TYPE_PING: u32 = 0;
pub const PACKET_TYPE_PONG: u32 = 1;

/// One fragment of a (possibly multi-datagram) application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub packet_id: PacketId,
    pub chunk_index: u16,
    pub total_chunks: u16,
    pub payload_length: u16,
    pub packet_type: u32,
}

impl FrameHeader {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.packet_id.0.to_be_bytes());
        buf.extend_from_slice(&self.chunk_index.to_be_bytes());
        buf.extend_from_slice(&self.total_chunks.to_be_bytes());
        buf.extend_from_slice(&self.payload_length.to_be_bytes());
        buf.extend_from_slice(&self.packet_type.to_be_bytes());
    }

    /// Parses a header from the front of `datagram`, returning the header
    /// and the remaining payload slice.
    pub fn decode(datagram: &[u8]) -> Result<(FrameHeader, &[u8]), ProtocolError> {
        if datagram.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedHeader(datagram.len()));
        }

        let packet_id = PacketId(u64::from_be_bytes(datagram[0..8].try_into().unwrap()));
        let chunk_index = u16::from_be_bytes(datagram[8..10].try_into().unwrap());
        let total_chunks = u16::from_be_bytes(datagram[10..12].try_into().unwrap());
        let payload_length = u16::from_be_bytes(datagram[12..14].try_into().unwrap());
        let packet_type = u32::from_be_bytes(datagram[14..18].try_into().unwrap());

        if total_chunks == 0 {
            return Err(ProtocolError::ZeroTotalChunks);
        }
        if total_chunks > crate::constants::MAX_CHUNKS_PER_MESSAGE {
            return Err(ProtocolError::TooManyChunks {
                total: total_chunks,
                max: crate::constants::MAX_CHUNKS_PER_MESSAGE,
            });
        }
        if chunk_index >= total_chunks {
            return Err(ProtocolError::ChunkIndexOutOfRange {
                index: chunk_index,
                total: total_chunks,
            });
        }

        let payload = &datagram[HEADER_SIZE..];
        if payload.len() != payload_length as usize {
            return Err(ProtocolError::PayloadLengthMismatch {
                declared: payload_length,
                actual: payload.len(),
            });
        }

        Ok((
            FrameHeader {
                packet_id,
                chunk_index,
                total_chunks,
                payload_length,
                packet_type,
            },
            payload,
        ))
    }
}

/// Splits `payload` into `(header, chunk_bytes)` datagrams ready to send on
/// the wire, each at most `MAX_CHUNK_SIZE` bytes of payload.
pub fn fragment(packet_id: PacketId, packet_type: u32, payload: &[u8]) -> Vec<Vec<u8>> {
    let total_chunks = payload.chunks(MAX_CHUNK_SIZE).count().max(1) as u16;

    payload
        .chunks(MAX_CHUNK_SIZE)
        .enumerate()
        .map(|(index, chunk)| {
            let header = FrameHeader {
                packet_id,
                chunk_index: index as u16,
                total_chunks,
                payload_length: chunk.len() as u16,
                packet_type,
            };
            let mut datagram = Vec::with_capacity(HEADER_SIZE + chunk.len());
            header.encode_into(&mut datagram);
            datagram.extend_from_slice(chunk);
            datagram
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_yields_one_chunk() {
        let datagrams = fragment(PacketId(1), 5, &[]);
        assert_eq!(datagrams.len(), 1);
        let (header, payload) = FrameHeader::decode(&datagrams[0]).unwrap();
        assert_eq!(header.total_chunks, 1);
        assert!(payload.is_empty());
    }

    #[test]
    fn splits_at_chunk_boundary() {
        let payload = vec![7u8; MAX_CHUNK_SIZE * 2 + 10];
        let datagrams = fragment(PacketId(42), 3, &payload);
        assert_eq!(datagrams.len(), 3);
        for (i, datagram) in datagrams.iter().enumerate() {
            let (header, _) = FrameHeader::decode(datagram).unwrap();
            assert_eq!(header.chunk_index, i as u16);
            assert_eq!(header.total_chunks, 3);
            assert_eq!(header.packet_id, PacketId(42));
        }
    }

    #[test]
    fn rejects_truncated_header() {
        let err = FrameHeader::decode(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedHeader(4)));
    }

    #[test]
    fn rejects_excessive_total_chunks() {
        let mut datagram = Vec::new();
        let header = FrameHeader {
            packet_id: PacketId(1),
            chunk_index: 0,
            total_chunks: crate::constants::MAX_CHUNKS_PER_MESSAGE + 1,
            payload_length: 0,
            packet_type: 0,
        };
        header.encode_into(&mut datagram);
        let err = FrameHeader::decode(&datagram).unwrap_err();
        assert!(matches!(err, ProtocolError::TooManyChunks { .. }));
    }

    #[test]
    fn rejects_chunk_index_out_of_range() {
        let mut datagram = Vec::new();
        let header = FrameHeader {
            packet_id: PacketId(1),
            chunk_index: 2,
            total_chunks: 2,
            payload_length: 0,
            packet_type: 0,
        };
        header.encode_into(&mut datagram);
        let err = FrameHeader::decode(&datagram).unwrap_err();
        assert!(matches!(err, ProtocolError::ChunkIndexOutOfRange { .. }));
    }
}
