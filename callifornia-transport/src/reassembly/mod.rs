//! Bounded per-endpoint fragment reassembly (§4.1).

mod buffer;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use callifornia_protocol::frame::FrameHeader;

use buffer::PendingReassembly;

const MAX_RECORDS_PER_ENDPOINT: usize = callifornia_protocol::constants::MAX_REASSEMBLY_RECORDS_PER_ENDPOINT;
const RECORD_TTL: Duration = callifornia_protocol::constants::REASSEMBLY_RECORD_TTL;
const MAX_CHUNKS_PER_MESSAGE: u16 = callifornia_protocol::constants::MAX_CHUNKS_PER_MESSAGE;

/// One endpoint's set of in-flight reassemblies, keyed by packet id.
#[derive(Default)]
struct EndpointTable {
    records: HashMap<u64, PendingReassembly>,
}

impl EndpointTable {
    fn prune(&mut self, now: Instant) {
        self.records
            .retain(|_, record| now.duration_since(record.last_update) < RECORD_TTL);
    }

    fn evict_oldest(&mut self) {
        if let Some((&oldest_id, _)) = self
            .records
            .iter()
            .min_by_key(|(_, record)| record.last_update)
        {
            self.records.remove(&oldest_id);
        }
    }
}

/// Reassembles fragmented datagrams per remote endpoint, enforcing the
/// bounds described in §4.1: at most 8 in-flight records per endpoint,
/// each pruned after 3 s of inactivity, oldest evicted to make room for a
/// new packet id once the cap is reached.
#[derive(Default)]
pub struct ReassemblyTable {
    endpoints: HashMap<SocketAddr, EndpointTable>,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one decoded fragment in. Returns the fully reassembled
    /// payload and its packet type once the last chunk for a packet id
    /// arrives; returns `None` while reassembly is still in progress.
    pub fn accept(
        &mut self,
        from: SocketAddr,
        header: &FrameHeader,
        chunk: Vec<u8>,
        now: Instant,
    ) -> Option<(Vec<u8>, u32)> {
        // `FrameHeader::decode` already rejects an oversized `total_chunks`;
        // this check stays as a last line of defense against whoever calls
        // `accept` directly against an unvalidated header.
        if header.total_chunks > MAX_CHUNKS_PER_MESSAGE {
            tracing::warn!(
                %from,
                total_chunks = header.total_chunks,
                max = MAX_CHUNKS_PER_MESSAGE,
                "dropping fragment declaring too many total_chunks"
            );
            return None;
        }

        let table = self.endpoints.entry(from).or_default();
        table.prune(now);

        let packet_id = header.packet_id.0;
        let needs_reset = table
            .records
            .get(&packet_id)
            .map(|record| {
                record.total_chunks != header.total_chunks || record.packet_type != header.packet_type
            })
            .unwrap_or(false);
        if needs_reset {
            table.records.remove(&packet_id);
        }

        if !table.records.contains_key(&packet_id) {
            if table.records.len() >= MAX_RECORDS_PER_ENDPOINT {
                table.evict_oldest();
            }
            table.records.insert(
                packet_id,
                PendingReassembly::new(header.total_chunks, header.packet_type, now),
            );
        }

        let record = table.records.get_mut(&packet_id)?;
        record.add_chunk(header.chunk_index, chunk, now);
        if record.is_complete() {
            let record = table.records.remove(&packet_id)?;
            let packet_type = record.packet_type;
            return Some((record.assemble(), packet_type));
        }
        None
    }

    /// Drops all records for an endpoint, e.g. once a peer is known gone.
    pub fn forget(&mut self, endpoint: &SocketAddr) {
        self.endpoints.remove(endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callifornia_protocol::fragment;
    use callifornia_protocol::PacketId;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn reassembles_a_fragmented_message() {
        let payload = vec![7u8; 3000];
        let chunks = fragment(PacketId(1), 42, &payload);
        let mut table = ReassemblyTable::new();
        let now = Instant::now();

        let mut out = None;
        for datagram in &chunks {
            let (header, body) = FrameHeader::decode(datagram).unwrap();
            out = table.accept(addr(), &header, body.to_vec(), now);
        }
        let (assembled, packet_type) = out.expect("should complete on last chunk");
        assert_eq!(assembled, payload);
        assert_eq!(packet_type, 42);
    }

    #[test]
    fn caps_records_per_endpoint_and_evicts_oldest() {
        let mut table = ReassemblyTable::new();
        let base = Instant::now();

        for id in 0..MAX_RECORDS_PER_ENDPOINT as u64 + 1 {
            let payload = vec![1u8, 2, 3];
            let chunks = fragment(PacketId(id), 0, &payload);
            let (header, body) = FrameHeader::decode(&chunks[0]).unwrap();
            let now = base + Duration::from_millis(id * 10);
            table.accept(addr(), &header, body.to_vec(), now);
        }

        let endpoint = table.endpoints.get(&addr()).unwrap();
        assert!(endpoint.records.len() <= MAX_RECORDS_PER_ENDPOINT);
        assert!(!endpoint.records.contains_key(&0), "oldest record should be evicted");
    }

    #[test]
    fn prunes_expired_records() {
        let mut table = ReassemblyTable::new();
        let t0 = Instant::now();
        let payload = vec![9u8, 9];
        let chunks = fragment(PacketId(5), 0, &payload);
        let (header, body) = FrameHeader::decode(&chunks[0]).unwrap();
        table.accept(addr(), &header, body.to_vec(), t0);

        let later = t0 + RECORD_TTL + Duration::from_millis(1);
        let other_chunks = fragment(PacketId(6), 0, &payload);
        let (other_header, other_body) = FrameHeader::decode(&other_chunks[0]).unwrap();
        table.accept(addr(), &other_header, other_body.to_vec(), later);

        let endpoint = table.endpoints.get(&addr()).unwrap();
        assert!(!endpoint.records.contains_key(&5), "expired record should be pruned");
    }

    #[test]
    fn rejects_fragment_declaring_too_many_chunks() {
        let mut table = ReassemblyTable::new();
        let now = Instant::now();
        let header = FrameHeader {
            packet_id: PacketId(1),
            chunk_index: 0,
            total_chunks: MAX_CHUNKS_PER_MESSAGE + 1,
            payload_length: 3,
            packet_type: 0,
        };
        let result = table.accept(addr(), &header, vec![1, 2, 3], now);
        assert_eq!(result, None);
        assert!(table.endpoints.get(&addr()).map_or(true, |e| e.records.is_empty()));
    }

    #[test]
    fn mismatched_total_chunks_resets_record() {
        let mut table = ReassemblyTable::new();
        let now = Instant::now();
        let payload_a = vec![0u8; 3000];
        let chunks_a = fragment(PacketId(1), 0, &payload_a);
        let (header_a, body_a) = FrameHeader::decode(&chunks_a[0]).unwrap();
        table.accept(addr(), &header_a, body_a.to_vec(), now);

        let payload_b = vec![1u8; 10];
        let chunks_b = fragment(PacketId(1), 0, &payload_b);
        let (header_b, body_b) = FrameHeader::decode(&chunks_b[0]).unwrap();
        let result = table.accept(addr(), &header_b, body_b.to_vec(), now);
        assert_eq!(result, Some((payload_b, 0)));
    }
}
