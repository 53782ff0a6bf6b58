//! Property-based fragmentation/reassembly round trip (§4.1).

use std::net::SocketAddr;
use std::time::Instant;

use callifornia_protocol::frame::FrameHeader;
use callifornia_protocol::{fragment, PacketId};
use callifornia_transport::ReassemblyTable;
use proptest::prelude::*;

fn endpoint() -> SocketAddr {
    "127.0.0.1:5000".parse().unwrap()
}

proptest! {
    #[test]
    fn fragment_then_reassemble_is_identity(
        payload in proptest::collection::vec(any::<u8>(), 0..6000),
        packet_type in any::<u32>(),
        seed in any::<u64>(),
    ) {
        let mut table = ReassemblyTable::new();
        let now = Instant::now();
        let datagrams = fragment(PacketId(seed), packet_type, &payload);

        let mut result = None;
        for datagram in &datagrams {
            let (header, body) = FrameHeader::decode(datagram).unwrap();
            result = table.accept(endpoint(), &header, body.to_vec(), now);
        }

        let (assembled, delivered_type) = result.expect("last chunk completes the message");
        prop_assert_eq!(assembled, payload);
        prop_assert_eq!(delivered_type, packet_type);
    }

    #[test]
    fn out_of_order_delivery_still_reassembles(
        payload in proptest::collection::vec(any::<u8>(), 1..6000),
        seed in any::<u64>(),
    ) {
        let mut table = ReassemblyTable::new();
        let now = Instant::now();
        let mut datagrams = fragment(PacketId(seed), 3, &payload);

        // Reverse arrival order to exercise the interleaving tolerance
        // called out in §4.1.
        datagrams.reverse();

        let mut result = None;
        for datagram in &datagrams {
            let (header, body) = FrameHeader::decode(datagram).unwrap();
            result = table.accept(endpoint(), &header, body.to_vec(), now);
        }

        let (assembled, _) = result.expect("completes regardless of arrival order");
        prop_assert_eq!(assembled, payload);
    }
}
