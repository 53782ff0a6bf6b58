//! Fragmenting UDP datagram transport (§4.1).

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use callifornia_protocol::frame::{fragment, FrameHeader, PACKET_TYPE_PING, PACKET_TYPE_PONG};
use callifornia_protocol::{PacketId, ProtocolError};

use crate::error::TransportError;
use crate::reassembly::ReassemblyTable;

/// Depth of the bounded delivery queue between the socket thread and the
/// processing thread.
const DELIVERY_QUEUE_DEPTH: usize = 256;

/// One reassembled application message ready for the owning module.
pub struct Delivery {
    pub from: SocketAddr,
    pub packet_type: u32,
    pub payload: Vec<u8>,
}

/// Callbacks the owning module (client or server) supplies to react to
/// inbound traffic without the transport knowing anything about
/// signalling semantics.
pub trait TransportHandlers: Send + Sync + 'static {
    fn on_message(&self, from: SocketAddr, packet_type: u32, payload: Vec<u8>);
    fn on_ping(&self, from: SocketAddr);
    fn on_pong(&self, from: SocketAddr);
    fn on_transport_error(&self, error: TransportError);
}

/// Owns one UDP socket, fragments outbound messages, and reassembles
/// inbound ones on a dedicated processing thread fed by a bounded
/// delivery queue, per §4.1.
pub struct DatagramTransport {
    socket: Arc<UdpSocket>,
    next_packet_id: AtomicU64,
    send_lock: Mutex<()>,
    running: Arc<AtomicBool>,
    receiver_handle: Option<JoinHandle<()>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DatagramTransport {
    /// Binds `bind_addr` and spawns the receiver and processing threads.
    pub fn spawn<H: TransportHandlers>(
        bind_addr: SocketAddr,
        handlers: Arc<H>,
    ) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind_addr)?);
        let running = Arc::new(AtomicBool::new(true));
        let (delivery_tx, delivery_rx): (Sender<Delivery>, Receiver<Delivery>) =
            bounded(DELIVERY_QUEUE_DEPTH);

        let worker_handle = {
            let running = Arc::clone(&running);
            let handlers = Arc::clone(&handlers);
            std::thread::Builder::new()
                .name("callifornia-transport-worker".into())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        match delivery_rx.recv_timeout(Duration::from_millis(200)) {
                            Ok(delivery) => {
                                handlers.on_message(delivery.from, delivery.packet_type, delivery.payload)
                            }
                            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .expect("failed to spawn transport processing thread")
        };

        let receiver_handle = {
            let socket = Arc::clone(&socket);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("callifornia-transport-recv".into())
                .spawn(move || {
                    let mut reassembly = ReassemblyTable::new();
                    let mut buf = [0u8; callifornia_protocol::MAX_UDP_DATAGRAM];
                    loop {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        match socket.recv_from(&mut buf) {
                            Ok((len, from)) => {
                                let datagram = &buf[..len];
                                let header = match FrameHeader::decode(datagram) {
                                    Ok((header, _)) => header,
                                    Err(ProtocolError::TruncatedHeader(_)) => continue,
                                    Err(err) => {
                                        tracing::debug!(%from, error = %err, "dropping malformed datagram");
                                        continue;
                                    }
                                };

                                if header.packet_type == PACKET_TYPE_PING {
                                    handlers.on_ping(from);
                                    continue;
                                }
                                if header.packet_type == PACKET_TYPE_PONG {
                                    handlers.on_pong(from);
                                    continue;
                                }

                                let (_, payload) = FrameHeader::decode(datagram)
                                    .expect("already validated above");
                                let now = Instant::now();
                                if let Some((assembled, packet_type)) =
                                    reassembly.accept(from, &header, payload.to_vec(), now)
                                {
                                    let delivery = Delivery {
                                        from,
                                        packet_type,
                                        payload: assembled,
                                    };
                                    if delivery_tx.try_send(delivery).is_err() {
                                        tracing::warn!(%from, "delivery queue full, dropping message");
                                    }
                                }
                            }
                            Err(err) => match TransportError::classify(err) {
                                TransportError::ShuttingDown => break,
                                TransportError::Network(err) => {
                                    tracing::debug!(error = %err, "recoverable transport error");
                                }
                                fatal @ TransportError::Fatal(_) => {
                                    handlers.on_transport_error(fatal);
                                }
                                TransportError::Protocol(_) => unreachable!(),
                            },
                        }
                    }
                })
                .expect("failed to spawn transport receiver thread")
        };

        Ok(Self {
            socket,
            next_packet_id: AtomicU64::new(callifornia_protocol::ids::random_initial_packet_id().0),
            send_lock: Mutex::new(()),
            running,
            receiver_handle: Some(receiver_handle),
            worker_handle: Some(worker_handle),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Fragments and sends one application message. Chunks are written to
    /// the socket serially under `send_lock` so a message's chunks are
    /// not interleaved with the next message's on this sender's side.
    pub fn send(
        &self,
        to: SocketAddr,
        packet_type: u32,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let packet_id = PacketId(self.next_packet_id.fetch_add(1, Ordering::Relaxed));
        let datagrams = fragment(packet_id, packet_type, payload);
        let _guard = self.send_lock.lock();
        for datagram in datagrams {
            self.socket
                .send_to(&datagram, to)
                .map_err(TransportError::classify)?;
        }
        Ok(())
    }

    /// Sends a bare ping datagram (`packet_type == 0`, no payload).
    pub fn send_ping(&self, to: SocketAddr) -> Result<(), TransportError> {
        self.send(to, PACKET_TYPE_PING, &[])
    }

    /// Sends a bare pong datagram (`packet_type == 1`, no payload).
    pub fn send_pong(&self, to: SocketAddr) -> Result<(), TransportError> {
        self.send(to, PACKET_TYPE_PONG, &[])
    }

    /// Stops both threads, bounded by `SHUTDOWN_JOIN_TIMEOUT` (§5) on a
    /// best-effort basis — the threads poll `running` on their own
    /// cadence, so this call itself returns promptly once flagged.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        // Unblock a thread parked in recv_from by connecting a dummy
        // socket and sending a zero-length datagram to ourselves.
        if let Ok(local) = self.socket.local_addr() {
            if let Ok(wake) = UdpSocket::bind("0.0.0.0:0") {
                let _ = wake.send_to(&[0u8; callifornia_protocol::HEADER_SIZE], local);
            }
        }
        if let Some(handle) = self.receiver_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestHandlers {
        messages: Mutex<Sender<(SocketAddr, u32, Vec<u8>)>>,
        pings: Mutex<Sender<SocketAddr>>,
    }

    impl TransportHandlers for TestHandlers {
        fn on_message(&self, from: SocketAddr, packet_type: u32, payload: Vec<u8>) {
            let _ = self.messages.lock().send((from, packet_type, payload));
        }
        fn on_ping(&self, from: SocketAddr) {
            let _ = self.pings.lock().send(from);
        }
        fn on_pong(&self, _from: SocketAddr) {}
        fn on_transport_error(&self, _error: TransportError) {}
    }

    #[test]
    fn round_trips_a_fragmented_message_between_two_transports() {
        let (msg_tx, msg_rx) = bounded(8);
        let (ping_tx, _ping_rx) = bounded(8);
        let handlers_a = Arc::new(TestHandlers {
            messages: Mutex::new(msg_tx),
            pings: Mutex::new(ping_tx),
        });
        let transport_a =
            DatagramTransport::spawn("127.0.0.1:0".parse().unwrap(), handlers_a).unwrap();

        let (msg_tx_b, _msg_rx_b) = bounded(8);
        let (ping_tx_b, _ping_rx_b) = bounded(8);
        let handlers_b = Arc::new(TestHandlers {
            messages: Mutex::new(msg_tx_b),
            pings: Mutex::new(ping_tx_b),
        });
        let transport_b =
            DatagramTransport::spawn("127.0.0.1:0".parse().unwrap(), handlers_b).unwrap();

        let addr_a = transport_a.local_addr().unwrap();
        let payload = vec![42u8; 4000];
        transport_b.send(addr_a, 7, &payload).unwrap();

        let (from, packet_type, received) = msg_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("message should arrive reassembled");
        assert_eq!(packet_type, 7);
        assert_eq!(received, payload);
        assert_eq!(from.ip(), "127.0.0.1".parse::<std::net::IpAddr>().unwrap());
    }
}
