//! Wires the state machine to the transport: JSON (de)serialisation,
//! the media relay fast path, and the ping/eviction background loops.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use callifornia_protocol::constants::{RELIABLE_REQUEST_CALL_ATTEMPTS, RELIABLE_REQUEST_PERIOD};
use callifornia_protocol::{messages::*, PacketType};
use callifornia_transport::{
    DatagramTransport, PingController, ReliableRequestManager, TransportError, TransportHandlers,
};

use crate::outbound::Outbound;
use crate::state::ServerState;

/// How often the eviction sweep runs. Coarser than the 2-minute timeout
/// itself is pointless; a user is only ever overdue by up to this much.
const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// The running server: owns the shared [`ServerState`], the datagram
/// transport, the ping controller, and the eviction sweep thread.
pub struct ServerApp {
    state: Arc<Mutex<ServerState>>,
    transport: Arc<DatagramTransport>,
    ping: Arc<PingController>,
    reliable: Arc<ReliableRequestManager>,
    running: Arc<AtomicBool>,
    eviction_handle: Option<JoinHandle<()>>,
}

impl ServerApp {
    pub fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let state = Arc::new(Mutex::new(ServerState::new()));
        let reliable = Arc::new(ReliableRequestManager::spawn(Duration::from_millis(100)));

        let handlers = Arc::new(ServerTransportHandlers {
            state: Arc::clone(&state),
            reliable: Arc::clone(&reliable),
            transport: Mutex::new(None),
            ping: Mutex::new(None),
        });
        let transport = Arc::new(DatagramTransport::spawn(addr, Arc::clone(&handlers))?);
        *handlers.transport.lock() = Some(Arc::clone(&transport));

        let ping = {
            let transport_for_ping = Arc::clone(&transport);
            let transport_for_down = Arc::clone(&transport);
            let reliable_for_down = Arc::clone(&reliable);
            let state_for_down = Arc::clone(&state);
            Arc::new(PingController::spawn(
                move |endpoint| {
                    let _ = transport_for_ping.send_ping(endpoint);
                },
                move |endpoint| {
                    let outbound = state_for_down.lock().on_connection_down(endpoint);
                    send_all(&transport_for_down, &reliable_for_down, outbound);
                },
                move |_endpoint| {
                    // The ping edge alone never tears anything down or
                    // fires CONNECTION_RESTORED_WITH_USER — only a
                    // successful RECONNECT does (§4.6).
                },
            ))
        };
        *handlers.ping.lock() = Some(Arc::clone(&ping));

        let running = Arc::new(AtomicBool::new(true));
        let eviction_handle = {
            let state = Arc::clone(&state);
            let transport = Arc::clone(&transport);
            let reliable = Arc::clone(&reliable);
            let ping = Arc::clone(&ping);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("callifornia-eviction".into())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        std::thread::sleep(EVICTION_SWEEP_INTERVAL);
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        let outbound = state.lock().evict_expired(Instant::now(), &ping);
                        send_all(&transport, &reliable, outbound);
                    }
                })
                .expect("failed to spawn eviction thread")
        };

        Ok(Self {
            state,
            transport,
            ping,
            reliable,
            running,
            eviction_handle: Some(eviction_handle),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().user_count()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.eviction_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerApp {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ServerTransportHandlers {
    state: Arc<Mutex<ServerState>>,
    reliable: Arc<ReliableRequestManager>,
    transport: Mutex<Option<Arc<DatagramTransport>>>,
    ping: Mutex<Option<Arc<PingController>>>,
}

impl ServerTransportHandlers {
    fn transport(&self) -> Arc<DatagramTransport> {
        self.transport
            .lock()
            .clone()
            .expect("transport is set immediately after spawn")
    }

    fn ping(&self) -> Arc<PingController> {
        self.ping
            .lock()
            .clone()
            .expect("ping controller is set immediately after spawn")
    }
}

impl TransportHandlers for ServerTransportHandlers {
    fn on_message(&self, from: SocketAddr, packet_type: u32, payload: Vec<u8>) {
        let Ok(packet_type) = PacketType::try_from(packet_type) else {
            tracing::debug!(%from, packet_type, "dropping unknown packet type");
            return;
        };

        if packet_type.is_media() {
            let outbound = self.state.lock().relay_media(from, packet_type, payload);
            if let Some(outbound) = outbound {
                send_one(&self.transport(), &self.reliable, outbound);
            }
            return;
        }

        if packet_type == PacketType::Confirmation {
            match serde_json::from_slice::<Confirmation>(&payload) {
                Ok(body) => self.reliable.complete(&body.uid),
                Err(err) => tracing::debug!(%from, %err, "malformed CONFIRMATION body"),
            }
            return;
        }

        let ping = self.ping();
        let outbound = match dispatch(&self.state, &ping, from, packet_type, &payload) {
            Ok(outbound) => outbound,
            Err(err) => {
                tracing::debug!(
                    %from,
                    packet_type = packet_type_name(packet_type),
                    %err,
                    "dropping malformed or out-of-context packet"
                );
                return;
            }
        };
        send_all(&self.transport(), &self.reliable, outbound);
    }

    fn on_ping(&self, from: SocketAddr) {
        let _ = self.transport().send_pong(from);
    }

    fn on_pong(&self, from: SocketAddr) {
        self.ping().record_pong(from);
    }

    fn on_transport_error(&self, error: TransportError) {
        tracing::error!(%error, "fatal transport error");
    }
}

fn packet_type_name(packet_type: PacketType) -> &'static str {
    match packet_type {
        PacketType::Ping => "PING",
        PacketType::Pong => "PONG",
        PacketType::Authorization => "AUTHORIZATION",
        PacketType::AuthorizationResult => "AUTHORIZATION_RESULT",
        PacketType::Logout => "LOGOUT",
        PacketType::Reconnect => "RECONNECT",
        PacketType::ReconnectResult => "RECONNECT_RESULT",
        PacketType::GetUserInfo => "GET_USER_INFO",
        PacketType::GetUserInfoResult => "GET_USER_INFO_RESULT",
        PacketType::CallingBegin => "CALLING_BEGIN",
        PacketType::CallingEnd => "CALLING_END",
        PacketType::CallAccept => "CALL_ACCEPT",
        PacketType::CallDecline => "CALL_DECLINE",
        PacketType::CallEnd => "CALL_END",
        PacketType::ConnectionDownWithUser => "CONNECTION_DOWN_WITH_USER",
        PacketType::ConnectionRestoredWithUser => "CONNECTION_RESTORED_WITH_USER",
        PacketType::UserLogout => "USER_LOGOUT",
        PacketType::Confirmation => "CONFIRMATION",
        PacketType::Voice => "VOICE",
        PacketType::Screen => "SCREEN",
        PacketType::Camera => "CAMERA",
    }
}

fn dispatch(
    state: &Mutex<ServerState>,
    ping: &PingController,
    from: SocketAddr,
    packet_type: PacketType,
    payload: &[u8],
) -> Result<Vec<Outbound>, crate::error::ServerError> {
    use PacketType::*;
    let mut state = state.lock();
    Ok(match packet_type {
        Authorization => state.authorize(from, serde_json::from_slice(payload)?, ping),
        Logout => state.logout(from, serde_json::from_slice(payload)?, ping),
        Reconnect => state.reconnect(from, serde_json::from_slice(payload)?, ping),
        GetUserInfo => state.get_user_info(from, serde_json::from_slice(payload)?),
        CallingBegin => {
            let envelope: CallEnvelope = serde_json::from_slice(payload)?;
            state.start_outgoing_call(payload.to_vec(), &envelope)?
        }
        CallingEnd => {
            let parties: TwoParties = serde_json::from_slice(payload)?;
            state.end_pending_call(payload.to_vec(), CallingEnd, &parties)
        }
        CallDecline => {
            let parties: TwoParties = serde_json::from_slice(payload)?;
            state.end_pending_call(payload.to_vec(), CallDecline, &parties)
        }
        CallAccept => {
            let envelope: CallEnvelope = serde_json::from_slice(payload)?;
            state.accept_call(payload.to_vec(), &envelope)
        }
        CallEnd => {
            let parties: TwoParties = serde_json::from_slice(payload)?;
            state.end_call(payload.to_vec(), &parties)
        }
        Ping | Pong | Voice | Screen | Camera | AuthorizationResult | ReconnectResult
        | GetUserInfoResult | ConnectionDownWithUser | ConnectionRestoredWithUser | UserLogout
        | Confirmation => Vec::new(),
    })
}

fn send_all(transport: &Arc<DatagramTransport>, reliable: &Arc<ReliableRequestManager>, outbound: Vec<Outbound>) {
    for message in outbound {
        send_one(transport, reliable, message);
    }
}

/// Sends one handler-produced message. A message carrying a `reliable`
/// uid (§6.1's "Reliable?" column) is registered with the
/// `ReliableRequestManager` instead of sent once: it is retried every
/// [`RELIABLE_REQUEST_PERIOD`] up to [`RELIABLE_REQUEST_CALL_ATTEMPTS`]
/// times until the client's `CONFIRMATION` completes it (§4.3).
fn send_one(transport: &Arc<DatagramTransport>, reliable: &Arc<ReliableRequestManager>, message: Outbound) {
    let Outbound { to, packet_type, body, reliable: uid } = message;
    match uid {
        None => {
            if let Err(err) = transport.send(to, packet_type.into(), &body) {
                tracing::debug!(%to, %err, "failed to send outbound message");
            }
        }
        Some(uid) => {
            let transport = Arc::clone(transport);
            reliable.start(
                uid,
                RELIABLE_REQUEST_PERIOD,
                RELIABLE_REQUEST_CALL_ATTEMPTS,
                move || {
                    if let Err(err) = transport.send(to, packet_type.into(), &body) {
                        tracing::debug!(%to, %err, "failed to send reliable notification");
                    }
                },
                || {},
                move || {
                    tracing::warn!(%to, packet_type = packet_type_name(packet_type), "reliable notification exhausted retries");
                },
            );
        }
    }
}
