//! Wires the client state machine to the transport: the embedding API
//! (§6.2), the signaling packet dispatcher (§4.7), the ring-timer
//! sweep (§3, §4.5), and the establishment/reconnection service (§4.9).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use callifornia_crypto::envelope::{decrypt_bytes, encrypt_bytes};
use callifornia_crypto::AsymKeyPair;
use callifornia_protocol::constants::{RECONNECT_IDLE_POLL_INTERVAL, RECONNECT_RETRY_INTERVAL};
use callifornia_protocol::{messages::*, PacketType};
use callifornia_transport::{
    DatagramTransport, PingController, ReliableRequestManager, TransportError, TransportHandlers,
};

use crate::entities::SessionPhase;
use crate::error::ClientError;
use crate::events::ClientEventListener;
use crate::outbound::{Effects, Event, Send};
use crate::state::ClientState;

/// Cadence of the ring-timer sweep: fine enough that a 32 s ring expires
/// within a fraction of a second of its deadline.
const RING_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// The running client: owns the session state, the datagram transport,
/// the ping controller tracking the one server endpoint, the reliable-
/// request manager, and the two background threads that don't depend
/// on an inbound packet (ring-timer, reconnection service).
pub struct ClientApp {
    state: Arc<Mutex<ClientState>>,
    keys: Arc<AsymKeyPair>,
    server_addr: SocketAddr,
    transport: Arc<DatagramTransport>,
    #[allow(dead_code)]
    ping: Arc<PingController>,
    reliable: Arc<ReliableRequestManager>,
    listener: Arc<dyn ClientEventListener>,
    running: Arc<AtomicBool>,
    ring_handle: Option<JoinHandle<()>>,
    reconnect_handle: Option<JoinHandle<()>>,
}

impl ClientApp {
    /// Binds `bind_addr`, spawns the transport/ping/reliable machinery,
    /// and starts the ring-timer and reconnection-service threads. No
    /// session exists yet — call [`authorize`](Self::authorize) next.
    pub fn connect<L: ClientEventListener>(
        bind_addr: SocketAddr,
        server_addr: SocketAddr,
        listener: L,
    ) -> std::io::Result<Self> {
        let keys = Arc::new(
            AsymKeyPair::generate()
                .map_err(|err| std::io::Error::other(err.to_string()))?,
        );
        let state = Arc::new(Mutex::new(ClientState::new()));
        let listener: Arc<dyn ClientEventListener> = Arc::new(listener);
        let reliable = Arc::new(ReliableRequestManager::spawn(Duration::from_millis(100)));

        let handlers = Arc::new(ClientTransportHandlers {
            state: Arc::clone(&state),
            keys: Arc::clone(&keys),
            reliable: Arc::clone(&reliable),
            listener: Arc::clone(&listener),
            server_addr,
            transport: Mutex::new(None),
            ping: Mutex::new(None),
        });
        let transport = Arc::new(DatagramTransport::spawn(bind_addr, Arc::clone(&handlers))?);
        *handlers.transport.lock() = Some(Arc::clone(&transport));

        let ping = {
            let transport_for_ping = Arc::clone(&transport);
            let state_for_down = Arc::clone(&state);
            let listener_for_down = Arc::clone(&listener);
            Arc::new(PingController::spawn(
                move |endpoint| {
                    let _ = transport_for_ping.send_ping(endpoint);
                },
                move |_endpoint| {
                    let effects = state_for_down.lock().mark_connection_down();
                    fire_events(&listener_for_down, effects.events);
                },
                move |_endpoint| {
                    // The ping edge alone never resumes anything — only a
                    // successful RECONNECT does (§4.6, §4.9). Nothing to
                    // do here; the reconnection service drives recovery.
                },
            ))
        };
        ping.track(server_addr);
        *handlers.ping.lock() = Some(Arc::clone(&ping));

        let running = Arc::new(AtomicBool::new(true));

        let ring_handle = {
            let state = Arc::clone(&state);
            let listener = Arc::clone(&listener);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("callifornia-client-ring-timer".into())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        std::thread::sleep(RING_SWEEP_INTERVAL);
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        let effects = state.lock().expire_stale_rings(Instant::now());
                        fire_events(&listener, effects.events);
                    }
                })
                .expect("failed to spawn ring-timer thread")
        };

        let reconnect_handle = {
            let state = Arc::clone(&state);
            let transport = Arc::clone(&transport);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("callifornia-client-reconnect".into())
                .spawn(move || {
                    let mut last_attempt: Option<Instant> = None;
                    while running.load(Ordering::Acquire) {
                        std::thread::sleep(RECONNECT_IDLE_POLL_INTERVAL);
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        if !state.lock().is_connection_down() {
                            last_attempt = None;
                            continue;
                        }
                        let now = Instant::now();
                        let due = last_attempt
                            .map(|t| now.duration_since(t) >= RECONNECT_RETRY_INTERVAL)
                            .unwrap_or(true);
                        if !due {
                            continue;
                        }
                        last_attempt = Some(now);
                        if let Some(Send::Once { packet_type, body }) = state.lock().build_reconnect() {
                            if let Err(err) = transport.send(server_addr, packet_type.into(), &body) {
                                tracing::debug!(%err, "reconnection attempt failed to send");
                            }
                        }
                    }
                })
                .expect("failed to spawn reconnection-service thread")
        };

        Ok(Self {
            state,
            keys,
            server_addr,
            transport,
            ping,
            reliable,
            listener,
            running,
            ring_handle: Some(ring_handle),
            reconnect_handle: Some(reconnect_handle),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase()
    }

    pub fn is_connection_down(&self) -> bool {
        self.state.lock().is_connection_down()
    }

    // ---- Embedding API (§6.2) ------------------------------------------

    /// Claims `nickname` with the server. Result arrives asynchronously
    /// through [`ClientEventListener::on_authorization_result`].
    pub fn authorize(&self, nickname: impl Into<String>) -> Result<(), ClientError> {
        let public_key_pem = self.keys.public_key_pem()?;
        let send = self.state.lock().authorize(nickname.into(), public_key_pem)?;
        self.dispatch_send(send);
        Ok(())
    }

    /// Logs out. Torn down locally immediately; the `LOGOUT` packet is
    /// still sent reliably so the server's registry agrees (§4.5).
    pub fn logout(&self) {
        match self.state.lock().logout() {
            Ok(send) => self.dispatch_send(send),
            Err(err) => tracing::debug!(%err, "logout() called with no active session"),
        }
    }

    /// Returns `false` if `peer_nickname` is empty or equal to our own
    /// nickname, or if we are already ringing/in a call; further
    /// failures (peer unknown, ring timeout) are delivered via events.
    pub fn start_outgoing_call(&self, peer_nickname: impl Into<String>) -> bool {
        match self.state.lock().start_outgoing_call(peer_nickname.into()) {
            Ok(send) => {
                self.dispatch_send(send);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "start_outgoing_call rejected");
                false
            }
        }
    }

    pub fn stop_outgoing_call(&self) -> bool {
        match self.state.lock().stop_outgoing_call() {
            Ok(send) => {
                self.dispatch_send(send);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "stop_outgoing_call rejected");
                false
            }
        }
    }

    pub fn accept_call(&self, peer_nickname: &str) -> bool {
        let own_public_key_pem = match self.keys.public_key_pem() {
            Ok(pem) => pem,
            Err(err) => {
                tracing::warn!(%err, "failed to serialise own public key");
                return false;
            }
        };
        match self.state.lock().accept_call(peer_nickname, &own_public_key_pem) {
            Ok(send) => {
                self.dispatch_send(send);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "accept_call rejected");
                false
            }
        }
    }

    pub fn decline_call(&self, peer_nickname: &str) -> bool {
        match self.state.lock().decline_call(peer_nickname) {
            Ok(send) => {
                self.dispatch_send(send);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "decline_call rejected");
                false
            }
        }
    }

    pub fn end_call(&self) -> bool {
        match self.state.lock().end_call() {
            Ok(send) => {
                self.dispatch_send(send);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "end_call rejected");
                false
            }
        }
    }

    /// Encrypts `pcm` under the active call's key and relays it through
    /// the server (§3 `CallKey`, §4.8). A no-op if there is no active
    /// call — media is loss-tolerant, so callers are not expected to
    /// check first.
    pub fn send_voice(&self, pcm: &[u8]) -> Result<(), ClientError> {
        self.send_media(PacketType::Voice, pcm)
    }

    pub fn send_screen_frame(&self, frame: &[u8]) -> Result<(), ClientError> {
        self.send_media(PacketType::Screen, frame)
    }

    pub fn send_camera_frame(&self, frame: &[u8]) -> Result<(), ClientError> {
        self.send_media(PacketType::Camera, frame)
    }

    fn send_media(&self, packet_type: PacketType, payload: &[u8]) -> Result<(), ClientError> {
        let call_key = {
            let state = self.state.lock();
            let session = state.session().ok_or(ClientError::NotAuthorized)?;
            let active = session.active.as_ref().ok_or(ClientError::NoActiveCall)?;
            active.call_key.clone()
        };
        let ciphertext = encrypt_bytes(&call_key, payload)?;
        self.transport.send(self.server_addr, packet_type.into(), &ciphertext)?;
        Ok(())
    }

    fn dispatch_send(&self, send: Send) {
        send_one(&self.transport, &self.reliable, self.server_addr, send);
    }

    /// Stops the transport, ping controller, reliable manager, and the
    /// two background threads, bounded by `SHUTDOWN_JOIN_TIMEOUT` (§5).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.ring_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reconnect_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ClientApp {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ClientTransportHandlers {
    state: Arc<Mutex<ClientState>>,
    keys: Arc<AsymKeyPair>,
    reliable: Arc<ReliableRequestManager>,
    listener: Arc<dyn ClientEventListener>,
    server_addr: SocketAddr,
    transport: Mutex<Option<Arc<DatagramTransport>>>,
    ping: Mutex<Option<Arc<PingController>>>,
}

impl ClientTransportHandlers {
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

    fn handle_media(&self, packet_type: PacketType, payload: Vec<u8>) {
        let (call_key, peer_nickname) = {
            let state = self.state.lock();
            let Some(session) = state.session() else { return };
            let Some(active) = session.active.as_ref() else { return };
            (active.call_key.clone(), active.peer_nickname.clone())
        };
        let Ok(plaintext) = decrypt_bytes(&call_key, &payload) else {
            // Corrupt or not actually addressed to us; media is
            // loss-tolerant, so drop silently (§7).
            return;
        };
        match packet_type {
            PacketType::Voice => self.listener.on_incoming_voice(&peer_nickname, &plaintext),
            PacketType::Screen => self.listener.on_incoming_screen(&peer_nickname, &plaintext),
            PacketType::Camera => self.listener.on_incoming_camera(&peer_nickname, &plaintext),
            _ => unreachable!("handle_media is only called for media packet types"),
        }
    }
}

impl TransportHandlers for ClientTransportHandlers {
    fn on_message(&self, from: SocketAddr, packet_type: u32, payload: Vec<u8>) {
        if from != self.server_addr {
            tracing::debug!(%from, "dropping datagram from unexpected sender");
            return;
        }
        let Ok(packet_type) = PacketType::try_from(packet_type) else {
            tracing::debug!(%from, packet_type, "dropping unknown packet type");
            return;
        };

        if packet_type.is_media() {
            self.handle_media(packet_type, payload);
            return;
        }

        match dispatch(&self.state, &self.keys, &self.reliable, packet_type, &payload) {
            Ok(effects) => {
                for send in effects.sends {
                    send_one(&self.transport(), &self.reliable, self.server_addr, send);
                }
                fire_events(&self.listener, effects.events);
            }
            Err(err) => {
                tracing::debug!(%err, ?packet_type, "dropping malformed or out-of-context packet");
            }
        }
    }

    fn on_ping(&self, from: SocketAddr) {
        let _ = self.transport().send_pong(from);
    }

    fn on_pong(&self, from: SocketAddr) {
        self.ping().record_pong(from);
    }

    fn on_transport_error(&self, error: TransportError) {
        tracing::error!(%error, "fatal transport error");
        let effects = self.state.lock().mark_connection_down();
        fire_events(&self.listener, effects.events);
    }
}

/// Handles one inbound signaling packet: parses its JSON body, advances
/// the state machine, and completes any outstanding reliable request
/// the reply answers (§4.3's `complete_task`).
fn dispatch(
    state: &Mutex<ClientState>,
    keys: &AsymKeyPair,
    reliable: &ReliableRequestManager,
    packet_type: PacketType,
    payload: &[u8],
) -> Result<Effects, ClientError> {
    use PacketType::*;
    Ok(match packet_type {
        AuthorizationResult => {
            let msg: AuthorizationResult = serde_json::from_slice(payload)?;
            reliable.complete(&msg.uid);
            state.lock().on_authorization_result(msg)
        }
        ReconnectResult => {
            let msg: ReconnectResult = serde_json::from_slice(payload)?;
            state.lock().on_reconnect_result(msg)
        }
        GetUserInfoResult => {
            let msg: GetUserInfoResult = serde_json::from_slice(payload)?;
            reliable.complete(&msg.uid);
            let own_public_key_pem = keys.public_key_pem()?;
            state.lock().on_get_user_info_result(msg, &own_public_key_pem)
        }
        CallingBegin => {
            let envelope: CallEnvelope = serde_json::from_slice(payload)?;
            state.lock().on_calling_begin(envelope, keys.private_key())
        }
        CallingEnd => {
            let parties: TwoParties = serde_json::from_slice(payload)?;
            state.lock().on_calling_end(parties)
        }
        CallAccept => {
            let envelope: CallEnvelope = serde_json::from_slice(payload)?;
            state.lock().on_call_accept(envelope)
        }
        CallDecline => {
            let body: CallDecline = serde_json::from_slice(payload)?;
            state.lock().on_call_decline(body)
        }
        CallEnd => {
            let parties: TwoParties = serde_json::from_slice(payload)?;
            state.lock().on_call_end(parties)
        }
        Confirmation => {
            let msg: Confirmation = serde_json::from_slice(payload)?;
            reliable.complete(&msg.uid);
            Effects::none()
        }
        ConnectionDownWithUser | ConnectionRestoredWithUser | UserLogout => {
            let msg: UserEvent = serde_json::from_slice(payload)?;
            let mut effects = {
                let mut state = state.lock();
                match packet_type {
                    ConnectionDownWithUser => state
                        .on_partner_connection_event(msg.nickname_hash.clone(), true)
                        .map(Effects::event)
                        .unwrap_or_default(),
                    ConnectionRestoredWithUser => state
                        .on_partner_connection_event(msg.nickname_hash.clone(), false)
                        .map(Effects::event)
                        .unwrap_or_default(),
                    UserLogout => state.on_user_logout(msg.nickname_hash.clone()),
                    _ => unreachable!(),
                }
            };
            // The server's push is reliable (§6.1); echo the ack so it
            // stops retrying, regardless of whether the event named our
            // active call's partner.
            let own_hash = state
                .lock()
                .own_nickname_hash()
                .cloned()
                .unwrap_or_else(|| msg.nickname_hash.clone());
            effects.push_send(Send::once(
                PacketType::Confirmation,
                &Confirmation {
                    uid: msg.uid,
                    receiver_nickname_hash: own_hash,
                },
            ));
            effects
        }
        _ => Effects::none(),
    })
}

fn send_one(
    transport: &Arc<DatagramTransport>,
    reliable: &Arc<ReliableRequestManager>,
    server_addr: SocketAddr,
    send: Send,
) {
    match send {
        Send::Once { packet_type, body } => {
            if let Err(err) = transport.send(server_addr, packet_type.into(), &body) {
                tracing::debug!(%err, "failed to send outbound message");
            }
        }
        Send::Reliable {
            packet_type,
            body,
            uid,
            period,
            max_attempts,
        } => {
            let transport = Arc::clone(transport);
            reliable.start(
                uid,
                period,
                max_attempts,
                move || {
                    if let Err(err) = transport.send(server_addr, packet_type.into(), &body) {
                        tracing::debug!(%err, "failed to send reliable request");
                    }
                },
                || {},
                move || {
                    tracing::warn!(?packet_type, "reliable request exhausted retries");
                },
            );
        }
    }
}

fn fire_events(listener: &Arc<dyn ClientEventListener>, events: Vec<Event>) {
    for event in events {
        match event {
            Event::AuthorizationResult { ok, err } => listener.on_authorization_result(ok, err),
            Event::IncomingCall { peer_nickname } => listener.on_incoming_call(&peer_nickname),
            Event::IncomingCallExpired { peer_nickname } => {
                listener.on_incoming_call_expired(&peer_nickname, None)
            }
            Event::OutgoingCallAccepted { peer_nickname } => {
                listener.on_outgoing_call_accepted(&peer_nickname)
            }
            Event::OutgoingCallDeclined { peer_nickname, err } => {
                listener.on_outgoing_call_declined(&peer_nickname, err)
            }
            Event::OutgoingCallTimeout { peer_nickname, err } => {
                listener.on_outgoing_call_timeout(&peer_nickname, err)
            }
            Event::CallEndedByRemote { peer_nickname } => {
                listener.on_call_ended_by_remote(&peer_nickname, None)
            }
            Event::CallParticipantConnectionDown { peer_nickname } => {
                listener.on_call_participant_connection_down(&peer_nickname)
            }
            Event::CallParticipantConnectionRestored { peer_nickname } => {
                listener.on_call_participant_connection_restored(&peer_nickname)
            }
            Event::ConnectionDown => listener.on_connection_down(),
            Event::ConnectionRestored => listener.on_connection_restored(),
            Event::ConnectionRestoredAuthorizationNeeded => {
                listener.on_connection_restored_authorization_needed()
            }
        }
    }
}
