//! The client's session state machine (§4.5, §4.7, §4.9): every method
//! takes `&mut self` and returns the `Effects` (sends + events) to
//! perform once the caller has released the lock, the same split
//! `callifornia-server::state` uses for the same reason — a handler
//! should never hold the lock across a socket write or an application
//! callback.

use callifornia_crypto::envelope::{seal_nickname, wrap_key};
use callifornia_crypto::{hash_nickname, parse_public_key_pem, SymmetricKey};
use callifornia_protocol::constants::{RELIABLE_REQUEST_CALL_ATTEMPTS, RELIABLE_REQUEST_PERIOD};
use callifornia_protocol::{messages::*, ErrorKind, NicknameHash, PacketType, Token, Uid};

use crate::entities::{phase_of, ActiveCall, IncomingCall, OutgoingCall, PendingLookup, Session, SessionPhase};
use crate::error::ClientError;
use crate::outbound::{Effects, Event, Send};

struct PendingAuthorization {
    nickname: String,
    nickname_hash: NicknameHash,
    uid: Uid,
}

/// All client-owned session state, guarded by one mutex in the caller
/// (see `ClientApp`), mirroring the "single lock" rule the server
/// applies to its own state in §5.
#[derive(Default)]
pub struct ClientState {
    session: Option<Session>,
    pending_authorization: Option<PendingAuthorization>,
    connection_down: bool,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        phase_of(self.session.as_ref())
    }

    pub fn is_connection_down(&self) -> bool {
        self.connection_down
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn own_nickname_hash(&self) -> Option<&NicknameHash> {
        self.session.as_ref().map(|s| &s.nickname_hash)
    }

    pub fn token(&self) -> Option<&Token> {
        self.session.as_ref().map(|s| &s.token)
    }

    // ---- AUTHORIZATION --------------------------------------------------

    pub fn authorize(&mut self, nickname: String, public_key_pem: String) -> Result<Send, ClientError> {
        if self.session.is_some() || self.pending_authorization.is_some() {
            return Err(ClientError::AlreadyAuthorized);
        }
        if nickname.trim().is_empty() {
            return Err(ClientError::EmptyNickname);
        }

        let nickname_hash = hash_nickname(&nickname);
        let uid = Uid::generate();
        self.pending_authorization = Some(PendingAuthorization {
            nickname,
            nickname_hash: nickname_hash.clone(),
            uid: uid.clone(),
        });

        let body = Authorization {
            uid: uid.clone(),
            sender_nickname_hash: nickname_hash,
            public_key: public_key_pem,
        };
        Ok(Send::reliable(
            PacketType::Authorization,
            uid,
            RELIABLE_REQUEST_PERIOD,
            RELIABLE_REQUEST_CALL_ATTEMPTS,
            &body,
        ))
    }

    pub fn on_authorization_result(&mut self, msg: AuthorizationResult) -> Effects {
        let Some(pending) = self.pending_authorization.take() else {
            return Effects::none();
        };
        if pending.uid != msg.uid {
            self.pending_authorization = Some(pending);
            return Effects::none();
        }

        if !msg.result {
            return Effects::event(Event::AuthorizationResult {
                ok: false,
                err: Some(ErrorKind::TakenNickname),
            });
        }

        let token = msg.token.unwrap_or_else(Token::generate);
        self.session = Some(Session::new(pending.nickname, pending.nickname_hash, token));
        Effects::event(Event::AuthorizationResult { ok: true, err: None })
    }

    // ---- LOGOUT -----------------------------------------------------------

    /// Torn down locally the moment the caller asks — a user's own
    /// decision to log out does not wait on the network (§4.7). The
    /// `LOGOUT` packet is still sent reliably so the server's registry
    /// agrees, but nothing in this client blocks on that.
    pub fn logout(&mut self) -> Result<Send, ClientError> {
        let session = self.session.take().ok_or(ClientError::NotAuthorized)?;
        let uid = Uid::generate();
        let body = Logout {
            uid: uid.clone(),
            sender_nickname_hash: session.nickname_hash,
        };
        Ok(Send::reliable(
            PacketType::Logout,
            uid,
            RELIABLE_REQUEST_PERIOD,
            RELIABLE_REQUEST_CALL_ATTEMPTS,
            &body,
        ))
    }

    // ---- RECONNECT (§4.9) -------------------------------------------------

    pub fn mark_connection_down(&mut self) -> Effects {
        if self.session.is_none() || self.connection_down {
            return Effects::none();
        }
        self.connection_down = true;
        Effects::event(Event::ConnectionDown)
    }

    /// Builds a `RECONNECT` for the reconnection-service thread to send
    /// on its retry cadence. `None` if there is no session to reconnect.
    pub fn build_reconnect(&self) -> Option<Send> {
        let session = self.session.as_ref()?;
        let uid = Uid::generate();
        let body = Reconnect {
            uid,
            sender_nickname_hash: session.nickname_hash.clone(),
            token: session.token.clone(),
        };
        Some(Send::once(PacketType::Reconnect, &body))
    }

    pub fn on_reconnect_result(&mut self, msg: ReconnectResult) -> Effects {
        if !msg.result {
            self.session = None;
            self.connection_down = false;
            return Effects::event(Event::ConnectionRestoredAuthorizationNeeded);
        }
        self.connection_down = false;
        if let Some(session) = self.session.as_mut() {
            session.token = msg.token;
        }
        Effects::event(Event::ConnectionRestored)
    }

    // ---- Calling lifecycle (§4.5) ------------------------------------------

    pub fn start_outgoing_call(&mut self, peer_nickname: String) -> Result<Send, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotAuthorized)?;
        if peer_nickname.is_empty() || peer_nickname == session.nickname {
            return Err(ClientError::InvalidPeer);
        }
        if !session.is_free() {
            return Err(ClientError::Busy);
        }

        let peer_hash = hash_nickname(&peer_nickname);
        let uid = Uid::generate();
        session.outgoing_lookup = Some(PendingLookup {
            peer_nickname,
            peer_nickname_hash: peer_hash.clone(),
            uid: uid.clone(),
        });

        let body = GetUserInfo {
            uid: uid.clone(),
            sender_nickname_hash: session.nickname_hash.clone(),
            nickname_hash: peer_hash,
        };
        Ok(Send::reliable(
            PacketType::GetUserInfo,
            uid,
            RELIABLE_REQUEST_PERIOD,
            RELIABLE_REQUEST_CALL_ATTEMPTS,
            &body,
        ))
    }

    /// Resolves the lookup `start_outgoing_call` kicked off: on success,
    /// builds and sends `CALLING_BEGIN`'s envelope; on failure, reports
    /// it the same way a ring timeout is reported, there being no
    /// dedicated "no such user" callback in the embedding API (§6.2,
    /// §9 follows the ring-timeout shape for this case too).
    pub fn on_get_user_info_result(
        &mut self,
        msg: GetUserInfoResult,
        own_public_key_pem: &str,
    ) -> Effects {
        let Some(session) = self.session.as_mut() else {
            return Effects::none();
        };
        let Some(lookup) = session.outgoing_lookup.take() else {
            return Effects::none();
        };
        if lookup.uid != msg.uid {
            session.outgoing_lookup = Some(lookup);
            return Effects::none();
        }

        let Some(public_key_pem) = msg.result.then_some(msg.public_key).flatten() else {
            return Effects::event(Event::OutgoingCallTimeout {
                peer_nickname: lookup.peer_nickname,
                err: Some(ErrorKind::UnexistingUser),
            });
        };

        let Ok(peer_public_key) = parse_public_key_pem(&public_key_pem) else {
            return Effects::event(Event::OutgoingCallTimeout {
                peer_nickname: lookup.peer_nickname,
                err: Some(ErrorKind::NetworkError),
            });
        };

        let call_key = SymmetricKey::generate();
        let (Ok(nickname_envelope), Ok(encrypted_call_key)) = (
            seal_nickname(&peer_public_key, &session.nickname),
            wrap_key(&peer_public_key, &call_key),
        ) else {
            return Effects::event(Event::OutgoingCallTimeout {
                peer_nickname: lookup.peer_nickname,
                err: Some(ErrorKind::NetworkError),
            });
        };

        let body = CallEnvelope {
            sender_nickname_hash: session.nickname_hash.clone(),
            receiver_nickname_hash: lookup.peer_nickname_hash.clone(),
            sender_public_key: own_public_key_pem.to_string(),
            encrypted_call_key,
            sender_encrypted_nickname: nickname_envelope.encrypted_nickname,
            packet_key: nickname_envelope.packet_key_wrapped,
        };

        session.outgoing = Some(OutgoingCall {
            peer_nickname: lookup.peer_nickname,
            peer_nickname_hash: lookup.peer_nickname_hash,
            peer_public_key_pem: public_key_pem,
            call_key,
            started_at: std::time::Instant::now(),
        });

        Effects::send(Send::once(PacketType::CallingBegin, &body))
    }

    pub fn stop_outgoing_call(&mut self) -> Result<Send, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotAuthorized)?;
        let outgoing = session.outgoing.take().ok_or(ClientError::NoOutgoingCall)?;
        let body = TwoParties {
            sender_nickname_hash: session.nickname_hash.clone(),
            receiver_nickname_hash: outgoing.peer_nickname_hash,
        };
        Ok(Send::once(PacketType::CallingEnd, &body))
    }

    /// An inbound `CALLING_BEGIN`: decrypts the caller's nickname and
    /// records the ring. Dropped silently if unauthorized or if the
    /// envelope fails to decrypt (not addressed to us, or corrupt).
    pub fn on_calling_begin(
        &mut self,
        envelope: CallEnvelope,
        own_private_key: &rsa::RsaPrivateKey,
    ) -> Effects {
        let Some(session) = self.session.as_mut() else {
            return Effects::none();
        };
        if envelope.receiver_nickname_hash != session.nickname_hash {
            return Effects::none();
        }

        let Ok(peer_nickname) = callifornia_crypto::envelope::open_nickname(
            own_private_key,
            &envelope.packet_key,
            &envelope.sender_encrypted_nickname,
        ) else {
            return Effects::none();
        };
        let Ok(call_key) = callifornia_crypto::envelope::unwrap_key(own_private_key, &envelope.encrypted_call_key)
        else {
            return Effects::none();
        };

        session.incoming.push(IncomingCall {
            peer_nickname: peer_nickname.clone(),
            peer_nickname_hash: envelope.sender_nickname_hash,
            peer_public_key_pem: envelope.sender_public_key,
            call_key,
            started_at: std::time::Instant::now(),
        });
        Effects::event(Event::IncomingCall { peer_nickname })
    }

    /// An inbound `CALLING_END`: the caller gave up before we answered.
    pub fn on_calling_end(&mut self, parties: TwoParties) -> Effects {
        let Some(session) = self.session.as_mut() else {
            return Effects::none();
        };
        let Some(incoming) = session.incoming.iter().position(|c| c.peer_nickname_hash == parties.sender_nickname_hash)
        else {
            return Effects::none();
        };
        let incoming = session.incoming.remove(incoming);
        Effects::event(Event::IncomingCallExpired {
            peer_nickname: incoming.peer_nickname,
        })
    }

    pub fn accept_call(&mut self, peer_nickname: &str, own_public_key_pem: &str) -> Result<Send, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotAuthorized)?;
        let incoming = session
            .take_incoming_from(peer_nickname)
            .ok_or(ClientError::NoSuchIncomingCall)?;

        // Accepting cancels our own outgoing ring and ends any call we
        // were already in — the server performs the matching cascade on
        // its side (declining every other incoming ring at us) when it
        // sees our `CALL_ACCEPT` (§4.5, §9).
        session.outgoing = None;
        session.outgoing_lookup = None;
        session.incoming.clear();
        session.active = Some(ActiveCall {
            peer_nickname: incoming.peer_nickname.clone(),
            peer_nickname_hash: incoming.peer_nickname_hash.clone(),
            call_key: incoming.call_key.clone(),
            partner_down: false,
        });

        let peer_public_key =
            parse_public_key_pem(&incoming.peer_public_key_pem).map_err(ClientError::Crypto)?;
        let nickname_envelope =
            seal_nickname(&peer_public_key, &session.nickname).map_err(ClientError::Crypto)?;
        let encrypted_call_key = wrap_key(&peer_public_key, &incoming.call_key).map_err(ClientError::Crypto)?;

        let body = CallEnvelope {
            sender_nickname_hash: session.nickname_hash.clone(),
            receiver_nickname_hash: incoming.peer_nickname_hash,
            sender_public_key: own_public_key_pem.to_string(),
            encrypted_call_key,
            sender_encrypted_nickname: nickname_envelope.encrypted_nickname,
            packet_key: nickname_envelope.packet_key_wrapped,
        };
        Ok(Send::once(PacketType::CallAccept, &body))
    }

    pub fn decline_call(&mut self, peer_nickname: &str) -> Result<Send, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotAuthorized)?;
        let incoming = session
            .take_incoming_from(peer_nickname)
            .ok_or(ClientError::NoSuchIncomingCall)?;
        let body = CallDecline {
            sender_nickname_hash: session.nickname_hash.clone(),
            receiver_nickname_hash: incoming.peer_nickname_hash,
            kind: None,
        };
        Ok(Send::once(PacketType::CallDecline, &body))
    }

    /// An inbound `CALL_ACCEPT`: our own outgoing ring was answered.
    pub fn on_call_accept(&mut self, envelope: CallEnvelope) -> Effects {
        let Some(session) = self.session.as_mut() else {
            return Effects::none();
        };
        let Some(outgoing) = session.outgoing.take() else {
            return Effects::none();
        };
        if outgoing.peer_nickname_hash != envelope.sender_nickname_hash {
            session.outgoing = Some(outgoing);
            return Effects::none();
        }

        session.active = Some(ActiveCall {
            peer_nickname: outgoing.peer_nickname.clone(),
            peer_nickname_hash: outgoing.peer_nickname_hash,
            call_key: outgoing.call_key,
            partner_down: false,
        });
        Effects::event(Event::OutgoingCallAccepted {
            peer_nickname: outgoing.peer_nickname,
        })
    }

    /// An inbound `CALL_DECLINE`: our own outgoing ring was refused, either
    /// by the peer directly or by the server's accept-while-busy cascade
    /// (carrying [`ErrorKind::DeclinedBusy`], §9).
    pub fn on_call_decline(&mut self, body: CallDecline) -> Effects {
        let Some(session) = self.session.as_mut() else {
            return Effects::none();
        };
        let Some(outgoing) = session.outgoing.take() else {
            return Effects::none();
        };
        if outgoing.peer_nickname_hash != body.sender_nickname_hash {
            session.outgoing = Some(outgoing);
            return Effects::none();
        }
        Effects::event(Event::OutgoingCallDeclined {
            peer_nickname: outgoing.peer_nickname,
            err: body.kind,
        })
    }

    pub fn end_call(&mut self) -> Result<Send, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotAuthorized)?;
        let active = session.active.take().ok_or(ClientError::NoActiveCall)?;
        let body = TwoParties {
            sender_nickname_hash: session.nickname_hash.clone(),
            receiver_nickname_hash: active.peer_nickname_hash,
        };
        Ok(Send::once(PacketType::CallEnd, &body))
    }

    /// An inbound `CALL_END`: the other side hung up.
    pub fn on_call_end(&mut self, parties: TwoParties) -> Effects {
        let Some(session) = self.session.as_mut() else {
            return Effects::none();
        };
        let Some(active) = session.active.take() else {
            return Effects::none();
        };
        if active.peer_nickname_hash != parties.sender_nickname_hash {
            session.active = Some(active);
            return Effects::none();
        }
        Effects::event(Event::CallEndedByRemote {
            peer_nickname: active.peer_nickname,
        })
    }

    // ---- Partner liveness (§4.6) -------------------------------------------

    /// An inbound `CONNECTION_DOWN_WITH_USER`/`CONNECTION_RESTORED_WITH_USER`:
    /// returns the event to raise if the named user is our active
    /// call's partner. The caller still owes the server a `CONFIRMATION`
    /// regardless of whether this returns anything.
    pub fn on_partner_connection_event(&mut self, nickname_hash: NicknameHash, down: bool) -> Option<Event> {
        let session = self.session.as_mut()?;
        if let Some(active) = session.active.as_mut() {
            if active.peer_nickname_hash == nickname_hash {
                active.partner_down = down;
                return Some(if down {
                    Event::CallParticipantConnectionDown {
                        peer_nickname: active.peer_nickname.clone(),
                    }
                } else {
                    Event::CallParticipantConnectionRestored {
                        peer_nickname: active.peer_nickname.clone(),
                    }
                });
            }
        }
        None
    }

    /// An inbound `USER_LOGOUT`: tears down any of our own call state
    /// that names the departed user, mirroring the server's own
    /// `teardown_user` cascade on the other end of the wire.
    pub fn on_user_logout(&mut self, nickname_hash: NicknameHash) -> Effects {
        let Some(session) = self.session.as_mut() else {
            return Effects::none();
        };
        if let Some(active) = &session.active {
            if active.peer_nickname_hash == nickname_hash {
                let peer_nickname = active.peer_nickname.clone();
                session.active = None;
                return Effects::event(Event::CallEndedByRemote { peer_nickname });
            }
        }
        if let Some(outgoing) = &session.outgoing {
            if outgoing.peer_nickname_hash == nickname_hash {
                let peer_nickname = outgoing.peer_nickname.clone();
                session.outgoing = None;
                return Effects::event(Event::OutgoingCallTimeout {
                    peer_nickname,
                    err: Some(ErrorKind::UnexistingUser),
                });
            }
        }
        if let Some(incoming) = session.incoming.iter().position(|c| c.peer_nickname_hash == nickname_hash) {
            let incoming = session.incoming.remove(incoming);
            return Effects::event(Event::IncomingCallExpired {
                peer_nickname: incoming.peer_nickname,
            });
        }
        Effects::none()
    }

    // ---- Ring timers (§3, §4.5) --------------------------------------------

    /// Checked on the ring-timer thread's tick. Expires an outgoing ring
    /// (or the in-flight lookup ahead of it) and every incoming ring
    /// older than [`callifornia_protocol::constants::RING_TIMEOUT`].
    pub fn expire_stale_rings(&mut self, now: std::time::Instant) -> Effects {
        use callifornia_protocol::constants::RING_TIMEOUT;
        let mut effects = Effects::none();
        let Some(session) = self.session.as_mut() else {
            return effects;
        };

        if let Some(outgoing) = &session.outgoing {
            if now.duration_since(outgoing.started_at) >= RING_TIMEOUT {
                let peer_nickname = outgoing.peer_nickname.clone();
                session.outgoing = None;
                effects.push_event(Event::OutgoingCallTimeout {
                    peer_nickname,
                    err: None,
                });
            }
        }

        let expired: Vec<usize> = session
            .incoming
            .iter()
            .enumerate()
            .filter(|(_, c)| now.duration_since(c.started_at) >= RING_TIMEOUT)
            .map(|(i, _)| i)
            .collect();
        for &index in expired.iter().rev() {
            let incoming = session.incoming.remove(index);
            effects.push_event(Event::IncomingCallExpired {
                peer_nickname: incoming.peer_nickname,
            });
        }

        effects
    }
}
