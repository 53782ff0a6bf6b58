//! Server state and the packet handlers that mutate it atomically (§4.6).
//!
//! Every method here takes `&mut self` and returns the `Outbound`
//! messages to send once the caller has released the lock — mutation and
//! I/O are kept apart so a handler never blocks the single state mutex
//! on a socket write.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use callifornia_protocol::constants::EVICTION_TIMEOUT;
use callifornia_protocol::{messages::*, ErrorKind, NicknameHash, PacketType, Token, Uid};
use callifornia_transport::PingController;

use crate::entities::{Call, PendingCall, User};
use crate::error::ServerError;
use crate::ids::{CallId, IdCounter, PendingCallId};
use crate::outbound::Outbound;

/// All server-owned maps and sets, guarded by one mutex in the caller
/// (see `ServerApp`), per the "single global lock" rule in §5.
#[derive(Default)]
pub struct ServerState {
    users: HashMap<NicknameHash, User>,
    endpoints: HashMap<SocketAddr, NicknameHash>,
    calls: HashMap<CallId, Call>,
    pending_calls: HashMap<PendingCallId, PendingCall>,
    call_ids: IdCounter,
    pending_ids: IdCounter,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, hash: &NicknameHash) -> Option<&User> {
        self.users.get(hash)
    }

    pub fn user_by_endpoint(&self, endpoint: &SocketAddr) -> Option<&User> {
        self.endpoints.get(endpoint).and_then(|hash| self.users.get(hash))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    // ---- AUTHORIZATION ------------------------------------------------

    pub fn authorize(
        &mut self,
        from: SocketAddr,
        msg: Authorization,
        ping: &PingController,
    ) -> Vec<Outbound> {
        if self.users.contains_key(&msg.sender_nickname_hash) {
            return vec![Outbound::json(
                from,
                PacketType::AuthorizationResult,
                &AuthorizationResult {
                    uid: msg.uid,
                    result: false,
                    nickname_hash: msg.sender_nickname_hash,
                    token: None,
                    packet_key: None,
                    encrypted_nickname: None,
                },
            )];
        }

        let token = Token::generate();
        let user = User::new(
            msg.sender_nickname_hash.clone(),
            token.clone(),
            msg.public_key,
            from,
        );
        self.users.insert(msg.sender_nickname_hash.clone(), user);
        self.endpoints.insert(from, msg.sender_nickname_hash.clone());
        ping.track(from);

        vec![Outbound::json(
            from,
            PacketType::AuthorizationResult,
            &AuthorizationResult {
                uid: msg.uid,
                result: true,
                nickname_hash: msg.sender_nickname_hash,
                token: Some(token),
                packet_key: None,
                encrypted_nickname: None,
            },
        )]
    }

    // ---- LOGOUT ---------------------------------------------------------

    /// Acknowledges, then cascades teardown across any call/ring partners
    /// and erases the user from both indices.
    pub fn logout(&mut self, from: SocketAddr, msg: Logout, ping: &PingController) -> Vec<Outbound> {
        let Some(user) = self.users.get(&msg.sender_nickname_hash) else {
            // Double LOGOUT for an already-evicted user is a no-op (§8).
            return vec![Outbound::json(
                from,
                PacketType::Confirmation,
                &Confirmation {
                    uid: msg.uid,
                    receiver_nickname_hash: msg.sender_nickname_hash,
                },
            )];
        };
        if user.endpoint != from {
            return Vec::new();
        }

        let mut outbound = vec![Outbound::json(
            from,
            PacketType::Confirmation,
            &Confirmation {
                uid: msg.uid.clone(),
                receiver_nickname_hash: msg.sender_nickname_hash.clone(),
            },
        )];
        outbound.extend(self.teardown_user(&msg.sender_nickname_hash, PacketType::UserLogout, ping));
        outbound
    }

    /// Shared teardown cascade used by both LOGOUT and eviction: notifies
    /// every related party and erases the user from every index.
    fn teardown_user(
        &mut self,
        hash: &NicknameHash,
        event_type: PacketType,
        ping: &PingController,
    ) -> Vec<Outbound> {
        let Some(user) = self.users.remove(hash) else {
            return Vec::new();
        };
        self.endpoints.remove(&user.endpoint);
        ping.untrack(user.endpoint);

        let mut outbound = Vec::new();

        if let Some(call_id) = user.active_call {
            if let Some(call) = self.calls.remove(&call_id) {
                if let Some(partner_hash) = call.partner_of(hash) {
                    if let Some(partner) = self.users.get_mut(partner_hash) {
                        partner.active_call = None;
                        let uid = Uid::generate();
                        outbound.push(Outbound::json_reliable(
                            partner.endpoint,
                            event_type,
                            uid.clone(),
                            &UserEvent {
                                uid,
                                nickname_hash: hash.clone(),
                            },
                        ));
                    }
                }
            }
        }

        if let Some(pending_id) = user.outgoing_pending {
            if let Some(pending) = self.pending_calls.remove(&pending_id) {
                if let Some(callee) = self.users.get_mut(&pending.callee) {
                    callee.incoming_pending.retain(|&id| id != pending_id);
                    let uid = Uid::generate();
                    outbound.push(Outbound::json_reliable(
                        callee.endpoint,
                        event_type,
                        uid.clone(),
                        &UserEvent {
                            uid,
                            nickname_hash: hash.clone(),
                        },
                    ));
                }
            }
        }

        for pending_id in user.incoming_pending {
            if let Some(pending) = self.pending_calls.remove(&pending_id) {
                if let Some(caller) = self.users.get_mut(&pending.caller) {
                    caller.outgoing_pending = None;
                    let uid = Uid::generate();
                    outbound.push(Outbound::json_reliable(
                        caller.endpoint,
                        event_type,
                        uid.clone(),
                        &UserEvent {
                            uid,
                            nickname_hash: hash.clone(),
                        },
                    ));
                }
            }
        }

        outbound
    }

    // ---- RECONNECT ------------------------------------------------------

    pub fn reconnect(&mut self, from: SocketAddr, msg: Reconnect, ping: &PingController) -> Vec<Outbound> {
        let Some(user) = self.users.get_mut(&msg.sender_nickname_hash) else {
            return vec![Outbound::json(
                from,
                PacketType::ReconnectResult,
                &ReconnectResult {
                    uid: msg.uid,
                    result: false,
                    nickname_hash: msg.sender_nickname_hash,
                    token: msg.token,
                    is_active_call: None,
                    call_partner_nickname_hash: None,
                },
            )];
        };
        if user.token != msg.token {
            return vec![Outbound::json(
                from,
                PacketType::ReconnectResult,
                &ReconnectResult {
                    uid: msg.uid,
                    result: false,
                    nickname_hash: msg.sender_nickname_hash,
                    token: msg.token,
                    is_active_call: None,
                    call_partner_nickname_hash: None,
                },
            )];
        }

        user.down = false;
        user.down_since = None;
        let old_endpoint = user.endpoint;
        user.endpoint = from;
        self.endpoints.remove(&old_endpoint);
        self.endpoints.insert(from, msg.sender_nickname_hash.clone());
        ping.untrack(old_endpoint);
        ping.track(from);

        let active_call = user.active_call;
        let mut outbound = Vec::new();

        let mut is_active_call = false;
        let mut partner_hash = None;
        if let Some(call_id) = active_call {
            if let Some(call) = self.calls.get(&call_id) {
                if let Some(partner) = call.partner_of(&msg.sender_nickname_hash) {
                    is_active_call = true;
                    partner_hash = Some(partner.clone());
                    if let Some(partner_user) = self.users.get(partner) {
                        let uid = Uid::generate();
                        outbound.push(Outbound::json_reliable(
                            partner_user.endpoint,
                            PacketType::ConnectionRestoredWithUser,
                            uid.clone(),
                            &UserEvent {
                                uid,
                                nickname_hash: msg.sender_nickname_hash.clone(),
                            },
                        ));
                    }
                }
            }
        }

        outbound.push(Outbound::json(
            from,
            PacketType::ReconnectResult,
            &ReconnectResult {
                uid: msg.uid,
                result: true,
                nickname_hash: msg.sender_nickname_hash,
                token: msg.token,
                is_active_call: Some(is_active_call),
                call_partner_nickname_hash: partner_hash,
            },
        ));
        outbound
    }

    // ---- GET_USER_INFO --------------------------------------------------

    pub fn get_user_info(&self, from: SocketAddr, msg: GetUserInfo) -> Vec<Outbound> {
        let result = self.users.get(&msg.nickname_hash).map(|user| GetUserInfoResult {
            uid: msg.uid.clone(),
            result: true,
            nickname_hash: msg.nickname_hash.clone(),
            public_key: Some(user.public_key_pem.clone()),
        });
        let body = result.unwrap_or(GetUserInfoResult {
            uid: msg.uid,
            result: false,
            nickname_hash: msg.nickname_hash,
            public_key: None,
        });
        vec![Outbound::json(from, PacketType::GetUserInfoResult, &body)]
    }

    // ---- Calling lifecycle ----------------------------------------------

    /// `CALLING_BEGIN`: both parties must be known and free. The caller's
    /// envelope is opaque to the server; it is forwarded verbatim.
    pub fn start_outgoing_call(
        &mut self,
        raw_body: Vec<u8>,
        envelope: &CallEnvelope,
    ) -> Result<Vec<Outbound>, ServerError> {
        let caller_hash = envelope.sender_nickname_hash.clone();
        let callee_hash = envelope.receiver_nickname_hash.clone();

        let caller_free = self.users.get(&caller_hash).map(User::is_free).unwrap_or(false);
        if !caller_free || !self.users.contains_key(&callee_hash) {
            return Ok(Vec::new());
        }

        let id = PendingCallId(self.pending_ids.next());
        self.pending_calls.insert(
            id,
            PendingCall {
                id,
                caller: caller_hash.clone(),
                callee: callee_hash.clone(),
                started_at: Instant::now(),
            },
        );
        let caller = self.users.get_mut(&caller_hash).expect("checked above");
        caller.outgoing_pending = Some(id);
        let callee = self.users.get_mut(&callee_hash).expect("checked above");
        callee.incoming_pending.push(id);
        let callee_endpoint = callee.endpoint;
        let callee_down = callee.down;

        if callee_down {
            return Ok(Vec::new());
        }
        Ok(vec![Outbound::raw(callee_endpoint, PacketType::CallingBegin, raw_body)])
    }

    /// `CALLING_END` / `CALL_DECLINE`: locate the pending call named by
    /// `parties`, erase it from both users, forward the original packet.
    pub fn end_pending_call(
        &mut self,
        raw_body: Vec<u8>,
        packet_type: PacketType,
        parties: &TwoParties,
    ) -> Vec<Outbound> {
        let Some((id, _, target_endpoint)) =
            self.find_pending_between(&parties.sender_nickname_hash, &parties.receiver_nickname_hash)
        else {
            return Vec::new();
        };
        self.remove_pending_call(id);
        vec![Outbound::raw(target_endpoint, packet_type, raw_body)]
    }

    /// `CALL_ACCEPT`: replaces the pending call with an established
    /// `Call` on both sides, forwards the accepter's envelope to the
    /// initiator.
    pub fn accept_call(
        &mut self,
        raw_body: Vec<u8>,
        envelope: &CallEnvelope,
    ) -> Vec<Outbound> {
        // The accepter is `envelope.sender_nickname_hash`; the original
        // caller is `envelope.receiver_nickname_hash`.
        let accepter_hash = envelope.sender_nickname_hash.clone();
        let caller_hash = envelope.receiver_nickname_hash.clone();

        let Some((id, _, _)) = self.find_pending_between(&caller_hash, &accepter_hash) else {
            return Vec::new();
        };

        let mut outbound = Vec::new();

        // Accepting while already in a call ends the previous call first.
        if let Some(existing_call) = self.users.get(&accepter_hash).and_then(|u| u.active_call) {
            outbound.extend(self.force_end_call(existing_call));
        }
        // Accepting while ringing someone else cancels that outgoing ring.
        if let Some(outgoing_id) = self.users.get(&accepter_hash).and_then(|u| u.outgoing_pending) {
            if outgoing_id != id {
                outbound.extend(self.cancel_outgoing(outgoing_id));
            }
        }
        // Accepting while also ringing others declines every other
        // incoming ring (§9 open question: flagged DeclinedBusy so UIs
        // can tell this apart from a plain decline).
        outbound.extend(self.decline_other_incoming(&accepter_hash, id));

        self.remove_pending_call(id);
        let call_id = CallId(self.call_ids.next());
        self.calls.insert(
            call_id,
            Call {
                id: call_id,
                a: caller_hash.clone(),
                b: accepter_hash.clone(),
            },
        );
        if let Some(user) = self.users.get_mut(&caller_hash) {
            user.active_call = Some(call_id);
        }
        let caller_endpoint = self.users.get_mut(&accepter_hash).map(|u| {
            u.active_call = Some(call_id);
        });
        let _ = caller_endpoint;

        if let Some(caller) = self.users.get(&caller_hash) {
            outbound.push(Outbound::raw(caller.endpoint, PacketType::CallAccept, raw_body));
        }
        outbound
    }

    /// `CALL_END`: if both sides are in the named call, erase it and
    /// forward the hangup.
    pub fn end_call(&mut self, raw_body: Vec<u8>, parties: &TwoParties) -> Vec<Outbound> {
        let Some(call_id) = self
            .users
            .get(&parties.sender_nickname_hash)
            .and_then(|u| u.active_call)
        else {
            return Vec::new();
        };
        let Some(call) = self.calls.get(&call_id) else {
            return Vec::new();
        };
        if call.partner_of(&parties.sender_nickname_hash) != Some(&parties.receiver_nickname_hash) {
            return Vec::new();
        }

        self.calls.remove(&call_id);
        for hash in [&parties.sender_nickname_hash, &parties.receiver_nickname_hash] {
            if let Some(user) = self.users.get_mut(hash) {
                user.active_call = None;
            }
        }

        let Some(partner) = self.users.get(&parties.receiver_nickname_hash) else {
            return Vec::new();
        };
        vec![Outbound::raw(partner.endpoint, PacketType::CallEnd, raw_body)]
    }

    // ---- Media relay (§4.8) ---------------------------------------------

    /// O(1) hot path: look up the sender's active-call partner and
    /// forward the bytes verbatim with the same `packet_type`. Silently
    /// dropped if the sender is unauthorised, not in a call, or the
    /// partner is connection-down.
    pub fn relay_media(
        &self,
        from: SocketAddr,
        packet_type: PacketType,
        payload: Vec<u8>,
    ) -> Option<Outbound> {
        let sender_hash = self.endpoints.get(&from)?;
        let sender = self.users.get(sender_hash)?;
        let call = self.calls.get(&sender.active_call?)?;
        let partner_hash = call.partner_of(sender_hash)?;
        let partner = self.users.get(partner_hash)?;
        if partner.down {
            return None;
        }
        Some(Outbound::raw(partner.endpoint, packet_type, payload))
    }

    // ---- Ping controller integration ------------------------------------

    /// The ping controller declared `endpoint` down: mark the user down
    /// and notify every related party.
    pub fn on_connection_down(&mut self, endpoint: SocketAddr) -> Vec<Outbound> {
        let Some(hash) = self.endpoints.get(&endpoint).cloned() else {
            return Vec::new();
        };
        if let Some(user) = self.users.get_mut(&hash) {
            user.down = true;
            user.down_since = Some(Instant::now());
        }

        let mut outbound = Vec::new();
        let related_hashes = self.related_party_hashes(&hash);
        for partner_hash in related_hashes {
            if let Some(partner) = self.users.get(&partner_hash) {
                let uid = Uid::generate();
                outbound.push(Outbound::json_reliable(
                    partner.endpoint,
                    PacketType::ConnectionDownWithUser,
                    uid.clone(),
                    &UserEvent {
                        uid,
                        nickname_hash: hash.clone(),
                    },
                ));
            }
        }
        outbound
    }

    fn related_party_hashes(&self, hash: &NicknameHash) -> Vec<NicknameHash> {
        let Some(user) = self.users.get(hash) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(call_id) = user.active_call {
            if let Some(call) = self.calls.get(&call_id) {
                if let Some(partner) = call.partner_of(hash) {
                    out.push(partner.clone());
                }
            }
        }
        if let Some(pending_id) = user.outgoing_pending {
            if let Some(pending) = self.pending_calls.get(&pending_id) {
                out.push(pending.callee.clone());
            }
        }
        for pending_id in &user.incoming_pending {
            if let Some(pending) = self.pending_calls.get(pending_id) {
                out.push(pending.caller.clone());
            }
        }
        out
    }

    /// Reconnection timer check: evicts every user whose connection has
    /// been down longer than [`EVICTION_TIMEOUT`] (§4.6).
    pub fn evict_expired(&mut self, now: Instant, ping: &PingController) -> Vec<Outbound> {
        let expired: Vec<NicknameHash> = self
            .users
            .iter()
            .filter_map(|(hash, user)| {
                let since = user.down_since?;
                (now.duration_since(since) >= EVICTION_TIMEOUT).then(|| hash.clone())
            })
            .collect();

        let mut outbound = Vec::new();
        for hash in expired {
            outbound.extend(self.teardown_user(&hash, PacketType::UserLogout, ping));
        }
        outbound
    }

    // ---- internals --------------------------------------------------------

    fn find_pending_between(
        &self,
        a: &NicknameHash,
        b: &NicknameHash,
    ) -> Option<(PendingCallId, NicknameHash, SocketAddr)> {
        self.pending_calls.values().find_map(|pending| {
            let target_hash = if &pending.caller == a && &pending.callee == b {
                &pending.callee
            } else if &pending.caller == b && &pending.callee == a {
                &pending.caller
            } else {
                return None;
            };
            let endpoint = self.users.get(target_hash)?.endpoint;
            Some((pending.id, target_hash.clone(), endpoint))
        })
    }

    fn remove_pending_call(&mut self, id: PendingCallId) {
        if let Some(pending) = self.pending_calls.remove(&id) {
            if let Some(caller) = self.users.get_mut(&pending.caller) {
                if caller.outgoing_pending == Some(id) {
                    caller.outgoing_pending = None;
                }
            }
            if let Some(callee) = self.users.get_mut(&pending.callee) {
                callee.incoming_pending.retain(|&pid| pid != id);
            }
        }
    }

    /// Cancels the accepter's own outgoing ring when they accept someone
    /// else's call instead (§4.5): removes the pending call and tells the
    /// peer being rung it's over, as if the accepter had sent `CALLING_END`.
    fn cancel_outgoing(&mut self, outgoing_id: PendingCallId) -> Vec<Outbound> {
        let Some(pending) = self.pending_calls.get(&outgoing_id) else {
            return Vec::new();
        };
        let caller_hash = pending.caller.clone();
        let callee_hash = pending.callee.clone();
        self.remove_pending_call(outgoing_id);

        let Some(callee) = self.users.get(&callee_hash) else {
            return Vec::new();
        };
        vec![Outbound::json(
            callee.endpoint,
            PacketType::CallingEnd,
            &TwoParties {
                sender_nickname_hash: caller_hash,
                receiver_nickname_hash: callee_hash,
            },
        )]
    }

    fn force_end_call(&mut self, call_id: CallId) -> Vec<Outbound> {
        let Some(call) = self.calls.remove(&call_id) else {
            return Vec::new();
        };
        let mut outbound = Vec::new();
        for (hash, partner_hash) in [(&call.a, &call.b), (&call.b, &call.a)] {
            if let Some(user) = self.users.get_mut(hash) {
                user.active_call = None;
            }
            if let Some(partner) = self.users.get(partner_hash) {
                outbound.push(Outbound::json(
                    partner.endpoint,
                    PacketType::CallEnd,
                    &TwoParties {
                        sender_nickname_hash: hash.clone(),
                        receiver_nickname_hash: partner_hash.clone(),
                    },
                ));
            }
        }
        outbound
    }

    fn decline_other_incoming(&mut self, accepter: &NicknameHash, accepted_id: PendingCallId) -> Vec<Outbound> {
        let Some(user) = self.users.get(accepter) else {
            return Vec::new();
        };
        let others: Vec<PendingCallId> = user
            .incoming_pending
            .iter()
            .copied()
            .filter(|&id| id != accepted_id)
            .collect();

        let mut outbound = Vec::new();
        for id in others {
            if let Some(pending) = self.pending_calls.remove(&id) {
                if let Some(caller) = self.users.get_mut(&pending.caller) {
                    caller.outgoing_pending = None;
                    outbound.push(Outbound::json(
                        caller.endpoint,
                        PacketType::CallDecline,
                        &CallDecline {
                            sender_nickname_hash: accepter.clone(),
                            receiver_nickname_hash: pending.caller.clone(),
                            kind: Some(ErrorKind::DeclinedBusy),
                        },
                    ));
                }
            }
        }
        if let Some(user) = self.users.get_mut(accepter) {
            user.incoming_pending.retain(|&id| id == accepted_id);
        }
        outbound
    }
}
