//! Shared timing and sizing constants pinned down by §3, §4, and §8.

use std::time::Duration;

/// Ring timer for incoming/outgoing calls (§3, §4.5).
pub const RING_TIMEOUT: Duration = Duration::from_secs(32);

/// Reconnection grace period before a `User` is evicted (§4.6).
pub const EVICTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Ping controller: ping cadence (§4.2).
pub const PING_INTERVAL: Duration = Duration::from_millis(500);
/// Ping controller: liveness check cadence (§4.2).
pub const PING_CHECK_INTERVAL: Duration = Duration::from_millis(1000);
/// Ping controller: scheduler tick (§4.2).
pub const PING_SCHEDULER_TICK: Duration = Duration::from_millis(100);
/// Ping controller: consecutive missed checks before declaring a connection down (§4.2, §8).
pub const PING_FAILURE_THRESHOLD: u32 = 4;

/// Reliable-request manager: default retry period (§4.3).
pub const RELIABLE_REQUEST_PERIOD: Duration = Duration::from_millis(1500);
/// Reliable-request manager: default attempt budget for routine notifications (§4.3).
pub const RELIABLE_REQUEST_DEFAULT_ATTEMPTS: u32 = 3;
/// Reliable-request manager: attempt budget used for call-lifecycle notifications
/// in the original server (`CONNECTION_DOWN_WITH_USER`, `USER_LOGOUT`, ...).
pub const RELIABLE_REQUEST_CALL_ATTEMPTS: u32 = 5;

/// Datagram transport: max reassembly records kept per remote endpoint (§4.1, §8).
pub const MAX_REASSEMBLY_RECORDS_PER_ENDPOINT: usize = 8;
/// Datagram transport: age at which an incomplete reassembly record is pruned (§4.1).
pub const REASSEMBLY_RECORD_TTL: Duration = Duration::from_secs(3);

/// Largest signalling message the protocol will reassemble (§4.1).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
/// Upper bound on `total_chunks` a fragment header may declare, derived from
/// `MAX_MESSAGE_SIZE / MAX_CHUNK_SIZE`. A header claiming more than this is
/// rejected outright rather than used to pre-size a reassembly buffer (§8,
/// §9): it can only be a spoofed or corrupt packet_id.
pub const MAX_CHUNKS_PER_MESSAGE: u16 = MAX_MESSAGE_SIZE.div_ceil(crate::frame::MAX_CHUNK_SIZE) as u16;

/// Establishment/reconnection service: retry interval while connection is down (§4.9).
pub const RECONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(2);
/// Establishment/reconnection service: idle poll interval while connection is up (§4.9).
pub const RECONNECT_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bound on how long `stop()` may take to cancel I/O and join worker threads (§5).
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_millis(500);
