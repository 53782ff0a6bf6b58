//! Per-endpoint heartbeat scheduler (§4.2).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use callifornia_protocol::constants::{
    PING_CHECK_INTERVAL, PING_FAILURE_THRESHOLD, PING_INTERVAL, PING_SCHEDULER_TICK,
};

#[derive(Debug, Default)]
struct EndpointState {
    last_pong_received: bool,
    consecutive_failures: u32,
    connection_error: bool,
}

/// Sends pings on a fixed cadence and declares endpoints down/restored
/// according to the rule in §4.2: down after 4 consecutive missed
/// 1-second checks, restored on the first pong received while down.
pub struct PingController {
    endpoints: Arc<Mutex<HashMap<SocketAddr, EndpointState>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PingController {
    /// Spawns the scheduler thread. `send_ping` is called once per
    /// tracked endpoint every 500 ms; `on_down`/`on_restored` fire on the
    /// edges described in §4.2.
    pub fn spawn<SendPing, OnDown, OnRestored>(
        send_ping: SendPing,
        on_down: OnDown,
        on_restored: OnRestored,
    ) -> Self
    where
        SendPing: Fn(SocketAddr) + Send + 'static,
        OnDown: Fn(SocketAddr) + Send + 'static,
        OnRestored: Fn(SocketAddr) + Send + 'static,
    {
        let endpoints: Arc<Mutex<HashMap<SocketAddr, EndpointState>>> = Arc::default();
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let endpoints = Arc::clone(&endpoints);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("callifornia-ping".into())
                .spawn(move || {
                    let mut last_ping = Instant::now();
                    let mut last_check = Instant::now();
                    while running.load(Ordering::Acquire) {
                        std::thread::sleep(PING_SCHEDULER_TICK);
                        if !running.load(Ordering::Acquire) {
                            break;
                        }

                        let now = Instant::now();
                        if now.duration_since(last_ping) >= PING_INTERVAL {
                            last_ping = now;
                            let targets: Vec<SocketAddr> = {
                                let mut guard = endpoints.lock();
                                for state in guard.values_mut() {
                                    state.last_pong_received = false;
                                }
                                guard.keys().copied().collect()
                            };
                            for endpoint in targets {
                                send_ping(endpoint);
                            }
                        }

                        if now.duration_since(last_check) >= PING_CHECK_INTERVAL {
                            last_check = now;
                            let (became_down, became_restored) = {
                                let mut guard = endpoints.lock();
                                let mut became_down = Vec::new();
                                let mut became_restored = Vec::new();
                                for (&endpoint, state) in guard.iter_mut() {
                                    if state.last_pong_received {
                                        state.consecutive_failures = 0;
                                        if state.connection_error {
                                            state.connection_error = false;
                                            became_restored.push(endpoint);
                                        }
                                    } else {
                                        state.consecutive_failures += 1;
                                        if state.consecutive_failures >= PING_FAILURE_THRESHOLD
                                            && !state.connection_error
                                        {
                                            state.connection_error = true;
                                            became_down.push(endpoint);
                                        }
                                    }
                                }
                                (became_down, became_restored)
                            };
                            for endpoint in became_down {
                                on_down(endpoint);
                            }
                            for endpoint in became_restored {
                                on_restored(endpoint);
                            }
                        }
                    }
                })
                .expect("failed to spawn ping scheduler thread")
        };

        Self {
            endpoints,
            running,
            handle: Some(handle),
        }
    }

    /// Starts tracking an endpoint. No-op if already tracked.
    pub fn track(&self, endpoint: SocketAddr) {
        self.endpoints.lock().entry(endpoint).or_default();
    }

    /// Stops tracking an endpoint, e.g. on logout.
    pub fn untrack(&self, endpoint: SocketAddr) {
        self.endpoints.lock().remove(&endpoint);
    }

    /// Records a pong from `endpoint`. Ignored for untracked endpoints.
    pub fn record_pong(&self, endpoint: SocketAddr) {
        if let Some(state) = self.endpoints.lock().get_mut(&endpoint) {
            state.last_pong_received = true;
        }
    }

    pub fn is_tracked(&self, endpoint: SocketAddr) -> bool {
        self.endpoints.lock().contains_key(&endpoint)
    }
}

impl Drop for PingController {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn endpoint() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn declares_down_after_four_missed_checks_and_restored_on_next_pong() {
        let (down_tx, down_rx) = mpsc::channel();
        let (restored_tx, restored_rx) = mpsc::channel();

        let controller = PingController::spawn(
            |_| {},
            move |ep| down_tx.send(ep).unwrap(),
            move |ep| restored_tx.send(ep).unwrap(),
        );
        controller.track(endpoint());

        let down = down_rx
            .recv_timeout(Duration::from_secs(6))
            .expect("endpoint should be declared down within ~4s");
        assert_eq!(down, endpoint());

        controller.record_pong(endpoint());
        let restored = restored_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("endpoint should be restored on next check after a pong");
        assert_eq!(restored, endpoint());
    }

    #[test]
    fn untracked_endpoint_never_fires_callbacks() {
        let (down_tx, down_rx) = mpsc::channel();
        let controller = PingController::spawn(|_| {}, move |ep| down_tx.send(ep).unwrap(), |_| {});
        controller.track(endpoint());
        controller.untrack(endpoint());
        assert!(down_rx.recv_timeout(Duration::from_secs(2)).is_err());
    }
}
