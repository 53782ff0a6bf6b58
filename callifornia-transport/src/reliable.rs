//! Application-layer retry-until-ack for signalling messages (§4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use callifornia_protocol::Uid;

struct Task {
    send_fn: Box<dyn Fn() + Send>,
    on_success: Box<dyn FnOnce() + Send>,
    on_failure: Box<dyn FnOnce() + Send>,
    period: Duration,
    max_attempts: u32,
    attempts: u32,
    last_sent: Instant,
}

/// Tracks outstanding requests by `uid` and resends `send_fn` every
/// `period` until a handler calls [`complete`](ReliableRequestManager::complete)
/// or `max_attempts` is exhausted. Not a general retransmission buffer —
/// periods are short (~1.5s) and budgets small (3-5 attempts), meant as a
/// presence/notification safety net per §4.3.
pub struct ReliableRequestManager {
    tasks: Arc<Mutex<HashMap<Uid, Task>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReliableRequestManager {
    pub fn spawn(tick: Duration) -> Self {
        let tasks: Arc<Mutex<HashMap<Uid, Task>>> = Arc::default();
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let tasks = Arc::clone(&tasks);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("callifornia-reliable".into())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        std::thread::sleep(tick);
                        if !running.load(Ordering::Acquire) {
                            break;
                        }

                        let now = Instant::now();
                        let expired: Vec<Uid> = {
                            let mut guard = tasks.lock();
                            let mut expired = Vec::new();
                            for (uid, task) in guard.iter_mut() {
                                if now.duration_since(task.last_sent) < task.period {
                                    continue;
                                }
                                if task.attempts >= task.max_attempts {
                                    expired.push(uid.clone());
                                    continue;
                                }
                                task.attempts += 1;
                                task.last_sent = now;
                                (task.send_fn)();
                            }
                            expired
                        };

                        let mut guard = tasks.lock();
                        for uid in expired {
                            if let Some(task) = guard.remove(&uid) {
                                (task.on_failure)();
                            }
                        }
                    }
                })
                .expect("failed to spawn reliable-request thread")
        };

        Self {
            tasks,
            running,
            handle: Some(handle),
        }
    }

    /// Registers a new task and fires `send_fn` immediately. The `uid`
    /// must be unique; a collision is logged and the duplicate discarded
    /// per §4.3.
    pub fn start<SendFn, OnSuccess, OnFailure>(
        &self,
        uid: Uid,
        period: Duration,
        max_attempts: u32,
        send_fn: SendFn,
        on_success: OnSuccess,
        on_failure: OnFailure,
    ) where
        SendFn: Fn() + Send + 'static,
        OnSuccess: FnOnce() + Send + 'static,
        OnFailure: FnOnce() + Send + 'static,
    {
        let mut guard = self.tasks.lock();
        if guard.contains_key(&uid) {
            tracing::warn!(%uid, "reliable request uid collision, discarding duplicate");
            return;
        }
        send_fn();
        guard.insert(
            uid,
            Task {
                send_fn: Box::new(send_fn),
                on_success: Box::new(on_success),
                on_failure: Box::new(on_failure),
                period,
                max_attempts,
                attempts: 1,
                last_sent: Instant::now(),
            },
        );
    }

    /// Completes a task, firing its `on_success` callback. A no-op if the
    /// uid is unknown (already completed, failed, or never registered).
    pub fn complete(&self, uid: &Uid) {
        let task = self.tasks.lock().remove(uid);
        if let Some(task) = task {
            (task.on_success)();
        }
    }

    pub fn is_pending(&self, uid: &Uid) -> bool {
        self.tasks.lock().contains_key(uid)
    }
}

impl Drop for ReliableRequestManager {
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

    #[test]
    fn completes_on_ack_before_max_attempts() {
        let manager = ReliableRequestManager::spawn(Duration::from_millis(20));
        let (success_tx, success_rx) = mpsc::channel();
        let (send_tx, send_rx) = mpsc::channel();

        let uid = Uid::generate();
        manager.start(
            uid.clone(),
            Duration::from_millis(50),
            5,
            move || send_tx.send(()).unwrap(),
            move || success_tx.send(()).unwrap(),
            || panic!("on_failure should not fire"),
        );

        send_rx
            .recv_timeout(Duration::from_millis(200))
            .expect("send_fn should fire immediately on start");

        manager.complete(&uid);
        success_rx
            .recv_timeout(Duration::from_millis(200))
            .expect("on_success should fire once complete() is called");
        assert!(!manager.is_pending(&uid));
    }

    #[test]
    fn fails_after_max_attempts_exhausted() {
        let manager = ReliableRequestManager::spawn(Duration::from_millis(10));
        let (failure_tx, failure_rx) = mpsc::channel();
        let attempts = Arc::new(Mutex::new(0u32));

        let uid = Uid::generate();
        let attempts_clone = Arc::clone(&attempts);
        manager.start(
            uid.clone(),
            Duration::from_millis(30),
            3,
            move || *attempts_clone.lock() += 1,
            || panic!("on_success should not fire"),
            move || failure_tx.send(()).unwrap(),
        );

        failure_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("on_failure should fire once attempts are exhausted");
        assert_eq!(*attempts.lock(), 3);
    }

    #[test]
    fn duplicate_uid_is_discarded() {
        let manager = ReliableRequestManager::spawn(Duration::from_millis(20));
        let uid = Uid::generate();
        let (tx1, rx1) = mpsc::channel();
        manager.start(
            uid.clone(),
            Duration::from_millis(100),
            3,
            move || tx1.send(()).unwrap(),
            || {},
            || {},
        );
        rx1.recv_timeout(Duration::from_millis(200)).unwrap();

        let (tx2, rx2) = mpsc::channel::<()>();
        manager.start(
            uid.clone(),
            Duration::from_millis(100),
            3,
            move || tx2.send(()).unwrap(),
            || panic!("duplicate on_success should not fire"),
            || panic!("duplicate on_failure should not fire"),
        );
        assert!(rx2.recv_timeout(Duration::from_millis(100)).is_err());
        manager.complete(&uid);
    }
}
