//! Per-connection state for a control session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// One open control connection, shared between its session loop and the
/// [`SessionTracker`](super::tracker::SessionTracker).
pub struct ControlConnection {
    /// Connection ID (`ctl_<uuid>`).
    pub id: String,
    opened_at: Instant,
    alive: AtomicBool,
    last_pong: Mutex<Instant>,
}

impl ControlConnection {
    /// State for a freshly upgraded socket.
    pub fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            opened_at: now,
            alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
        }
    }

    /// Record a pong (or ping) from the peer.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Take the alive flag, clearing it for the next heartbeat round.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong, or since the connection opened.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Whether a peer that missed the last heartbeat round has been silent
    /// for longer than `timeout`.
    pub fn is_unresponsive(&self, timeout: Duration) -> bool {
        !self.check_alive() && self.last_pong_elapsed() > timeout
    }

    /// Time since the connection opened.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}
