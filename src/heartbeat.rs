use std::time::{Duration, Instant};

pub const PING_INTERVAL: Duration = Duration::from_secs(5);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness bookkeeping for one socket: each pong pushes the deadline out,
/// and a session whose deadline has passed is torn down.
pub struct HeartbeatState {
    deadline: Instant,
}

impl HeartbeatState {
    pub fn new() -> Self {
        Self {
            deadline: Instant::now() + PONG_TIMEOUT,
        }
    }

    pub fn record_pong(&mut self) {
        self.deadline = Instant::now() + PONG_TIMEOUT;
    }

    pub fn is_alive(&self) -> bool {
        Instant::now() < self.deadline
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}
