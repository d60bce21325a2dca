use std::time::Duration;

/// Backoff policy for reconnection attempts.
///
/// The delay is currently constant; the attempt counter is tracked so an
/// exponential policy can be slotted in without changing callers.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    attempt: u32,
    base_delay: Duration,
}

impl ReconnectController {
    /// Create a controller with the given base delay
    pub fn new(base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            base_delay,
        }
    }

    /// Register another attempt and return how long to wait before it
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.base_delay
    }

    /// Forget previous attempts after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
