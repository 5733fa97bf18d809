//! Countdown timer driving retransmissions.
//!
//! The engine never samples a clock; the caller reports elapsed time as
//! millisecond deltas and the timer counts them down. One timer serves a
//! whole sender: it runs for the earliest outstanding segment and is
//! restarted, with a doubled period when backing off, after every expiry
//! or acknowledgment of new data (RFC 6298 5).

/// A single retransmission countdown.
#[derive(Debug, Default)]
pub struct RetransmissionTimer {
    /// Whether the countdown is running.
    active: bool,
    /// Milliseconds left before expiry.
    alarm_ms: u64,
    /// Period the countdown was last started with.
    period_ms: u64,
}

impl RetransmissionTimer {
    /// Creates an inactive timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the countdown at `period_ms`.
    pub fn start(&mut self, period_ms: u64) {
        self.active = true;
        self.period_ms = period_ms;
        self.alarm_ms = period_ms;
    }

    /// Stops the countdown without firing.
    pub fn stop(&mut self) {
        self.active = false;
        self.alarm_ms = 0;
    }

    /// Advances the countdown by `ms`, returning `true` when it fires.
    /// A fired timer is inactive until restarted. Inactive timers ignore
    /// ticks.
    pub fn tick(&mut self, ms: u64) -> bool {
        if !self.active {
            return false;
        }

        if self.alarm_ms > ms {
            self.alarm_ms -= ms;
            return false;
        }

        self.alarm_ms = 0;
        self.active = false;
        true
    }

    /// Returns whether the countdown is running.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Period the countdown was last started with.
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }
}
