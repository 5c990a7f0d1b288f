//! Single-shot deadline timers.
//!
//! Timers hold no task of their own. The owner restarts them, polls them
//! with the current time, and asks for the next deadline to sleep until.

use std::time::{Duration, Instant};

/// A restartable single-shot timer.
///
/// Restarting before expiry pushes the deadline back (debounce). Once a
/// timer fires it stays disarmed until restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimer {
    period: Duration,
    deadline: Option<Instant>,
}

impl IdleTimer {
    /// Create a disarmed timer.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    /// The timer period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm the timer to fire one period after `now`.
    pub fn restart(&mut self, now: Instant) {
        self.deadline = Some(now + self.period);
    }

    /// Disarm the timer.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// Check if the timer is armed.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The instant the timer fires at, if armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once when `now` has reached the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_at_deadline() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(Duration::from_millis(500));
        assert!(!timer.poll(start + Duration::from_secs(10)));

        timer.restart(start);
        assert!(!timer.poll(start + Duration::from_millis(499)));
        assert!(timer.poll(start + Duration::from_millis(500)));
        assert!(!timer.poll(start + Duration::from_millis(501)));
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_restart_debounces() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(Duration::from_millis(500));
        timer.restart(start);
        timer.restart(start + Duration::from_millis(400));

        assert!(!timer.poll(start + Duration::from_millis(600)));
        assert_eq!(
            timer.next_deadline(),
            Some(start + Duration::from_millis(900))
        );
        assert!(timer.poll(start + Duration::from_millis(900)));
    }

    #[test]
    fn test_stop() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(Duration::from_millis(10));
        timer.restart(start);
        timer.stop();
        assert_eq!(timer.next_deadline(), None);
        assert!(!timer.poll(start + Duration::from_secs(1)));
    }
}
