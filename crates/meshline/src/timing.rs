use std::time::{Duration, Instant};

/// Fires at most once per `interval`, tracked from the last time it fired.
/// Used for the liveness probe tick and the client reconnect delay.
#[derive(Debug)]
pub struct Repeater {
    interval: Duration,
    last_fired: Instant,
}

impl Repeater {
    pub fn every(interval: Duration) -> Self {
        // Constructed already-due so the very first `fired()` check after
        // startup fires immediately.
        Self { interval, last_fired: Instant::now() - interval }
    }

    pub fn fired(&mut self) -> bool {
        if self.last_fired.elapsed() >= self.interval {
            self.last_fired = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn force_fire(&mut self) {
        self.last_fired = Instant::now() - self.interval;
    }

    pub fn reset(&mut self) {
        self.last_fired = Instant::now();
    }

    /// Duration remaining until this repeater is next due; `Duration::ZERO`
    /// if already due. Used to size a bounded `poll` timeout.
    pub fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.last_fired.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_immediately_then_waits_out_the_interval() {
        let mut repeater = Repeater::every(Duration::from_millis(20));
        assert!(repeater.fired());
        assert!(!repeater.fired());
        std::thread::sleep(Duration::from_millis(25));
        assert!(repeater.fired());
    }
}
