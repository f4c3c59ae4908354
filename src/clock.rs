use crossbeam::channel::{self, Receiver};
use std::time::{Duration, Instant};

/// Periodic tick source bounding how long a partial batch waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    interval: Duration,
}

impl Clock {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start a tick stream; the first tick arrives one interval from now
    ///
    /// Every worker owns its own stream, so each partial batch is offered to
    /// the output queue at least once per interval regardless of worker count.
    pub fn ticker(&self) -> Receiver<Instant> {
        channel::tick(self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_spaced_by_interval() {
        let clock = Clock::new(Duration::from_millis(20));
        let start = Instant::now();
        let ticker = clock.ticker();
        ticker.recv().unwrap();
        ticker.recv().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
