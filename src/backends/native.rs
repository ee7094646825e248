use std::time::{Duration, Instant};

/// One-shot deadline used to debounce tree cache rebuilds.
///
/// Re-arming with `reset` replaces the prior deadline, so only a single
/// pending rebuild can exist per timer.
#[derive(Debug)]
pub struct Timer {
    duration: Duration,
    last: Instant,
}

impl Timer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last: Instant::now(),
        }
    }

    /// Has the deadline elapsed?
    pub fn ringing(&self) -> bool {
        self.last.elapsed() >= self.duration
    }

    /// Re-arm from now, keeping the configured duration.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Re-arm from now with a new duration.
    pub fn reset_with(&mut self, duration: Duration) {
        self.duration = duration;
        self.last = Instant::now();
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_rings_immediately() {
        let timer = Timer::new(Duration::from_millis(0));
        assert!(timer.ringing());
    }

    #[test]
    fn reset_with_replaces_duration() {
        let mut timer = Timer::new(Duration::from_millis(0));
        timer.reset_with(Duration::from_secs(60));
        assert!(!timer.ringing());
        assert_eq!(timer.duration(), Duration::from_secs(60));
    }
}
