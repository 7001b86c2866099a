//! Minimum inter-tick interval, independent of the callback cadence.

use std::time::{Duration, Instant};

/// Used for target rates at or below 0.1 fps (and non-finite ones).
const MAX_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TickThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl TickThrottle {
    pub fn from_fps(target_fps: f32) -> Self {
        let interval = if target_fps.is_finite() && target_fps > 0.1 {
            Duration::from_secs_f64(1.0 / target_fps as f64)
        } else {
            MAX_INTERVAL
        };
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True when a tick should run at `now`; records `now` as the last
    /// worked tick. The first call after construction or `reset` always ticks.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_callbacks_inside_interval() {
        let mut throttle = TickThrottle::from_fps(20.0);
        assert_eq!(throttle.interval(), Duration::from_millis(50));

        let t0 = Instant::now();
        assert!(throttle.ready(t0));
        assert!(!throttle.ready(t0 + Duration::from_millis(16)));
        assert!(!throttle.ready(t0 + Duration::from_millis(49)));
        assert!(throttle.ready(t0 + Duration::from_millis(50)));
        // The interval is measured from the last worked tick, not the last callback.
        assert!(!throttle.ready(t0 + Duration::from_millis(66)));
        assert!(throttle.ready(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn degenerate_rates_are_clamped() {
        assert_eq!(TickThrottle::from_fps(0.0).interval(), Duration::from_secs(10));
        assert_eq!(TickThrottle::from_fps(f32::NAN).interval(), Duration::from_secs(10));
    }
}
