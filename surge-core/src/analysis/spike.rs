//! Edge-triggered spike detector with a wall-clock cooldown.
//!
//! ## Algorithm
//!
//! A spike fires iff
//! - the score reaches the threshold,
//! - no spike fired in the last `cooldown_ms` (wall clock), and
//! - the caller has not suppressed this tick (voice gate on audio).
//!
//! Firing records the timestamp and raises a pulse that clears `pulse_ms`
//! later regardless of where the score goes, so collaborators see a single
//! rising edge per spike rather than a level.

/// Outcome of evaluating one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpikeDecision {
    /// A new spike fired on this tick.
    pub fired: bool,
    /// The score was over threshold and outside cooldown, but the tick was suppressed.
    pub suppressed: bool,
    /// Current state of the pulse flag.
    pub pulse_active: bool,
}

#[derive(Debug, Clone)]
pub struct SpikeDetector {
    threshold: f32,
    cooldown_ms: i64,
    pulse_ms: i64,
    last_spike_at_ms: Option<i64>,
    pulse_active: bool,
}

impl SpikeDetector {
    pub fn new(threshold: f32, cooldown_ms: i64, pulse_ms: i64) -> Self {
        Self {
            threshold,
            cooldown_ms: cooldown_ms.max(0),
            pulse_ms: pulse_ms.max(0),
            last_spike_at_ms: None,
            pulse_active: false,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn cooldown_ms(&self) -> i64 {
        self.cooldown_ms
    }

    pub fn last_spike_at_ms(&self) -> Option<i64> {
        self.last_spike_at_ms
    }

    pub fn in_cooldown(&self, now_ms: i64) -> bool {
        self.last_spike_at_ms
            .is_some_and(|last| now_ms - last < self.cooldown_ms)
    }

    /// Evaluate `score` at `now_ms`. `suppress` blocks firing without
    /// consuming the cooldown.
    pub fn evaluate(&mut self, score: f32, now_ms: i64, suppress: bool) -> SpikeDecision {
        self.refresh(now_ms);

        let eligible = score >= self.threshold && !self.in_cooldown(now_ms);
        if eligible && suppress {
            return SpikeDecision {
                fired: false,
                suppressed: true,
                pulse_active: self.pulse_active,
            };
        }
        if eligible {
            self.last_spike_at_ms = Some(now_ms);
            self.pulse_active = true;
            return SpikeDecision {
                fired: true,
                suppressed: false,
                pulse_active: true,
            };
        }
        SpikeDecision {
            fired: false,
            suppressed: false,
            pulse_active: self.pulse_active,
        }
    }

    /// Clear the pulse once `pulse_ms` has elapsed since the last spike.
    /// Returns the current pulse state.
    pub fn refresh(&mut self, now_ms: i64) -> bool {
        if self.pulse_active {
            if let Some(last) = self.last_spike_at_ms {
                if now_ms - last >= self.pulse_ms {
                    self.pulse_active = false;
                }
            }
        }
        self.pulse_active
    }

    pub fn pulse_active(&self) -> bool {
        self.pulse_active
    }
}
