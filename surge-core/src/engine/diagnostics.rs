use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Per-pipeline counters, shared between the worker and the controller.
#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub callbacks: AtomicUsize,
    pub ticks: AtomicUsize,
    pub skipped_callbacks: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub frames_skipped: AtomicUsize,
    pub spikes: AtomicUsize,
    pub suppressed_spikes: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.callbacks.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
        self.skipped_callbacks.store(0, Ordering::Relaxed);
        self.samples_in.store(0, Ordering::Relaxed);
        self.frames_skipped.store(0, Ordering::Relaxed);
        self.spikes.store(0, Ordering::Relaxed);
        self.suppressed_spikes.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped_callbacks: self.skipped_callbacks.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            spikes: self.spikes.load(Ordering::Relaxed),
            suppressed_spikes: self.suppressed_spikes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub callbacks: usize,
    pub ticks: usize,
    pub skipped_callbacks: usize,
    /// Audio samples read from the track (source rate).
    pub samples_in: usize,
    /// Video frames too small to analyse.
    pub frames_skipped: usize,
    pub spikes: usize,
    /// Over-threshold ticks blocked by the voice gate.
    pub suppressed_spikes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_every_counter() {
        let diag = PipelineDiagnostics::default();
        PipelineDiagnostics::bump(&diag.ticks);
        PipelineDiagnostics::bump(&diag.spikes);
        diag.samples_in.fetch_add(512, Ordering::Relaxed);
        let snap = diag.snapshot();
        assert_eq!((snap.ticks, snap.spikes, snap.samples_in), (1, 1, 512));

        diag.reset();
        assert_eq!(diag.snapshot(), DiagnosticsSnapshot::default());
    }
}
