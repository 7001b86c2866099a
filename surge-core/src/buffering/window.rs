//! Sliding window over the most recent time-domain samples.
//!
//! The audio worker appends whatever arrived since the previous callback; a
//! tick reads the newest `len` samples, zero-padded until enough audio exists.

/// Fixed-length window holding the newest samples, oldest first.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: Vec<f32>,
}

impl SampleWindow {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    /// Append `incoming`, dropping the oldest samples to keep the length fixed.
    pub fn extend(&mut self, incoming: &[f32]) {
        let len = self.samples.len();
        if len == 0 || incoming.is_empty() {
            return;
        }
        if incoming.len() >= len {
            self.samples
                .copy_from_slice(&incoming[incoming.len() - len..]);
            return;
        }
        let keep = len - incoming.len();
        self.samples.copy_within(incoming.len().., 0);
        self.samples[keep..].copy_from_slice(incoming);
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed() {
        let w = SampleWindow::new(4);
        assert_eq!(w.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn short_appends_shift_left() {
        let mut w = SampleWindow::new(4);
        w.extend(&[1.0, 2.0]);
        assert_eq!(w.as_slice(), &[0.0, 0.0, 1.0, 2.0]);
        w.extend(&[3.0]);
        assert_eq!(w.as_slice(), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn long_append_keeps_newest_tail() {
        let mut w = SampleWindow::new(3);
        w.extend(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(w.as_slice(), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn clear_zeroes_without_resizing() {
        let mut w = SampleWindow::new(3);
        w.extend(&[1.0, 2.0, 3.0]);
        w.clear();
        assert_eq!(w.len(), 3);
        assert_eq!(w.as_slice(), &[0.0; 3]);
    }
}
