use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 20;

/// Trailing window over the last `size` values of a series.
///
/// Statistics are only reported once the window is full, matching the
/// fixed-window policy used by every rolling metric in this crate.
pub struct RollingWindow {
    values: VecDeque<f64>,
    size: usize,
}

impl RollingWindow {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            values: VecDeque::with_capacity(size),
            size,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > self.size {
            self.values.pop_front();
        }
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.size
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.size as f64)
    }

    /// Sample standard deviation (n - 1 denominator).
    pub fn std(&self) -> Option<f64> {
        if !self.is_full() || self.size < 2 {
            return None;
        }
        let mean = self.mean()?;
        let ss: f64 = self.values.iter().map(|v| (v - mean).powi(2)).sum();
        Some((ss / (self.size - 1) as f64).sqrt())
    }
}
