use std::collections::VecDeque;

/// Removes slow surge drift (wind, current drag) by subtracting a rolling
/// mean sampled only during the recovery phase.
///
/// Drive samples must stay out of the window: averaging over the stroke's own
/// peaks would bias the baseline toward them and eat into the signal the
/// detector needs.
pub struct BaselineCorrector {
    window: VecDeque<(f64, f64)>, // (timestamp ms, raw value)
    window_ms: f64,
    sum: f64,
}

impl BaselineCorrector {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window: VecDeque::new(),
            window_ms,
            sum: 0.0,
        }
    }

    /// Correct one sample. `in_recovery` comes from the stroke detector's
    /// phase before this sample is processed.
    pub fn apply(&mut self, value: f64, timestamp: f64, in_recovery: bool) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        if in_recovery {
            self.window.push_back((timestamp, value));
            self.sum += value;
        }
        while let Some(&(t0, v0)) = self.window.front() {
            if timestamp - t0 > self.window_ms {
                self.window.pop_front();
                self.sum -= v0;
            } else {
                break;
            }
        }
        value - self.baseline()
    }

    pub fn baseline(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}
