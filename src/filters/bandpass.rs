//! Signal conditioning for stroke detection.
//!
//! Rowing strokes live in the 18–72 SPM band (0.3–1.2 Hz). A cascaded
//! single-pole high-pass then low-pass isolates that band; coefficients are
//! recomputed from each sample's Δt, so no fixed sample rate is assumed.

use std::f64::consts::PI;

/// Single-pole high-pass. Removes DC offset and slow drift.
pub struct HighPassFilter {
    cutoff_hz: f64,
    prev_input: Option<f64>,
    output: f64,
}

impl HighPassFilter {
    pub fn new(cutoff_hz: f64) -> Self {
        Self {
            cutoff_hz,
            prev_input: None,
            output: 0.0,
        }
    }

    pub fn update(&mut self, input: f64, dt: f64) -> f64 {
        if !input.is_finite() {
            return self.output;
        }
        let prev_input = match self.prev_input {
            Some(x) => x,
            None => {
                // First sample: no derivative yet, start from zero output.
                self.prev_input = Some(input);
                return self.output;
            }
        };
        if dt > 0.0 {
            let rc = 1.0 / (2.0 * PI * self.cutoff_hz);
            let alpha = rc / (rc + dt);
            self.output = alpha * (self.output + input - prev_input);
        }
        self.prev_input = Some(input);
        self.output
    }

    pub fn reset(&mut self) {
        self.prev_input = None;
        self.output = 0.0;
    }
}

/// Single-pole low-pass. Removes sensor noise above the stroke band.
pub struct LowPassFilter {
    cutoff_hz: f64,
    output: Option<f64>,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64) -> Self {
        Self {
            cutoff_hz,
            output: None,
        }
    }

    pub fn update(&mut self, input: f64, dt: f64) -> f64 {
        if !input.is_finite() {
            return self.output.unwrap_or(0.0);
        }
        let output = match self.output {
            None => input,
            Some(y) if dt > 0.0 => {
                let rc = 1.0 / (2.0 * PI * self.cutoff_hz);
                let alpha = dt / (rc + dt);
                y + alpha * (input - y)
            }
            Some(y) => y,
        };
        self.output = Some(output);
        output
    }

    pub fn current(&self) -> f64 {
        self.output.unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        self.output = None;
    }
}

/// High-pass → low-pass cascade used on the surge signal before detection.
pub struct BandPassFilter {
    highpass: HighPassFilter,
    lowpass: LowPassFilter,
}

impl BandPassFilter {
    pub fn new(highpass_hz: f64, lowpass_hz: f64) -> Self {
        Self {
            highpass: HighPassFilter::new(highpass_hz),
            lowpass: LowPassFilter::new(lowpass_hz),
        }
    }

    pub fn update(&mut self, input: f64, dt: f64) -> f64 {
        if !input.is_finite() {
            return self.lowpass.current();
        }
        let hp = self.highpass.update(input, dt);
        self.lowpass.update(hp, dt)
    }

    pub fn reset(&mut self) {
        self.highpass.reset();
        self.lowpass.reset();
    }
}

/// Exponential smoother for display output only; never feeds the detector.
pub struct DisplaySmoother {
    factor: f64, // weight of the previous output, ~0.85
    output: Option<f64>,
}

impl DisplaySmoother {
    pub fn new(factor: f64) -> Self {
        Self {
            factor,
            output: None,
        }
    }

    pub fn update(&mut self, input: f64) -> f64 {
        if !input.is_finite() {
            return self.output.unwrap_or(0.0);
        }
        let output = match self.output {
            None => input,
            Some(y) => self.factor * y + (1.0 - self.factor) * input,
        };
        self.output = Some(output);
        output
    }

    pub fn reset(&mut self) {
        self.output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.02; // 50 Hz

    #[test]
    fn test_highpass_removes_dc() {
        let mut hp = HighPassFilter::new(0.3);
        let mut out = 0.0;
        for _ in 0..500 {
            out = hp.update(5.0, DT);
        }
        // Constant input decays to (near) zero after 10 s
        assert!(out.abs() < 0.01);
    }

    #[test]
    fn test_highpass_passes_stroke_band() {
        let mut hp = HighPassFilter::new(0.3);
        let mut peak: f64 = 0.0;
        for i in 0..1000 {
            let t = i as f64 * DT;
            let x = (2.0 * PI * 1.0 * t).sin(); // 1 Hz, well above cutoff
            let y = hp.update(x, DT);
            if i > 500 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > 0.8);
    }

    #[test]
    fn test_lowpass_follows_constant() {
        let mut lp = LowPassFilter::new(1.2);
        let mut out = 0.0;
        for _ in 0..500 {
            out = lp.update(3.0, DT);
        }
        assert!((out - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_bandpass_passes_rowing_frequency() {
        let mut bp = BandPassFilter::new(0.3, 1.2);
        let mut peak: f64 = 0.0;
        for i in 0..2000 {
            let t = i as f64 * DT;
            let x = 2.0 * (2.0 * PI * 0.42 * t).sin(); // ~25 SPM
            let y = bp.update(x, DT);
            if i > 1000 {
                peak = peak.max(y.abs());
            }
        }
        // Amplitude survives well above the detection thresholds
        assert!(peak > 1.0, "peak = {peak}");
        assert!(peak < 2.0, "peak = {peak}");
    }

    #[test]
    fn test_zero_dt_does_not_change_output() {
        let mut bp = BandPassFilter::new(0.3, 1.2);
        bp.update(1.0, DT);
        let a = bp.update(0.5, DT);
        let b = bp.update(0.7, 0.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_smoother_factor() {
        let mut sm = DisplaySmoother::new(0.85);
        assert_eq!(sm.update(1.0), 1.0);
        let y = sm.update(2.0);
        // 0.85 * 1.0 + 0.15 * 2.0
        assert!((y - 1.15).abs() < 1e-9);
    }

    #[test]
    fn test_nan_input_is_skipped() {
        let mut bp = BandPassFilter::new(0.3, 1.2);
        bp.update(1.0, DT);
        let before = bp.update(0.5, DT);
        let after = bp.update(f64::NAN, DT);
        assert_eq!(before, after);
    }
}
