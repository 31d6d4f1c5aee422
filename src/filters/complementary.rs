use serde::{Deserialize, Serialize};

use crate::types::{ImuSample, OrientationEstimate};

/// Complementary attitude filter over raw IMU samples.
///
/// Gyro integration is accurate over short horizons but drifts; the
/// accelerometer gives a drift-free gravity reference that is only reliable
/// near rest. Blending per axis at `alpha` ≈ 0.98 keeps the best of both.
/// Yaw has no absolute reference (no magnetometer) and is pure gyro
/// integration, so it drifts unboundedly over a session.
pub struct ComplementaryFilter {
    alpha: f64,
    pitch: f64, // degrees
    roll: f64,
    yaw: f64,
    last_timestamp: Option<f64>,
    initialized: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ComplementaryFilterState {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    pub initialized: bool,
}

impl ComplementaryFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            last_timestamp: None,
            initialized: false,
        }
    }

    /// Advance the estimate with one sample and return the current attitude.
    ///
    /// Δt comes from consecutive timestamps; the first sample (and any sample
    /// with a non-increasing timestamp) integrates with Δt = 0. Samples with
    /// non-finite fields leave the estimate untouched.
    pub fn update(&mut self, sample: &ImuSample) -> OrientationEstimate {
        if !sample_is_finite(sample) {
            return self.estimate();
        }

        let dt = match self.last_timestamp {
            Some(t0) => ((sample.timestamp - t0) / 1000.0).max(0.0),
            None => 0.0,
        };
        self.last_timestamp = Some(sample.timestamp);

        let ax = sample.ax as f64;
        let ay = sample.ay as f64;
        let az = sample.az as f64;

        // Gravity-referenced tilt. Same convention as the static calibrator:
        // pitch lifts the device Y axis, roll lifts the X axis.
        let pitch_accel = ay.atan2((ax * ax + az * az).sqrt()).to_degrees();
        let roll_accel = ax.atan2((ay * ay + az * az).sqrt()).to_degrees();

        if !self.initialized {
            // Snap to the accelerometer on the first sample instead of
            // blending up from zero.
            self.pitch = pitch_accel;
            self.roll = roll_accel;
            self.yaw = 0.0;
            self.initialized = true;
            return self.estimate();
        }

        let gx = sample.gx as f64;
        let gy = sample.gy as f64;
        let gz = sample.gz as f64;

        self.pitch = self.alpha * (self.pitch + gx * dt) + (1.0 - self.alpha) * pitch_accel;
        self.roll = self.alpha * (self.roll + gy * dt) + (1.0 - self.alpha) * roll_accel;
        self.yaw += gz * dt;

        self.estimate()
    }

    pub fn estimate(&self) -> OrientationEstimate {
        OrientationEstimate {
            pitch: self.pitch,
            roll: self.roll,
            yaw: self.yaw,
        }
    }

    pub fn state(&self) -> ComplementaryFilterState {
        ComplementaryFilterState {
            pitch: self.pitch,
            roll: self.roll,
            yaw: self.yaw,
            initialized: self.initialized,
        }
    }

    pub fn reset(&mut self) {
        self.pitch = 0.0;
        self.roll = 0.0;
        self.yaw = 0.0;
        self.last_timestamp = None;
        self.initialized = false;
    }
}

fn sample_is_finite(s: &ImuSample) -> bool {
    s.timestamp.is_finite()
        && s.ax.is_finite()
        && s.ay.is_finite()
        && s.az.is_finite()
        && s.gx.is_finite()
        && s.gy.is_finite()
        && s.gz.is_finite()
}
