use serde::{Deserialize, Serialize};

/// Default process noise added per predict step [m²/s²].
pub const DEFAULT_PROCESS_NOISE: f64 = 0.01;
/// GPS speed measurement noise [m²/s²]. GPS speed is low rate and noisy.
pub const DEFAULT_GPS_NOISE: f64 = 0.5;
/// Integrated-IMU speed measurement noise [m²/s²]. High rate, short-term accurate.
pub const DEFAULT_IMU_NOISE: f64 = 0.1;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VelocityKalmanState {
    pub velocity: f64, // m/s
    pub covariance: f64,
    pub gps_updates: u64,
    pub imu_updates: u64,
    pub predict_count: u64,
}

/// Scalar Kalman filter fusing low-rate GPS speed with high-rate integrated
/// IMU acceleration into one boat-speed estimate.
pub struct VelocityKalman {
    velocity: f64,
    covariance: f64,
    process_noise: f64,
    r_gps: f64,
    r_imu: f64,
    gps_update_count: u64,
    imu_update_count: u64,
    predict_count: u64,
}

impl VelocityKalman {
    pub fn new(process_noise: f64, r_gps: f64, r_imu: f64) -> Self {
        Self {
            velocity: 0.0,
            covariance: 1.0,
            process_noise,
            r_gps,
            r_imu,
            gps_update_count: 0,
            imu_update_count: 0,
            predict_count: 0,
        }
    }

    /// Integrate boat-frame acceleration over Δt and grow the covariance.
    pub fn predict(&mut self, accel: f64, dt: f64) {
        if !accel.is_finite() || !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.velocity += accel * dt;
        self.covariance += self.process_noise;
        self.predict_count += 1;
    }

    /// Correct with a GPS speed measurement.
    pub fn update_gps(&mut self, speed: f64) {
        if self.correct(speed, self.r_gps) {
            self.gps_update_count += 1;
        }
    }

    /// Correct with an integrated-IMU speed measurement.
    pub fn update_imu(&mut self, speed: f64) {
        if self.correct(speed, self.r_imu) {
            self.imu_update_count += 1;
        }
    }

    fn correct(&mut self, measurement: f64, noise: f64) -> bool {
        if !measurement.is_finite() {
            return false;
        }
        let gain = self.covariance / (self.covariance + noise);
        self.velocity += gain * (measurement - self.velocity);
        self.covariance *= 1.0 - gain;
        true
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn state(&self) -> VelocityKalmanState {
        VelocityKalmanState {
            velocity: self.velocity,
            covariance: self.covariance,
            gps_updates: self.gps_update_count,
            imu_updates: self.imu_update_count,
            predict_count: self.predict_count,
        }
    }

    pub fn reset(&mut self) {
        self.velocity = 0.0;
        self.covariance = 1.0;
        self.gps_update_count = 0;
        self.imu_update_count = 0;
        self.predict_count = 0;
    }
}

impl Default for VelocityKalman {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_NOISE, DEFAULT_GPS_NOISE, DEFAULT_IMU_NOISE)
    }
}
