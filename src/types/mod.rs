use serde::{Deserialize, Serialize};

/// Raw inertial sample in the device frame.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ImuSample {
    pub timestamp: f64, // ms, monotonic
    pub ax: f32,        // m/s²
    pub ay: f32,
    pub az: f32,
    pub gx: f32, // deg/s
    pub gy: f32,
    pub gz: f32,
}

/// Raw GPS fix, ~1 Hz.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GpsSample {
    pub timestamp: f64, // ms
    pub latitude: f64,  // degrees
    pub longitude: f64,
    pub speed: f32,    // m/s
    pub heading: f32,  // degrees
    pub accuracy: f32, // meters
}

/// Transient attitude estimate, recomputed per IMU sample. Never persisted.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct OrientationEstimate {
    pub pitch: f64, // degrees
    pub roll: f64,
    pub yaw: f64, // gyro-integrated only, drifts over a session
}

/// Acceleration mapped into the boat frame.
///
/// surge: bow(+)/stern(−), sway: starboard(+)/port(−), heave: up(+)/down(−).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BoatAcceleration {
    pub surge: f64, // m/s²
    pub sway: f64,
    pub heave: f64,
}

/// Where the phone is mounted relative to the crew.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoneOrientation {
    /// Screen toward the stern (the rower faces it).
    Rower,
    /// Screen toward the bow (the coxswain faces it).
    Coxswain,
}

impl PhoneOrientation {
    pub fn from_wire(v: u8) -> Self {
        if v == 1 {
            PhoneOrientation::Coxswain
        } else {
            PhoneOrientation::Rower
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            PhoneOrientation::Rower => 0,
            PhoneOrientation::Coxswain => 1,
        }
    }
}

/// Calibration produced once per session. Field widths match the capture
/// layout so a persisted record round-trips exactly.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CalibrationData {
    pub pitch_offset: f32, // degrees
    pub roll_offset: f32,
    pub yaw_offset: f32,
    pub lateral_offset: f32,    // meters
    pub gravity_magnitude: f32, // m/s²
    pub sample_count: u32,
    pub variance: f32, // quality metric, smaller is better
    pub timestamp: f64,
}

impl Default for CalibrationData {
    fn default() -> Self {
        Self {
            pitch_offset: 0.0,
            roll_offset: 0.0,
            yaw_offset: 0.0,
            lateral_offset: 0.0,
            gravity_magnitude: 9.81,
            sample_count: 0,
            variance: 0.0,
            timestamp: 0.0,
        }
    }
}

/// One completed catch→catch cycle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StrokeRecord {
    pub catch_time: f64, // ms
    pub finish_time: f64,
    pub drive_time_ms: f64,
    pub recovery_time_ms: f64,
    pub stroke_rate_spm: u32,
    pub drive_percent: f64, // strictly inside (0, 100)
}
