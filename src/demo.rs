//! Deterministic synthetic rowing sessions.
//!
//! Backs the demo-mode flag and gives the replay tool and tests a realistic
//! capture without hardware: an asymmetric surge waveform (short punchy
//! drive, long shallow recovery), gravity on the device Z axis, gentle
//! pitch/roll rocking, and a steady GPS track.

use std::f64::consts::PI;

use crate::capture::{Capture, SessionMetadata, CURRENT_VERSION};
use crate::types::{GpsSample, ImuSample, PhoneOrientation};

#[derive(Clone, Debug)]
pub struct DemoConfig {
    pub duration_s: f64,
    pub imu_rate_hz: f64,
    pub stroke_rate_spm: f64,
    pub surge_amplitude: f64, // m/s²
    pub boat_speed: f64,      // m/s
    pub session_start: f64,   // ms since epoch
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            duration_s: 60.0,
            imu_rate_hz: 50.0,
            stroke_rate_spm: 25.0,
            surge_amplitude: 2.0,
            boat_speed: 4.0,
            session_start: 0.0,
        }
    }
}

/// Boat surge over one normalized stroke cycle `u ∈ [0, 1)`: a tall positive
/// half-sine drive for 45% of the cycle, then a longer, shallower negative
/// half-sine recovery. Zero mean over the cycle.
fn stroke_waveform(u: f64) -> f64 {
    const DRIVE_FRACTION: f64 = 0.45;
    if u < DRIVE_FRACTION {
        (PI * u / DRIVE_FRACTION).sin()
    } else {
        let recovery = (u - DRIVE_FRACTION) / (1.0 - DRIVE_FRACTION);
        -(DRIVE_FRACTION / (1.0 - DRIVE_FRACTION)) * (PI * recovery).sin()
    }
}

/// Small deterministic noise source; no RNG dependency, replays are
/// reproducible byte for byte.
struct Lcg(u64);

impl Lcg {
    fn next_unit(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

/// Generate raw sample streams for a synthetic session. The device is
/// modeled as rower-mounted (screen toward the stern), so boat surge shows
/// up negated on the device Y axis.
pub fn synthetic_session(config: &DemoConfig) -> (Vec<ImuSample>, Vec<GpsSample>) {
    let mut noise = Lcg(0x5EED_CAFE);
    let stroke_hz = config.stroke_rate_spm / 60.0;
    let n_imu = (config.duration_s * config.imu_rate_hz) as usize;

    let mut imu = Vec::with_capacity(n_imu);
    for i in 0..n_imu {
        let t = i as f64 / config.imu_rate_hz;
        let u = (t * stroke_hz).fract();
        let surge = config.surge_amplitude * stroke_waveform(u);
        let sway = 0.2 * (2.0 * PI * stroke_hz * t + PI / 4.0).sin();
        let heave = 0.3 * (2.0 * PI * stroke_hz * t).sin();
        imu.push(ImuSample {
            timestamp: config.session_start + t * 1000.0,
            ax: (sway + 0.05 * noise.next_unit()) as f32,
            ay: (-surge + 0.08 * noise.next_unit()) as f32,
            az: (9.81 + heave + 0.08 * noise.next_unit()) as f32,
            gx: (2.0 * (2.0 * PI * stroke_hz * t).sin() + 0.5 * noise.next_unit()) as f32,
            gy: (1.0 * (2.0 * PI * stroke_hz * t).cos() + 0.5 * noise.next_unit()) as f32,
            gz: (0.5 * noise.next_unit()) as f32,
        });
    }

    let n_gps = config.duration_s as usize;
    let mut gps = Vec::with_capacity(n_gps);
    for i in 0..n_gps {
        let t = i as f64;
        gps.push(GpsSample {
            timestamp: config.session_start + t * 1000.0,
            // Heading due east along the Alster, roughly
            latitude: 53.5,
            longitude: 10.0 + config.boat_speed * t / 111_320.0 / 0.6,
            speed: (config.boat_speed + 0.2 * noise.next_unit()) as f32,
            heading: 90.0,
            accuracy: 5.0,
        });
    }

    (imu, gps)
}

/// A complete demo capture in the current format version.
pub fn synthetic_capture(config: &DemoConfig) -> Capture {
    let (imu, gps) = synthetic_session(config);
    Capture {
        metadata: SessionMetadata {
            format_version: CURRENT_VERSION,
            session_start: config.session_start,
            phone_orientation: PhoneOrientation::Rower,
            demo_mode: true,
            catch_threshold: None,
            finish_threshold: None,
        },
        imu,
        gps,
        calibration: None,
        calibration_samples: Vec::new(),
    }
}
