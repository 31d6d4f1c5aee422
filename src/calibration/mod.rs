//! Axis calibration: figures out how the phone sits in the boat.
//!
//! Two interchangeable strategies produce the same outcome consumed by the
//! coordinate transform: a static gravity hold (boat kept still) or fully
//! automatic PCA axis detection (no user action, infers the bow–stern axis
//! from motion variance).

pub mod pca;
pub mod static_gravity;

pub use pca::PcaAxisDetector;
pub use static_gravity::StaticGravityCalibrator;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::types::{CalibrationData, ImuSample};

/// Minimum at-rest samples for a full-quality static calibration.
pub const MIN_CALIBRATION_SAMPLES: usize = 150;

/// Plausible measured gravity range [m/s²]; outside it the calibration is
/// degraded (phone was moving, or the sensor scale is off).
pub const GRAVITY_MIN: f64 = 7.8;
pub const GRAVITY_MAX: f64 = 11.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    /// Grade from the variance quality metric (smaller is better).
    pub fn from_variance(variance: f32) -> Self {
        if variance < 0.05 {
            QualityGrade::Excellent
        } else if variance < 0.10 {
            QualityGrade::Good
        } else if variance < 0.20 {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }
}

/// Non-fatal quality report attached to every calibration outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationQuality {
    pub grade: QualityGrade,
    /// Set when the outcome should prompt the user to recalibrate.
    pub degraded: bool,
    pub notes: Vec<String>,
}

impl CalibrationQuality {
    pub fn nominal(grade: QualityGrade) -> Self {
        Self {
            grade,
            degraded: false,
            notes: Vec::new(),
        }
    }
}

/// Orthonormal boat axes expressed in the device frame.
#[derive(Clone, Copy, Debug)]
pub struct BoatBasis {
    pub forward: Vector3<f64>,  // bow
    pub lateral: Vector3<f64>,  // starboard
    pub vertical: Vector3<f64>, // up
}

impl BoatBasis {
    /// Phone flat in the boat, top edge toward the bow: device +Y is forward,
    /// +X starboard, +Z up.
    pub fn canonical() -> Self {
        Self {
            forward: Vector3::y(),
            lateral: Vector3::x(),
            vertical: Vector3::z(),
        }
    }

    /// Build a basis from the device-frame "up" direction (the gravity
    /// reaction measured at rest). Forward is device +Y projected into the
    /// horizontal plane.
    pub fn from_vertical(vertical: Vector3<f64>) -> Self {
        let vertical = if vertical.norm() > 1e-9 {
            vertical.normalize()
        } else {
            Vector3::z()
        };
        let mut forward = Vector3::y() - vertical * vertical.dot(&Vector3::y());
        if forward.norm() < 1e-6 {
            // Device Y is (anti)parallel to gravity: phone standing on end.
            forward = Vector3::z() - vertical * vertical.dot(&Vector3::z());
        }
        let forward = forward.normalize();
        let lateral = forward.cross(&vertical);
        Self {
            forward,
            lateral,
            vertical,
        }
    }

    /// Rebuild the basis from persisted tilt offsets (offline reprocessing of
    /// a capture that stored its calibration record).
    pub fn from_offsets(pitch_offset_deg: f64, roll_offset_deg: f64) -> Self {
        // The offsets negate the measured tilt, so the device attitude at
        // calibration time was (-pitch_offset, -roll_offset).
        let pitch = (-pitch_offset_deg).to_radians();
        let roll = (-roll_offset_deg).to_radians();
        let vertical = Vector3::new(
            roll.sin() * pitch.cos(),
            pitch.sin(),
            pitch.cos() * roll.cos(),
        );
        Self::from_vertical(vertical)
    }
}

impl Default for BoatBasis {
    fn default() -> Self {
        Self::canonical()
    }
}

/// What a calibration strategy hands to the rest of the pipeline.
#[derive(Clone, Debug)]
pub struct CalibrationOutcome {
    pub record: CalibrationData,
    pub basis: BoatBasis,
    pub quality: CalibrationQuality,
}

impl CalibrationOutcome {
    /// Identity calibration used before any strategy has run.
    pub fn uncalibrated() -> Self {
        Self {
            record: CalibrationData::default(),
            basis: BoatBasis::canonical(),
            quality: CalibrationQuality {
                grade: QualityGrade::Poor,
                degraded: true,
                notes: vec!["no calibration performed".to_string()],
            },
        }
    }

    /// Reconstruct an outcome from a persisted record.
    pub fn from_record(record: CalibrationData) -> Self {
        let basis = BoatBasis::from_offsets(record.pitch_offset as f64, record.roll_offset as f64);
        let grade = QualityGrade::from_variance(record.variance);
        let gravity = record.gravity_magnitude as f64;
        let mut quality = CalibrationQuality::nominal(grade);
        if (record.sample_count as usize) < MIN_CALIBRATION_SAMPLES {
            quality.degraded = true;
            quality
                .notes
                .push(format!("only {} calibration samples", record.sample_count));
        }
        if !(GRAVITY_MIN..=GRAVITY_MAX).contains(&gravity) {
            quality.degraded = true;
            quality
                .notes
                .push(format!("gravity magnitude {gravity:.2} m/s² out of range"));
        }
        Self {
            record,
            basis,
            quality,
        }
    }
}

/// A calibration strategy: feed it raw samples, then ask for the outcome.
/// Strategies never fail; poor input degrades the quality report instead.
pub trait AxisCalibrationStrategy {
    fn add_sample(&mut self, sample: &ImuSample);
    fn sample_count(&self) -> usize;
    /// True once enough samples are buffered for a full-quality result.
    fn is_ready(&self) -> bool;
    /// Consume the buffer and produce the outcome. `timestamp` stamps the
    /// record (ms, session clock).
    fn finish(&mut self, timestamp: f64) -> CalibrationOutcome;
}

pub(crate) fn accel_vector(sample: &ImuSample) -> Option<Vector3<f64>> {
    let v = Vector3::new(sample.ax as f64, sample.ay as f64, sample.az as f64);
    if v.iter().all(|c| c.is_finite()) {
        Some(v)
    } else {
        None
    }
}
