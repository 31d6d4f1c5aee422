use log::{info, warn};
use nalgebra::Vector3;

use crate::calibration::{
    accel_vector, AxisCalibrationStrategy, BoatBasis, CalibrationOutcome, CalibrationQuality,
    QualityGrade, GRAVITY_MAX, GRAVITY_MIN, MIN_CALIBRATION_SAMPLES,
};
use crate::types::{CalibrationData, ImuSample};

/// Static gravity-vector calibration: the boat is held still for a few
/// seconds while accelerometer samples are averaged into tilt offsets and a
/// measured gravity magnitude.
pub struct StaticGravityCalibrator {
    samples: Vec<Vector3<f64>>,
}

impl StaticGravityCalibrator {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(MIN_CALIBRATION_SAMPLES),
        }
    }
}

impl Default for StaticGravityCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisCalibrationStrategy for StaticGravityCalibrator {
    fn add_sample(&mut self, sample: &ImuSample) {
        if let Some(v) = accel_vector(sample) {
            self.samples.push(v);
        }
    }

    fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn is_ready(&self) -> bool {
        self.samples.len() >= MIN_CALIBRATION_SAMPLES
    }

    fn finish(&mut self, timestamp: f64) -> CalibrationOutcome {
        let n = self.samples.len();
        if n == 0 {
            warn!("static calibration finished with no samples");
            let mut outcome = CalibrationOutcome::uncalibrated();
            outcome.record.timestamp = timestamp;
            return outcome;
        }

        let mean: Vector3<f64> = self
            .samples
            .iter()
            .fold(Vector3::zeros(), |acc, s| acc + s)
            / n as f64;
        let var: Vector3<f64> = self
            .samples
            .iter()
            .fold(Vector3::zeros(), |acc, s| {
                let d = s - mean;
                acc + d.component_mul(&d)
            })
            / n as f64;
        let variance = (var.x + var.y + var.z).sqrt() as f32;

        let pitch_offset = -mean.y.atan2((mean.x * mean.x + mean.z * mean.z).sqrt());
        let roll_offset = -mean.x.atan2((mean.y * mean.y + mean.z * mean.z).sqrt());
        let gravity = mean.norm();

        let mut quality = CalibrationQuality::nominal(QualityGrade::from_variance(variance));
        if n < MIN_CALIBRATION_SAMPLES {
            quality.degraded = true;
            quality
                .notes
                .push(format!("only {n} samples, need {MIN_CALIBRATION_SAMPLES}"));
        }
        if !(GRAVITY_MIN..=GRAVITY_MAX).contains(&gravity) {
            quality.degraded = true;
            quality
                .notes
                .push(format!("gravity magnitude {gravity:.2} m/s² out of range"));
        }

        let record = CalibrationData {
            pitch_offset: pitch_offset.to_degrees() as f32,
            roll_offset: roll_offset.to_degrees() as f32,
            yaw_offset: 0.0,
            lateral_offset: 0.0,
            gravity_magnitude: gravity as f32,
            sample_count: n as u32,
            variance,
            timestamp,
        };

        if quality.degraded {
            warn!(
                "static calibration degraded: {:?} ({} samples, gravity {:.2})",
                quality.notes, n, gravity
            );
        } else {
            info!(
                "static calibration complete: pitch {:.2}°, roll {:.2}°, gravity {:.2} m/s², {:?}",
                record.pitch_offset, record.roll_offset, gravity, quality.grade
            );
        }

        self.samples.clear();
        CalibrationOutcome {
            record,
            basis: BoatBasis::from_vertical(mean),
            quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_sample(t: f64) -> ImuSample {
        ImuSample {
            timestamp: t,
            ax: 0.0,
            ay: 0.0,
            az: 9.8,
            gx: 0.0,
            gy: 0.0,
            gz: 0.0,
        }
    }

    fn tilted_sample(t: f64, pitch_deg: f64, roll_deg: f64) -> ImuSample {
        let p = pitch_deg.to_radians();
        let r = roll_deg.to_radians();
        ImuSample {
            timestamp: t,
            ax: (9.8 * r.sin() * p.cos()) as f32,
            ay: (9.8 * p.sin()) as f32,
            az: (9.8 * p.cos() * r.cos()) as f32,
            gx: 0.0,
            gy: 0.0,
            gz: 0.0,
        }
    }

    #[test]
    fn test_level_calibration_is_identity() {
        let mut cal = StaticGravityCalibrator::new();
        for i in 0..200 {
            cal.add_sample(&level_sample(i as f64 * 20.0));
        }
        assert!(cal.is_ready());
        let outcome = cal.finish(4000.0);
        assert!(outcome.record.pitch_offset.abs() < 0.01);
        assert!(outcome.record.roll_offset.abs() < 0.01);
        assert!((outcome.record.gravity_magnitude - 9.8).abs() < 0.1);
        assert_eq!(outcome.quality.grade, QualityGrade::Excellent);
        assert!(!outcome.quality.degraded);
    }

    #[test]
    fn test_known_tilt_recovered_within_one_degree() {
        let mut cal = StaticGravityCalibrator::new();
        for i in 0..200 {
            cal.add_sample(&tilted_sample(i as f64 * 20.0, 8.0, 0.0));
        }
        let outcome = cal.finish(4000.0);
        assert!((outcome.record.pitch_offset - (-8.0)).abs() < 1.0);
        assert!(outcome.record.roll_offset.abs() < 1.0);
    }

    #[test]
    fn test_roll_tilt_recovered() {
        let mut cal = StaticGravityCalibrator::new();
        for i in 0..200 {
            cal.add_sample(&tilted_sample(i as f64 * 20.0, 0.0, 5.0));
        }
        let outcome = cal.finish(4000.0);
        assert!((outcome.record.roll_offset - (-5.0)).abs() < 1.0);
    }

    #[test]
    fn test_insufficient_samples_degrade() {
        let mut cal = StaticGravityCalibrator::new();
        for i in 0..40 {
            cal.add_sample(&level_sample(i as f64 * 20.0));
        }
        assert!(!cal.is_ready());
        let outcome = cal.finish(800.0);
        assert!(outcome.quality.degraded);
        // Still produces a usable record
        assert!((outcome.record.gravity_magnitude - 9.8).abs() < 0.1);
    }

    #[test]
    fn test_gravity_out_of_range_degrades() {
        let mut cal = StaticGravityCalibrator::new();
        for i in 0..200 {
            let mut s = level_sample(i as f64 * 20.0);
            s.az = 5.0; // implausible gravity
            cal.add_sample(&s);
        }
        let outcome = cal.finish(4000.0);
        assert!(outcome.quality.degraded);
    }

    #[test]
    fn test_noisy_hold_grades_lower() {
        let mut cal = StaticGravityCalibrator::new();
        for i in 0..200 {
            let mut s = level_sample(i as f64 * 20.0);
            // ±0.3 m/s² square wave: clearly not an excellent hold
            s.az += if i % 2 == 0 { 0.3 } else { -0.3 };
            cal.add_sample(&s);
        }
        let outcome = cal.finish(4000.0);
        assert!(outcome.quality.grade != QualityGrade::Excellent);
    }
}
