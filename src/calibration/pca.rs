use log::{info, warn};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::calibration::{
    accel_vector, AxisCalibrationStrategy, BoatBasis, CalibrationOutcome, CalibrationQuality,
    QualityGrade,
};
use crate::types::{CalibrationData, ImuSample, PhoneOrientation};

/// Samples whose gravity-removed magnitude falls below this carry no useful
/// direction information [m/s²].
const MOTION_THRESHOLD: f64 = 1.0;

/// Fewer motion samples than this cannot support a covariance estimate.
const MIN_MOTION_SAMPLES: usize = 32;

/// Below this axis-separation confidence the detection is surfaced as
/// low-confidence (still usable, never fatal).
const LOW_CONFIDENCE: f64 = 0.60;

/// Automatic axis detection: infers the bow–stern axis from the dominant
/// motion variance, with no user action and no assumption about how the
/// phone is mounted.
///
/// Gravity is estimated as the per-axis median of the whole buffer (robust
/// against stroke spikes), subtracted out, and the remaining motion vectors
/// feed a 3×3 covariance whose eigenvectors are the boat axes: the dominant
/// one is bow–stern, the second port–starboard, the third vertical.
pub struct PcaAxisDetector {
    samples: Vec<Vector3<f64>>,
    /// The transform applies a mounting sign to surge/sway regardless of how
    /// the calibration was produced. Detection resolves the bow direction by
    /// itself, so the reported axes pre-compensate for that multiplier and
    /// the two signs cancel.
    mounting: PhoneOrientation,
}

impl PcaAxisDetector {
    pub fn new(mounting: PhoneOrientation) -> Self {
        Self {
            samples: Vec::new(),
            mounting,
        }
    }
}

impl AxisCalibrationStrategy for PcaAxisDetector {
    fn add_sample(&mut self, sample: &ImuSample) {
        if let Some(v) = accel_vector(sample) {
            self.samples.push(v);
        }
    }

    fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn is_ready(&self) -> bool {
        self.samples.len() >= MIN_MOTION_SAMPLES * 4
    }

    fn finish(&mut self, timestamp: f64) -> CalibrationOutcome {
        let samples = std::mem::take(&mut self.samples);
        if samples.is_empty() {
            warn!("axis detection finished with no samples");
            let mut outcome = CalibrationOutcome::uncalibrated();
            outcome.record.timestamp = timestamp;
            return outcome;
        }

        let gravity = median_vector(&samples);

        let all_motion: Vec<Vector3<f64>> = samples.iter().map(|s| s - gravity).collect();
        let motion: Vec<Vector3<f64>> = all_motion
            .iter()
            .copied()
            .filter(|m| m.norm() >= MOTION_THRESHOLD)
            .collect();

        if motion.len() < MIN_MOTION_SAMPLES {
            warn!(
                "axis detection: only {} motion samples above {MOTION_THRESHOLD} m/s², \
                 falling back to gravity-only frame",
                motion.len()
            );
            let mut outcome = outcome_from_gravity(gravity, samples.len(), 0.0, timestamp);
            outcome.quality.grade = QualityGrade::Poor;
            outcome.quality.degraded = true;
            outcome
                .quality
                .notes
                .push(format!("insufficient motion: {} samples", motion.len()));
            return outcome;
        }

        let mean: Vector3<f64> = motion
            .iter()
            .fold(Vector3::zeros(), |acc, m| acc + m)
            / motion.len() as f64;
        let mut cov = Matrix3::zeros();
        for m in &motion {
            let d = m - mean;
            cov += d * d.transpose();
        }
        cov /= motion.len() as f64;

        let eigen = SymmetricEigen::new(cov);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| {
            eigen.eigenvalues[b]
                .partial_cmp(&eigen.eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let lambda1 = eigen.eigenvalues[order[0]].max(0.0);
        let lambda2 = eigen.eigenvalues[order[1]].max(0.0);

        let mut forward: Vector3<f64> = eigen.eigenvectors.column(order[0]).into_owned();
        let mut vertical: Vector3<f64> = eigen.eigenvectors.column(order[2]).into_owned();

        // Eigenvector signs are arbitrary. Vertical points the same side as
        // the gravity reaction the accelerometer measures. The bow direction
        // is where the third moment of the whole gravity-removed series
        // points: drive spikes are taller than the recovery is deep.
        if vertical.dot(&gravity) < 0.0 {
            vertical = -vertical;
        }
        let skew: f64 = all_motion
            .iter()
            .map(|m| {
                let p = m.dot(&forward);
                p * p * p
            })
            .sum();
        if skew < 0.0 {
            forward = -forward;
        }
        // Pre-compensate the transform's mounting multiplier (see field doc)
        if self.mounting == PhoneOrientation::Rower {
            forward = -forward;
        }
        let lateral = forward.cross(&vertical);

        let confidence = if lambda1 > 0.0 {
            (1.0 - lambda2 / lambda1).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut outcome = outcome_from_gravity(gravity, samples.len(), confidence, timestamp);
        outcome.basis = BoatBasis {
            forward,
            lateral,
            vertical,
        };
        // Device-frame azimuth of the detected bow axis, for the record.
        outcome.record.yaw_offset = forward.x.atan2(forward.y).to_degrees() as f32;

        if confidence < LOW_CONFIDENCE {
            outcome.quality.degraded = true;
            outcome
                .quality
                .notes
                .push(format!("low axis confidence: {:.0}%", confidence * 100.0));
            warn!(
                "axis detection low confidence {:.0}% (λ1 {lambda1:.3}, λ2 {lambda2:.3})",
                confidence * 100.0
            );
        } else {
            info!(
                "axis detection complete: confidence {:.0}%, bow axis ({:.2}, {:.2}, {:.2})",
                confidence * 100.0,
                forward.x,
                forward.y,
                forward.z
            );
        }
        outcome
    }
}

/// Shared record construction: tilt offsets and gravity magnitude come from
/// the gravity estimate; `variance` stores 1 − confidence so the graded
/// meaning (smaller is better) matches the static strategy.
fn outcome_from_gravity(
    gravity: Vector3<f64>,
    sample_count: usize,
    confidence: f64,
    timestamp: f64,
) -> CalibrationOutcome {
    let pitch = gravity
        .y
        .atan2((gravity.x * gravity.x + gravity.z * gravity.z).sqrt());
    let roll = gravity
        .x
        .atan2((gravity.y * gravity.y + gravity.z * gravity.z).sqrt());
    let variance = (1.0 - confidence) as f32;
    let record = CalibrationData {
        pitch_offset: (-pitch).to_degrees() as f32,
        roll_offset: (-roll).to_degrees() as f32,
        yaw_offset: 0.0,
        lateral_offset: 0.0,
        gravity_magnitude: gravity.norm() as f32,
        sample_count: sample_count as u32,
        variance,
        timestamp,
    };
    CalibrationOutcome {
        basis: BoatBasis::from_vertical(gravity),
        quality: CalibrationQuality::nominal(QualityGrade::from_variance(variance)),
        record,
    }
}

fn median_vector(samples: &[Vector3<f64>]) -> Vector3<f64> {
    Vector3::new(
        median_component(samples, 0),
        median_component(samples, 1),
        median_component(samples, 2),
    )
}

fn median_component(samples: &[Vector3<f64>], axis: usize) -> f64 {
    let mut values: Vec<f64> = samples.iter().map(|s| s[axis]).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rowing-like session: gravity on +Z, strong asymmetric surge along a
    /// known device-frame axis, weaker sway and heave.
    fn synthetic_samples(bow: Vector3<f64>) -> Vec<ImuSample> {
        let bow = bow.normalize();
        let lateral = Vector3::new(-bow.y, bow.x, 0.0).normalize();
        let mut samples = Vec::new();
        for k in 0..320 {
            // Sharp positive drive spikes of uneven height, long shallow recovery
            let surge = match k % 8 {
                0 => 6.0,
                1 | 2 => 2.0,
                _ => -1.2,
            };
            let sway = 0.4 * (k as f64).sin();
            let heave = 0.2 * (2.0 * k as f64).sin();
            let accel = Vector3::new(0.0, 0.0, 9.81) + bow * surge + lateral * sway
                + Vector3::z() * heave;
            samples.push(ImuSample {
                timestamp: k as f64 * 20.0,
                ax: accel.x as f32,
                ay: accel.y as f32,
                az: accel.z as f32,
                gx: 0.0,
                gy: 0.0,
                gz: 0.0,
            });
        }
        samples
    }

    #[test]
    fn test_detects_dominant_axis() {
        let bow = Vector3::new(0.6, 0.8, 0.0);
        let mut det = PcaAxisDetector::new(PhoneOrientation::Coxswain);
        for s in synthetic_samples(bow) {
            det.add_sample(&s);
        }
        let outcome = det.finish(6000.0);
        let dot = outcome.basis.forward.dot(&bow.normalize());
        assert!(dot > 0.95, "forward axis misaligned: dot = {dot}");
        assert!(!outcome.quality.degraded);
    }

    #[test]
    fn test_bow_sign_follows_drive_skew() {
        // Same motion, axis handed in the opposite direction: detection must
        // still point the forward axis along the spikes.
        let bow = Vector3::new(0.0, -1.0, 0.0);
        let mut det = PcaAxisDetector::new(PhoneOrientation::Coxswain);
        for s in synthetic_samples(bow) {
            det.add_sample(&s);
        }
        let outcome = det.finish(6000.0);
        assert!(outcome.basis.forward.dot(&bow) > 0.95);
    }

    #[test]
    fn test_rower_mounting_negates_reported_axes() {
        let bow = Vector3::new(0.6, 0.8, 0.0).normalize();
        let mut cox = PcaAxisDetector::new(PhoneOrientation::Coxswain);
        let mut rower = PcaAxisDetector::new(PhoneOrientation::Rower);
        for s in synthetic_samples(bow) {
            cox.add_sample(&s);
            rower.add_sample(&s);
        }
        let cox = cox.finish(6000.0);
        let rower = rower.finish(6000.0);
        // The transform multiplies surge/sway by −1 for rower mounts, so the
        // reported axes flip to cancel it
        assert!((cox.basis.forward + rower.basis.forward).norm() < 1e-9);
        assert!((cox.basis.lateral + rower.basis.lateral).norm() < 1e-9);
        assert!((cox.basis.vertical - rower.basis.vertical).norm() < 1e-9);
    }

    #[test]
    fn test_vertical_points_up() {
        let mut det = PcaAxisDetector::new(PhoneOrientation::Coxswain);
        for s in synthetic_samples(Vector3::new(0.0, 1.0, 0.0)) {
            det.add_sample(&s);
        }
        let outcome = det.finish(6000.0);
        assert!(outcome.basis.vertical.z > 0.9);
    }

    #[test]
    fn test_gravity_estimate_from_median() {
        let mut det = PcaAxisDetector::new(PhoneOrientation::Coxswain);
        for s in synthetic_samples(Vector3::new(0.0, 1.0, 0.0)) {
            det.add_sample(&s);
        }
        let outcome = det.finish(6000.0);
        assert!((outcome.record.gravity_magnitude - 9.81).abs() < 0.5);
    }

    #[test]
    fn test_no_motion_is_degraded_not_fatal() {
        let mut det = PcaAxisDetector::new(PhoneOrientation::Coxswain);
        for k in 0..200 {
            det.add_sample(&ImuSample {
                timestamp: k as f64 * 20.0,
                ax: 0.0,
                ay: 0.0,
                az: 9.81,
                gx: 0.0,
                gy: 0.0,
                gz: 0.0,
            });
        }
        let outcome = det.finish(4000.0);
        assert!(outcome.quality.degraded);
        assert_eq!(outcome.quality.grade, QualityGrade::Poor);
        // Gravity frame still usable
        assert!(outcome.basis.vertical.z > 0.99);
    }

    #[test]
    fn test_ambiguous_axes_report_low_confidence() {
        // Equal-energy circular motion in the horizontal plane: no single
        // dominant axis exists.
        let mut det = PcaAxisDetector::new(PhoneOrientation::Coxswain);
        for k in 0..300 {
            let th = k as f64 * 0.7;
            det.add_sample(&ImuSample {
                timestamp: k as f64 * 20.0,
                ax: (3.0 * th.cos()) as f32,
                ay: (3.0 * th.sin()) as f32,
                az: 9.81,
                gx: 0.0,
                gy: 0.0,
                gz: 0.0,
            });
        }
        let outcome = det.finish(6000.0);
        assert!(outcome.quality.degraded);
    }
}
