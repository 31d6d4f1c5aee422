//! Device frame → boat frame.
//!
//! Gravity is removed using the live attitude estimate, then the residual
//! linear acceleration is projected onto the calibrated boat axes. Pure and
//! stateless: the same inputs always produce the same output.

use nalgebra::Vector3;

use crate::calibration::BoatBasis;
use crate::types::{BoatAcceleration, CalibrationData, ImuSample, OrientationEstimate, PhoneOrientation};

/// Map one raw sample into boat-frame acceleration.
///
/// The gravity magnitude comes from the calibration record; its direction in
/// the device frame comes from the current orientation estimate. The
/// `mounting` multiplier flips surge/sway for a rower-facing phone (screen
/// toward the stern) so surge stays bow-positive either way.
pub fn boat_acceleration(
    sample: &ImuSample,
    orientation: &OrientationEstimate,
    calibration: &CalibrationData,
    basis: &BoatBasis,
    mounting: PhoneOrientation,
) -> BoatAcceleration {
    let pitch = orientation.pitch.to_radians();
    let roll = orientation.roll.to_radians();
    let g = calibration.gravity_magnitude as f64;

    // Gravity reaction in the device frame at the estimated attitude; the
    // same tilt model the calibrators and orientation filter use.
    let gravity = Vector3::new(
        g * roll.sin() * pitch.cos(),
        g * pitch.sin(),
        g * pitch.cos() * roll.cos(),
    );

    let accel = Vector3::new(sample.ax as f64, sample.ay as f64, sample.az as f64);
    let linear = accel - gravity;

    let sign = match mounting {
        PhoneOrientation::Rower => -1.0,
        PhoneOrientation::Coxswain => 1.0,
    };

    BoatAcceleration {
        surge: sign * linear.dot(&basis.forward),
        sway: sign * linear.dot(&basis.lateral),
        heave: linear.dot(&basis.vertical),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{AxisCalibrationStrategy, StaticGravityCalibrator};

    fn sample(ax: f64, ay: f64, az: f64) -> ImuSample {
        ImuSample {
            timestamp: 0.0,
            ax: ax as f32,
            ay: ay as f32,
            az: az as f32,
            gx: 0.0,
            gy: 0.0,
            gz: 0.0,
        }
    }

    fn level() -> (CalibrationData, BoatBasis) {
        (
            CalibrationData {
                gravity_magnitude: 9.81,
                ..CalibrationData::default()
            },
            BoatBasis::canonical(),
        )
    }

    #[test]
    fn test_at_rest_level_is_zero() {
        let (cal, basis) = level();
        let out = boat_acceleration(
            &sample(0.0, 0.0, 9.81),
            &OrientationEstimate::default(),
            &cal,
            &basis,
            PhoneOrientation::Coxswain,
        );
        approx::assert_relative_eq!(out.surge, 0.0, epsilon = 1e-6);
        approx::assert_relative_eq!(out.sway, 0.0, epsilon = 1e-6);
        approx::assert_relative_eq!(out.heave, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_surge_maps_device_y() {
        let (cal, basis) = level();
        let out = boat_acceleration(
            &sample(0.0, 1.5, 9.81),
            &OrientationEstimate::default(),
            &cal,
            &basis,
            PhoneOrientation::Coxswain,
        );
        assert!((out.surge - 1.5).abs() < 1e-6);
        assert!(out.sway.abs() < 1e-6);
    }

    #[test]
    fn test_rower_mounting_flips_surge_and_sway_only() {
        let (cal, basis) = level();
        let orientation = OrientationEstimate::default();
        let s = sample(0.4, 1.5, 10.3);
        let cox = boat_acceleration(&s, &orientation, &cal, &basis, PhoneOrientation::Coxswain);
        let rower = boat_acceleration(&s, &orientation, &cal, &basis, PhoneOrientation::Rower);
        assert!((rower.surge + cox.surge).abs() < 1e-9);
        assert!((rower.sway + cox.sway).abs() < 1e-9);
        assert!((rower.heave - cox.heave).abs() < 1e-9);
    }

    #[test]
    fn test_tilted_mount_residual_surge_below_threshold() {
        // Device pitched 8°; calibrate on at-rest samples, then verify a
        // known surge impulse along the boat axis comes back clean.
        let pitch = 8.0_f64.to_radians();
        let g = 9.81;
        let rest = sample(0.0, g * pitch.sin(), g * pitch.cos());

        let mut cal = StaticGravityCalibrator::new();
        for _ in 0..200 {
            cal.add_sample(&rest);
        }
        let outcome = cal.finish(0.0);

        // True surge of 2.0 m/s² along the boat forward axis. The boat
        // forward axis in device coordinates is Y rotated by the mount pitch.
        let surge_true = 2.0;
        let moving = sample(
            0.0,
            g * pitch.sin() + surge_true * pitch.cos(),
            g * pitch.cos() - surge_true * pitch.sin(),
        );
        // Orientation filter converged on the mount attitude
        let orientation = OrientationEstimate {
            pitch: 8.0,
            roll: 0.0,
            yaw: 0.0,
        };
        let out = boat_acceleration(
            &moving,
            &orientation,
            &outcome.record,
            &outcome.basis,
            PhoneOrientation::Coxswain,
        );
        assert!(
            (out.surge - surge_true).abs() < 0.1,
            "residual surge error: {}",
            (out.surge - surge_true).abs()
        );
    }
}
