// pipeline.rs — one session's processing chain, end to end.
//
// Everything here is synchronous and single-writer: two independently paced
// streams (IMU, GPS) feed shared filter state, one sample at a time. Every
// update is O(1) and self-contained, so stopping a session is just stopping
// the feed. Concurrent sessions get fully independent `StrokePipeline`
// instances.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::baseline::BaselineCorrector;
use crate::calibration::{
    AxisCalibrationStrategy, CalibrationOutcome, PcaAxisDetector, StaticGravityCalibrator,
};
use crate::filters::{BandPassFilter, ComplementaryFilter, DisplaySmoother, VelocityKalman};
use crate::stroke::{
    AdaptiveThresholds, FixedThresholds, StrokeDetector, StrokePhase, ThresholdProvider,
};
use crate::transform;
use crate::types::{
    BoatAcceleration, GpsSample, ImuSample, OrientationEstimate, PhoneOrientation, StrokeRecord,
};

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    // ── Orientation filter ──
    pub orientation_alpha: f64,

    // ── Signal conditioning ──
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub display_smoothing: f64,
    pub baseline_window_ms: f64,

    // ── Stroke detection ──
    pub catch_threshold: f64,
    pub finish_threshold: f64,
    /// Fully-automatic mode: percentile catch threshold, min-tracked finish.
    pub adaptive_thresholds: bool,

    // ── Velocity fusion ──
    pub velocity_process_noise: f64,
    pub gps_measurement_noise: f64,
    pub imu_measurement_noise: f64,

    // ── Mounting ──
    pub phone_orientation: PhoneOrientation,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            orientation_alpha: 0.98,
            highpass_hz: 0.3,
            lowpass_hz: 1.2,
            display_smoothing: 0.85,
            baseline_window_ms: 3000.0,
            catch_threshold: 0.6,
            finish_threshold: -0.3,
            adaptive_thresholds: false,
            velocity_process_noise: 0.01,
            gps_measurement_noise: 0.5,
            imu_measurement_noise: 0.1,
            phone_orientation: PhoneOrientation::Rower,
        }
    }
}

/// Which calibration strategy to run for this session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationMode {
    /// Boat held still; gravity averaged into tilt offsets.
    Static,
    /// No user action; bow axis inferred from motion variance.
    Automatic,
}

/// Per-IMU-sample output.
#[derive(Clone, Copy, Debug)]
pub struct ImuOutput {
    pub orientation: OrientationEstimate,
    pub boat: BoatAcceleration,
    /// Baseline-corrected, band-passed surge — what the detector sees.
    pub conditioned_surge: f64,
    /// Heavily smoothed surge for display only.
    pub display_surge: f64,
    pub stroke: Option<StrokeRecord>,
}

/// Per-GPS-sample output.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GpsOutput {
    pub fused_velocity: f64, // m/s
    /// Seconds per 500 m at the current fused velocity.
    pub split_500m: Option<f64>,
}

/// Aggregate session metrics. The first stroke record is excluded from the
/// averages: it is produced before the filters settle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStats {
    pub stroke_count: usize,
    pub average_spm: Option<f64>,
    pub average_drive_percent: Option<f64>,
    pub fused_velocity: f64,
    pub split_500m: Option<f64>,
    /// Degraded-quality signal, not an error: the session produced no
    /// detectable strokes.
    pub no_strokes_detected: bool,
}

pub struct StrokePipeline {
    config: PipelineConfig,
    orientation: ComplementaryFilter,
    baseline: BaselineCorrector,
    bandpass: BandPassFilter,
    display: DisplaySmoother,
    detector: StrokeDetector,
    velocity: VelocityKalman,
    calibration: CalibrationOutcome,
    calibrator: Option<Box<dyn AxisCalibrationStrategy>>,
    records: Vec<StrokeRecord>,
    last_imu_timestamp: Option<f64>,
    last_calibration_timestamp: f64,
    imu_count: u64,
    gps_count: u64,
}

impl StrokePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let provider: Box<dyn ThresholdProvider> = if config.adaptive_thresholds {
            Box::new(AdaptiveThresholds::default())
        } else {
            Box::new(FixedThresholds::new(
                config.catch_threshold,
                config.finish_threshold,
            ))
        };
        Self {
            orientation: ComplementaryFilter::new(config.orientation_alpha),
            baseline: BaselineCorrector::new(config.baseline_window_ms),
            bandpass: BandPassFilter::new(config.highpass_hz, config.lowpass_hz),
            display: DisplaySmoother::new(config.display_smoothing),
            detector: StrokeDetector::new(provider),
            velocity: VelocityKalman::new(
                config.velocity_process_noise,
                config.gps_measurement_noise,
                config.imu_measurement_noise,
            ),
            calibration: CalibrationOutcome::uncalibrated(),
            calibrator: None,
            records: Vec::new(),
            last_imu_timestamp: None,
            last_calibration_timestamp: 0.0,
            imu_count: 0,
            gps_count: 0,
            config,
        }
    }

    /// Feed one IMU sample. Samples must arrive in non-decreasing timestamp
    /// order; an out-of-order sample is processed with Δt = 0 and logged,
    /// never rejected.
    pub fn process_imu_sample(&mut self, sample: &ImuSample) -> ImuOutput {
        let dt = match self.last_imu_timestamp {
            Some(t0) if sample.timestamp < t0 => {
                warn!(
                    "IMU timestamp went backwards ({:.1} → {:.1} ms); skipping integration",
                    t0, sample.timestamp
                );
                0.0
            }
            Some(t0) => (sample.timestamp - t0) / 1000.0,
            None => 0.0,
        };
        self.last_imu_timestamp = Some(sample.timestamp);
        self.imu_count += 1;

        let orientation = self.orientation.update(sample);
        let boat = transform::boat_acceleration(
            sample,
            &orientation,
            &self.calibration.record,
            &self.calibration.basis,
            self.config.phone_orientation,
        );

        self.velocity.predict(boat.surge, dt);

        let in_recovery = self.detector.phase() == StrokePhase::Recovery;
        let corrected = self.baseline.apply(boat.surge, sample.timestamp, in_recovery);
        let conditioned = self.bandpass.update(corrected, dt);
        let display = self.display.update(conditioned);

        let stroke = self.detector.update(conditioned, sample.timestamp);
        if let Some(record) = stroke {
            self.records.push(record);
        }

        ImuOutput {
            orientation,
            boat,
            conditioned_surge: conditioned,
            display_surge: display,
            stroke,
        }
    }

    /// Feed one GPS fix and return the fused speed and split.
    pub fn process_gps_sample(&mut self, sample: &GpsSample) -> GpsOutput {
        self.gps_count += 1;
        self.velocity.update_gps(sample.speed as f64);
        let fused = self.velocity.velocity();
        GpsOutput {
            fused_velocity: fused,
            split_500m: split_500m(fused),
        }
    }

    /// Begin collecting calibration samples with the chosen strategy. Any
    /// in-progress calibration is replaced.
    pub fn start_calibration(&mut self, mode: CalibrationMode) {
        self.calibrator = Some(match mode {
            CalibrationMode::Static => Box::new(StaticGravityCalibrator::new()),
            CalibrationMode::Automatic => {
                Box::new(PcaAxisDetector::new(self.config.phone_orientation))
            }
        });
    }

    pub fn add_calibration_sample(&mut self, sample: &ImuSample) {
        if let Some(calibrator) = self.calibrator.as_mut() {
            calibrator.add_sample(sample);
            self.last_calibration_timestamp = sample.timestamp;
        }
    }

    pub fn calibration_sample_count(&self) -> usize {
        self.calibrator.as_ref().map_or(0, |c| c.sample_count())
    }

    pub fn calibration_ready(&self) -> bool {
        self.calibrator.as_ref().is_some_and(|c| c.is_ready())
    }

    /// Finish the in-progress calibration and make its result the session's
    /// active calibration. Returns `None` when none was started.
    pub fn complete_calibration(&mut self) -> Option<CalibrationOutcome> {
        let mut calibrator = self.calibrator.take()?;
        let outcome = calibrator.finish(self.last_calibration_timestamp);
        self.install_calibration(outcome.clone());
        Some(outcome)
    }

    /// Install a calibration directly (e.g. one persisted in a capture) and
    /// restart the signal chain so stale filter state cannot leak across the
    /// axis change.
    pub fn install_calibration(&mut self, outcome: CalibrationOutcome) {
        info!(
            "calibration installed: pitch {:.2}°, roll {:.2}°, grade {:?}",
            outcome.record.pitch_offset, outcome.record.roll_offset, outcome.quality.grade
        );
        self.calibration = outcome;
        self.baseline.reset();
        self.bandpass.reset();
        self.display.reset();
        self.detector.reset();
    }

    pub fn calibration(&self) -> &CalibrationOutcome {
        &self.calibration
    }

    pub fn strokes(&self) -> &[StrokeRecord] {
        &self.records
    }

    pub fn fused_velocity(&self) -> f64 {
        self.velocity.velocity()
    }

    pub fn sample_counts(&self) -> (u64, u64) {
        (self.imu_count, self.gps_count)
    }

    pub fn session_stats(&self) -> SessionStats {
        // Skip the first record: it spans the filters' settling time.
        let settled = if self.records.len() > 1 {
            &self.records[1..]
        } else {
            &[]
        };
        let (average_spm, average_drive_percent) = if settled.is_empty() {
            (None, None)
        } else {
            let n = settled.len() as f64;
            (
                Some(settled.iter().map(|r| r.stroke_rate_spm as f64).sum::<f64>() / n),
                Some(settled.iter().map(|r| r.drive_percent).sum::<f64>() / n),
            )
        };
        let fused = self.velocity.velocity();
        SessionStats {
            stroke_count: self.records.len(),
            average_spm,
            average_drive_percent,
            fused_velocity: fused,
            split_500m: split_500m(fused),
            no_strokes_detected: self.records.is_empty(),
        }
    }
}

/// Split time in seconds per 500 m; undefined below walking pace.
pub fn split_500m(velocity: f64) -> Option<f64> {
    if velocity > 0.5 {
        Some(500.0 / velocity)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn level_sample(t: f64) -> ImuSample {
        ImuSample {
            timestamp: t,
            ax: 0.0,
            ay: 0.0,
            az: 9.81,
            gx: 0.0,
            gy: 0.0,
            gz: 0.0,
        }
    }

    /// Rower-mounted phone: device +Y points sternward, so boat surge s
    /// appears as −s on the device Y axis.
    fn rowing_sample(t_ms: f64, surge: f64) -> ImuSample {
        ImuSample {
            timestamp: t_ms,
            ax: 0.0,
            ay: (-surge) as f32,
            az: 9.81,
            gx: 0.0,
            gy: 0.0,
            gz: 0.0,
        }
    }

    fn calibrated_pipeline(config: PipelineConfig) -> StrokePipeline {
        let mut p = StrokePipeline::new(config);
        p.start_calibration(CalibrationMode::Static);
        for i in 0..200 {
            p.add_calibration_sample(&level_sample(i as f64 * 20.0));
        }
        assert!(p.calibration_ready());
        let outcome = p.complete_calibration().unwrap();
        assert!(!outcome.quality.degraded);
        p
    }

    #[test]
    fn test_full_session_detects_strokes() {
        let mut p = calibrated_pipeline(PipelineConfig::default());
        // 20 s of 50 Hz rowing at ~25 SPM after the 4 s calibration hold
        for i in 0..1000 {
            let t = i as f64 * 0.02;
            let surge = 2.0 * (2.0 * PI * 0.42 * t).sin();
            p.process_imu_sample(&rowing_sample(4000.0 + t * 1000.0, surge));
        }
        let records = p.strokes();
        assert!(records.len() >= 4, "got {} records", records.len());
        for r in records.iter().skip(2) {
            assert!(
                (23..=27).contains(&r.stroke_rate_spm),
                "spm {}",
                r.stroke_rate_spm
            );
        }
        for pair in records.windows(2) {
            assert!(pair[0].catch_time < pair[0].finish_time);
            assert!(pair[0].finish_time < pair[1].catch_time);
            assert!(pair[0].drive_percent > 0.0 && pair[0].drive_percent < 100.0);
        }
        let stats = p.session_stats();
        assert!(!stats.no_strokes_detected);
        assert!(stats.average_spm.is_some());
    }

    #[test]
    fn test_quiet_session_yields_zero_strokes() {
        let mut p = calibrated_pipeline(PipelineConfig::default());
        for i in 0..500 {
            p.process_imu_sample(&level_sample(4000.0 + i as f64 * 20.0));
        }
        assert!(p.strokes().is_empty());
        let stats = p.session_stats();
        assert!(stats.no_strokes_detected);
        assert_eq!(stats.average_spm, None);
    }

    #[test]
    fn test_gps_fusion_and_split() {
        let mut p = calibrated_pipeline(PipelineConfig::default());
        let mut out = GpsOutput {
            fused_velocity: 0.0,
            split_500m: None,
        };
        for i in 0..30 {
            out = p.process_gps_sample(&GpsSample {
                timestamp: i as f64 * 1000.0,
                latitude: 53.5,
                longitude: 10.0,
                speed: 4.0,
                heading: 90.0,
                accuracy: 5.0,
            });
        }
        assert!((out.fused_velocity - 4.0).abs() < 0.2);
        let split = out.split_500m.unwrap();
        assert!((split - 125.0).abs() < 8.0);
    }

    #[test]
    fn test_stationary_gps_has_no_split() {
        let mut p = StrokePipeline::new(PipelineConfig::default());
        let out = p.process_gps_sample(&GpsSample {
            timestamp: 0.0,
            latitude: 53.5,
            longitude: 10.0,
            speed: 0.0,
            heading: 0.0,
            accuracy: 5.0,
        });
        assert_eq!(out.split_500m, None);
    }

    #[test]
    fn test_tilted_mount_still_detects() {
        // Phone pitched 10° in its mount; static calibration absorbs it.
        let pitch = 10.0_f64.to_radians();
        let g = 9.81;
        let mut p = StrokePipeline::new(PipelineConfig::default());
        p.start_calibration(CalibrationMode::Static);
        for i in 0..200 {
            p.add_calibration_sample(&ImuSample {
                timestamp: i as f64 * 20.0,
                ax: 0.0,
                ay: (g * pitch.sin()) as f32,
                az: (g * pitch.cos()) as f32,
                gx: 0.0,
                gy: 0.0,
                gz: 0.0,
            });
        }
        let outcome = p.complete_calibration().unwrap();
        assert!((outcome.record.pitch_offset - (-10.0)).abs() < 1.0);

        // Boat surge s in the tilted device frame: forward axis is
        // (0, cos p, −sin p), stern-facing mount negates it.
        for i in 0..1000 {
            let t = i as f64 * 0.02;
            let s = 2.0 * (2.0 * PI * 0.42 * t).sin();
            p.process_imu_sample(&ImuSample {
                timestamp: 4000.0 + t * 1000.0,
                ax: 0.0,
                ay: (g * pitch.sin() - s * pitch.cos()) as f32,
                az: (g * pitch.cos() + s * pitch.sin()) as f32,
                gx: 0.0,
                gy: 0.0,
                gz: 0.0,
            });
        }
        assert!(p.strokes().len() >= 4, "got {}", p.strokes().len());
    }

    #[test]
    fn test_out_of_order_sample_does_not_corrupt() {
        let mut p = calibrated_pipeline(PipelineConfig::default());
        p.process_imu_sample(&level_sample(5000.0));
        let out = p.process_imu_sample(&level_sample(4500.0)); // backwards
        assert!(out.conditioned_surge.is_finite());
        let out = p.process_imu_sample(&level_sample(5020.0));
        assert!(out.conditioned_surge.is_finite());
    }

    #[test]
    fn test_nan_sample_does_not_corrupt() {
        let mut p = calibrated_pipeline(PipelineConfig::default());
        p.process_imu_sample(&level_sample(4000.0));
        let mut bad = level_sample(4020.0);
        bad.ax = f32::NAN;
        let out = p.process_imu_sample(&bad);
        assert!(out.orientation.pitch.is_finite());
        let out = p.process_imu_sample(&level_sample(4040.0));
        assert!(out.conditioned_surge.is_finite());
        assert!(out.boat.surge.is_finite());
    }

    #[test]
    fn test_complete_without_start_is_none() {
        let mut p = StrokePipeline::new(PipelineConfig::default());
        assert!(p.complete_calibration().is_none());
    }
}
