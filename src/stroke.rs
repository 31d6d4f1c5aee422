//! Stroke boundary detection over the conditioned surge signal.
//!
//! A two-state machine (recovery / drive) driven by threshold crossings.
//! Thresholds come from an injected [`ThresholdProvider`] so fixed and
//! fully-automatic modes share one detector.

use std::collections::VecDeque;

use log::debug;

use crate::types::StrokeRecord;

/// Minimum rise off the drive minimum before an automatic-mode finish is
/// declared [m/s²].
const FINISH_RISE_MARGIN: f64 = 0.15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrokePhase {
    Recovery,
    Drive,
}

/// Supplies catch/finish thresholds to the detector.
///
/// `finish_threshold` returning `None` selects fully-automatic finish
/// placement: the finish lands at the minimum acceleration within the
/// current catch window. The conditioned input is baseline-corrected and
/// band-passed, so it is zero-mean and always dips below zero during a
/// real stroke cycle.
pub trait ThresholdProvider {
    /// Sees every conditioned sample, in order.
    fn observe(&mut self, value: f64, timestamp: f64);
    fn catch_threshold(&self) -> f64;
    fn finish_threshold(&self) -> Option<f64>;
}

/// User-set thresholds, as stored in V1/V2 captures.
pub struct FixedThresholds {
    pub catch: f64,
    pub finish: f64,
}

impl FixedThresholds {
    pub fn new(catch: f64, finish: f64) -> Self {
        Self { catch, finish }
    }
}

impl ThresholdProvider for FixedThresholds {
    fn observe(&mut self, _value: f64, _timestamp: f64) {}

    fn catch_threshold(&self) -> f64 {
        self.catch
    }

    fn finish_threshold(&self) -> Option<f64> {
        Some(self.finish)
    }
}

/// Fully-automatic thresholds: the catch threshold tracks the 90th
/// percentile of a trailing window, the finish is min-tracked by the
/// detector.
pub struct AdaptiveThresholds {
    window: VecDeque<(f64, f64)>, // (timestamp ms, value)
    window_ms: f64,
    fallback_catch: f64,
    min_samples: usize,
}

impl AdaptiveThresholds {
    pub fn new(window_ms: f64, fallback_catch: f64) -> Self {
        Self {
            window: VecDeque::new(),
            window_ms,
            fallback_catch,
            min_samples: 25,
        }
    }
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self::new(6000.0, 0.6)
    }
}

impl ThresholdProvider for AdaptiveThresholds {
    fn observe(&mut self, value: f64, timestamp: f64) {
        if !value.is_finite() {
            return;
        }
        self.window.push_back((timestamp, value));
        while let Some(&(t0, _)) = self.window.front() {
            if timestamp - t0 > self.window_ms {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn catch_threshold(&self) -> f64 {
        if self.window.len() < self.min_samples {
            return self.fallback_catch;
        }
        let mut values: Vec<f64> = self.window.iter().map(|&(_, v)| v).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((values.len() as f64 * 0.9).ceil() as usize).min(values.len()) - 1;
        values[idx]
    }

    fn finish_threshold(&self) -> Option<f64> {
        None
    }
}

/// Threshold-crossing state machine emitting one record per completed
/// catch→catch cycle. Fewer than two catches yields no records — that is
/// normal output, not an error.
pub struct StrokeDetector {
    provider: Box<dyn ThresholdProvider>,
    phase: StrokePhase,
    last_catch: Option<f64>,
    last_finish: Option<f64>,
    drive_min: f64,
    drive_min_time: f64,
    stroke_count: u64,
}

impl StrokeDetector {
    pub fn new(provider: Box<dyn ThresholdProvider>) -> Self {
        Self {
            provider,
            phase: StrokePhase::Recovery,
            last_catch: None,
            last_finish: None,
            drive_min: 0.0,
            drive_min_time: 0.0,
            stroke_count: 0,
        }
    }

    pub fn phase(&self) -> StrokePhase {
        self.phase
    }

    /// Completed strokes so far. The first one is produced before the
    /// filters settle; callers discard it from any aggregate.
    pub fn stroke_count(&self) -> u64 {
        self.stroke_count
    }

    /// Feed one conditioned surge sample. Returns a record when a full
    /// cycle has just closed (at the following catch).
    pub fn update(&mut self, value: f64, timestamp: f64) -> Option<StrokeRecord> {
        if !value.is_finite() || !timestamp.is_finite() {
            return None;
        }
        self.provider.observe(value, timestamp);

        match self.phase {
            StrokePhase::Recovery => {
                if value > self.provider.catch_threshold() {
                    let record = self.close_cycle(timestamp);
                    self.phase = StrokePhase::Drive;
                    self.last_catch = Some(timestamp);
                    self.last_finish = None;
                    self.drive_min = value;
                    self.drive_min_time = timestamp;
                    return record;
                }
                None
            }
            StrokePhase::Drive => {
                if value < self.drive_min {
                    self.drive_min = value;
                    self.drive_min_time = timestamp;
                }
                let finished = match self.provider.finish_threshold() {
                    Some(threshold) => {
                        if value < threshold {
                            self.last_finish = Some(timestamp);
                            true
                        } else {
                            false
                        }
                    }
                    // Automatic mode: wait for the signal to turn back up
                    // off its minimum, then place the finish at the minimum.
                    None => {
                        if self.drive_min < 0.0 && value > self.drive_min + FINISH_RISE_MARGIN {
                            self.last_finish = Some(self.drive_min_time);
                            true
                        } else {
                            false
                        }
                    }
                };
                if finished {
                    self.phase = StrokePhase::Recovery;
                }
                None
            }
        }
    }

    /// On a catch: emit the record for the cycle that just ended, if its
    /// boundaries are well-ordered (catch < finish < next catch).
    fn close_cycle(&mut self, next_catch: f64) -> Option<StrokeRecord> {
        let catch = self.last_catch?;
        let finish = self.last_finish?;
        let drive = finish - catch;
        let recovery = next_catch - finish;
        if drive <= 0.0 || recovery <= 0.0 {
            return None;
        }
        let period = drive + recovery;
        let record = StrokeRecord {
            catch_time: catch,
            finish_time: finish,
            drive_time_ms: drive,
            recovery_time_ms: recovery,
            stroke_rate_spm: (60_000.0 / period).round() as u32,
            drive_percent: 100.0 * drive / period,
        };
        self.stroke_count += 1;
        debug!(
            "stroke {}: {} spm, drive {:.0}%",
            self.stroke_count, record.stroke_rate_spm, record.drive_percent
        );
        Some(record)
    }

    pub fn reset(&mut self) {
        self.phase = StrokePhase::Recovery;
        self.last_catch = None;
        self.last_finish = None;
        self.drive_min = 0.0;
        self.drive_min_time = 0.0;
        self.stroke_count = 0;
    }
}
