// lib.rs — boat-frame rowing kinematics from raw phone sensors.
//
// Everything in this crate is independent of any UI, storage, or transport
// layer. Raw IMU/GPS samples go in; orientation, boat-frame acceleration,
// stroke records, and fused boat speed come out. Captures serialize to a
// compact versioned binary layout so recorded sessions can be reprocessed
// offline with different parameters.
//
// Processing chain per IMU sample:
//   complementary filter → gravity removal + axis transform → baseline
//   corrector → band-pass → stroke detector
// GPS fixes feed a scalar Kalman filter on their own pace.

pub mod baseline;
pub mod calibration;
pub mod capture;
pub mod demo;
pub mod filters;
pub mod pipeline;
pub mod stroke;
pub mod transform;
pub mod types;

pub use capture::{Capture, CaptureError, FormatVersion, SessionMetadata, CURRENT_VERSION};
pub use pipeline::{
    CalibrationMode, GpsOutput, ImuOutput, PipelineConfig, SessionStats, StrokePipeline,
};
pub use types::{
    BoatAcceleration, CalibrationData, GpsSample, ImuSample, OrientationEstimate,
    PhoneOrientation, StrokeRecord,
};
