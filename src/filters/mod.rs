pub mod bandpass;
pub mod complementary;
pub mod kalman;

pub use bandpass::{BandPassFilter, DisplaySmoother, HighPassFilter, LowPassFilter};
pub use complementary::ComplementaryFilter;
pub use kalman::VelocityKalman;
