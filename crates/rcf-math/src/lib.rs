//! Random Cut Forest math utilities.

pub mod math;

pub use math::moments::RunningMoments;
pub use math::stable::*;
pub use math::window::WindowedMoments;
