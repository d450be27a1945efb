//! SLAM engine orchestration.

pub mod slam;

pub use slam::{FrameAnnotations, FrameOutput, FrameStatus, SlamEngine};
