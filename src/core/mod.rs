//! Core types shared by every layer.

pub mod pose;
pub mod types;

pub use pose::Pose6D;
pub use types::{Keypoint, Keypoints, LidarFrame, LidarPoint};
