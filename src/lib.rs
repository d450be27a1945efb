//! GatiSLAM - LOAM-style 3D LiDAR odometry and mapping
//!
//! # Architecture
//!
//! The crate is organized in layers, leaves first:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │        (ego-motion, mapping, trajectory)            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │              matching/        grid/                 │  ← Core algorithms
//! │   (kNN + PCA matching, LM)  (rolling voxel map)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │               scan/          motion/                │  ← Frame processing
//! │  (organizer, curvature,   (in-sweep undistortion)   │
//! │    keypoint selection)                              │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, poses)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! Each incoming frame runs through three stages:
//!
//! 1. **Keypoint extraction** - every scan line is analyzed independently;
//!    high-curvature points become edge keypoints, low-curvature points
//!    become planar keypoints.
//! 2. **Ego-motion** - the relative motion since the previous frame is
//!    recovered by matching the new keypoints against the previous frame's
//!    keypoints and minimizing point-to-line / point-to-plane distances with
//!    Levenberg-Marquardt.
//! 3. **Mapping** - the world pose is refined against a rolling voxel map of
//!    accumulated keypoints, and the (undistorted) keypoints are inserted
//!    into the map.
//!
//! The motion inside a sweep is modeled with constant linear and angular
//! velocity, which lets every point be re-expressed at a common sweep time
//! (undistortion).
//!
//! # Quick start
//!
//! ```rust,ignore
//! use gati_slam::{LidarFrame, SlamConfig, SlamEngine};
//!
//! let mut engine = SlamEngine::new(SlamConfig::default());
//! engine.set_sensor_calibration(&[0, 1, 2, 3], 4)?;
//!
//! for frame in frames {
//!     let output = engine.add_frame(&frame)?;
//!     println!("pose: {:?} ({:?})", output.pose, output.status);
//! }
//! ```
//!
//! # Coordinate system
//!
//! Right-handed, X forward, Y left, Z up. The world frame coincides with the
//! sensor frame of the first processed frame.

#![warn(missing_docs)]

// Core types
pub mod core;

// Unified configuration
pub mod config;

// Error types
pub mod error;

// Scan organization and keypoint extraction
pub mod scan;

// In-sweep motion model (undistortion)
pub mod motion;

// Feature matching and pose optimization
pub mod matching;

// Rolling voxel map
pub mod grid;

// SLAM engine orchestration
pub mod engine;

// Re-export commonly used types
pub use crate::core::{Keypoint, Keypoints, LidarFrame, LidarPoint, Pose6D};

pub use config::{
    ConfigError, KeypointConfig, LmConfig, RegistrationConfig, RollingGridConfig, SlamConfig,
};

pub use error::{Result, SlamError};

pub use scan::{OrganizedScan, PointLabel, ScanLine, ScanPoint, SensorCalibration};

pub use matching::{RegistrationOutcome, ResidualBlock};

pub use grid::RollingGrid;

pub use engine::{FrameAnnotations, FrameOutput, FrameStatus, SlamEngine};
