//! Scan organization and keypoint extraction (pipeline stages A-C).

pub mod curvature;
pub mod keypoints;
pub mod organizer;

pub use curvature::LineFeatures;
pub use keypoints::{ExtractionResult, PointLabel};
pub use organizer::{OrganizedScan, ScanLine, ScanPoint, SensorCalibration};
