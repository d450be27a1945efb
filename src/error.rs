//! Error types for GatiSLAM

use thiserror::Error;

/// GatiSLAM error type.
///
/// Only conditions that make a call unusable are surfaced as errors; a bad
/// frame never fails `add_frame`, it is reported through the frame status
/// instead.
#[derive(Error, Debug)]
pub enum SlamError {
    /// `add_frame` was called before `set_sensor_calibration`.
    #[error("sensor calibration has not been provided")]
    CalibrationMissing,

    /// The supplied laser-id mapping is unusable.
    #[error("invalid sensor calibration: {0}")]
    InvalidCalibration(String),

    /// Configuration validation failed.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SlamError>;
