//! In-sweep motion model.
//!
//! The sensor is assumed to move with constant linear and angular velocity
//! over one sweep. Given the sweep transform `T` (pose of the sensor at the
//! sweep end, expressed in the sweep-start frame) and a normalized
//! acquisition time `s`, the pose of the sensor at time `s` is
//! `T(s) = slerp(I, T; s)`: quaternion slerp on the rotation, linear
//! interpolation on the translation.
//!
//! Two re-expressions are derived from it:
//! - [`transform_to_start`] moves a point from the frame it was acquired in
//!   to the sweep-start frame (`T(s) · p`);
//! - [`transform_to_end`] moves it to the sweep-end frame
//!   (`T(1)⁻¹ · T(s) · p`).
//!
//! Removing the deformation that intra-sweep motion induces on the cloud is
//! what the literature calls undistortion.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::core::Pose6D;

/// Interpolated sensor pose at normalized sweep time `s`, in the sweep-start
/// frame.
pub fn interpolate(sweep: &Pose6D, s: f64) -> Isometry3<f64> {
    let rotation = UnitQuaternion::identity()
        .slerp(&sweep.quaternion(), s);
    let translation = Translation3::from(sweep.translation() * s);
    Isometry3::from_parts(translation, rotation)
}

/// Re-express a point acquired at time `s` in the sweep-start frame.
#[inline]
pub fn transform_to_start(p: &Vector3<f64>, s: f64, sweep: &Pose6D) -> Vector3<f64> {
    interpolate(sweep, s).transform_point(&(*p).into()).coords
}

/// Re-express a point acquired at time `s` in the sweep-end frame.
#[inline]
pub fn transform_to_end(p: &Vector3<f64>, s: f64, sweep: &Pose6D) -> Vector3<f64> {
    let to_start = transform_to_start(p, s, sweep);
    sweep
        .isometry()
        .inverse_transform_point(&to_start.into())
        .coords
}

/// Interpolated pose as scaled Euler parameters: `(s·rx, s·ry, s·rz, s·t)`.
///
/// The optimizer differentiates its residuals analytically w.r.t. the six
/// pose parameters; scaling the Euler angles keeps those derivatives in
/// closed form. Scaled Euler agrees with the slerp interpolation to first
/// order in the rotation angle, which is ample for one-sweep rotations.
#[inline]
pub fn scaled_pose(sweep: &Pose6D, s: f64) -> Pose6D {
    Pose6D::new(
        sweep.rx * s,
        sweep.ry * s,
        sweep.rz * s,
        sweep.tx * s,
        sweep.ty * s,
        sweep.tz * s,
    )
}
