//! Six-degree-of-freedom pose parameterized as Euler angles + translation.
//!
//! The rotation convention is `R = Rz(rz) * Ry(ry) * Rx(rx)` (roll-pitch-yaw
//! applied in that order), matching `nalgebra::Rotation3::from_euler_angles`.
//! Both the frame-to-frame transform and the world transform use this
//! parameterization, so a pose is exactly the 6-vector the optimizer works
//! on.

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// A rigid transform `(rx, ry, rz, tx, ty, tz)`.
///
/// Composition follows the pose-of-frame reading: if `T_world` is the pose
/// of the sensor in the world and `T_rel` the pose of the new sensor frame
/// in the old one, the new world pose is `T_world.compose(&T_rel)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose6D {
    /// Rotation about X (roll), radians.
    pub rx: f64,
    /// Rotation about Y (pitch), radians.
    pub ry: f64,
    /// Rotation about Z (yaw), radians.
    pub rz: f64,
    /// Translation along X, meters.
    pub tx: f64,
    /// Translation along Y, meters.
    pub ty: f64,
    /// Translation along Z, meters.
    pub tz: f64,
}

impl Default for Pose6D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose6D {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rx: 0.0,
            ry: 0.0,
            rz: 0.0,
            tx: 0.0,
            ty: 0.0,
            tz: 0.0,
        }
    }

    /// Create from the six parameters.
    pub fn new(rx: f64, ry: f64, rz: f64, tx: f64, ty: f64, tz: f64) -> Self {
        Self {
            rx,
            ry,
            rz,
            tx,
            ty,
            tz,
        }
    }

    /// Create from a `[rx, ry, rz, tx, ty, tz]` array.
    pub fn from_array(a: [f64; 6]) -> Self {
        Self::new(a[0], a[1], a[2], a[3], a[4], a[5])
    }

    /// The parameters as a `[rx, ry, rz, tx, ty, tz]` array.
    pub fn to_array(&self) -> [f64; 6] {
        [self.rx, self.ry, self.rz, self.tx, self.ty, self.tz]
    }

    /// Rotation part as a rotation matrix.
    #[inline]
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(self.rx, self.ry, self.rz)
    }

    /// Rotation part as a unit quaternion.
    #[inline]
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(self.rx, self.ry, self.rz)
    }

    /// Translation part.
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.tx, self.ty, self.tz)
    }

    /// Rotation matrix, plain 3x3.
    #[inline]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation().into_inner()
    }

    /// The pose as an isometry.
    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.tx, self.ty, self.tz),
            self.quaternion(),
        )
    }

    /// Recover the six parameters from an isometry.
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let (rx, ry, rz) = iso.rotation.euler_angles();
        Self::new(
            rx,
            ry,
            rz,
            iso.translation.x,
            iso.translation.y,
            iso.translation.z,
        )
    }

    /// Apply the transform to a point: `R p + t`.
    #[inline]
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation() * p + self.translation()
    }

    /// Compose with another pose: `self ⊙ other`.
    pub fn compose(&self, other: &Pose6D) -> Pose6D {
        Self::from_isometry(&(self.isometry() * other.isometry()))
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Pose6D {
        Self::from_isometry(&self.isometry().inverse())
    }

    /// Norm of the translation component.
    #[inline]
    pub fn translation_norm(&self) -> f64 {
        self.translation().norm()
    }

    /// Total rotation angle in radians.
    #[inline]
    pub fn rotation_angle(&self) -> f64 {
        self.quaternion().angle()
    }

    /// All six parameters are finite.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}
