//! Residual blocks produced by feature matching.

use nalgebra::{Matrix3, Vector3};

/// One accepted match, parameterizing the distance function
/// `(R·X + t - P)ᵀ A (R·X + t - P)`.
///
/// `A = I - nnᵀ` for a line with direction `n` and `A = nnᵀ` for a plane
/// with normal `n`. Both forms are idempotent (`A² = A`), so `A` is its own
/// square root and the 3-vector residual is simply `A·(R·X + t - P)`.
#[derive(Clone, Copy, Debug)]
pub struct ResidualBlock {
    /// Symmetric PSD matrix encoding the residual quadratic form.
    pub a: Matrix3<f64>,
    /// Target point on the matched line or plane (mean of the neighborhood).
    pub p: Vector3<f64>,
    /// The keypoint, in the frame the stage optimizes from.
    pub x: Vector3<f64>,
    /// In-sweep acquisition time of the keypoint, in `[0, 1)`.
    pub time: f64,
}

impl ResidualBlock {
    /// Residual vector at a given transformed keypoint position.
    #[inline]
    pub fn residual(&self, x_transformed: &Vector3<f64>) -> Vector3<f64> {
        self.a * (x_transformed - self.p)
    }

    /// Squared distance contribution at a given transformed position.
    #[inline]
    pub fn squared_distance(&self, x_transformed: &Vector3<f64>) -> f64 {
        let e = x_transformed - self.p;
        (e.transpose() * self.a * e)[0]
    }
}
