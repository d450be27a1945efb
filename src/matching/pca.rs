//! Principal-component analysis of small point neighborhoods.
//!
//! The eigen-structure of a neighborhood's scatter matrix decides whether it
//! looks like a line (one dominant eigenvalue) or a plane (one vanishing
//! eigenvalue). Run once per candidate match, so it stays allocation-free
//! apart from the eigen decomposition itself.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

/// Mean and sorted eigen-structure of a neighborhood.
#[derive(Clone, Debug)]
pub struct NeighborhoodPca {
    /// Centroid of the neighborhood.
    pub mean: Vector3<f64>,
    /// Eigenvalues sorted descending: `values[0] >= values[1] >= values[2]`.
    pub values: [f64; 3],
    /// Unit eigenvectors, `vectors[i]` paired with `values[i]`.
    pub vectors: [Vector3<f64>; 3],
}

impl NeighborhoodPca {
    /// Direction of the dominant axis (line fit).
    #[inline]
    pub fn line_direction(&self) -> Vector3<f64> {
        self.vectors[0]
    }

    /// Direction of the weakest axis (plane normal).
    #[inline]
    pub fn plane_normal(&self) -> Vector3<f64> {
        self.vectors[2]
    }
}

/// PCA of the scatter matrix of `points`. Returns `None` for degenerate
/// input (fewer than two points).
pub fn neighborhood_pca(points: &[Vector3<f64>]) -> Option<NeighborhoodPca> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean: Vector3<f64> = points.iter().sum::<Vector3<f64>>() / n;

    let mut scatter = Matrix3::zeros();
    for p in points {
        let d = p - mean;
        scatter += d * d.transpose();
    }
    scatter /= n;

    let eigen = SymmetricEigen::new(scatter);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let values = [
        eigen.eigenvalues[order[0]],
        eigen.eigenvalues[order[1]],
        eigen.eigenvalues[order[2]],
    ];
    let vectors = [
        eigen.eigenvectors.column(order[0]).into_owned(),
        eigen.eigenvectors.column(order[1]).into_owned(),
        eigen.eigenvectors.column(order[2]).into_owned(),
    ];

    Some(NeighborhoodPca {
        mean,
        values,
        vectors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_collinear_points_dominant_axis() {
        let dir = Vector3::new(1.0, 2.0, -0.5).normalize();
        let points: Vec<Vector3<f64>> = (0..7).map(|i| dir * (i as f64 * 0.3)).collect();
        let pca = neighborhood_pca(&points).unwrap();
        assert!(pca.values[0] > 1e-3);
        assert!(pca.values[1] < 1e-12);
        assert_relative_eq!(pca.line_direction().dot(&dir).abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_coplanar_points_vanishing_normal_axis() {
        // Points spanning the XY plane.
        let mut points = Vec::new();
        for i in -2..=2 {
            for j in -2..=2 {
                points.push(Vector3::new(i as f64 * 0.2, j as f64 * 0.2, 0.0));
            }
        }
        let pca = neighborhood_pca(&points).unwrap();
        assert!(pca.values[1] > 1e-3);
        assert!(pca.values[2] < 1e-12);
        assert_relative_eq!(
            pca.plane_normal().dot(&Vector3::z()).abs(),
            1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_isotropic_points_similar_eigenvalues() {
        // Octahedron vertices: perfectly isotropic scatter.
        let points = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
        ];
        let pca = neighborhood_pca(&points).unwrap();
        assert_relative_eq!(pca.values[0], pca.values[2], epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(neighborhood_pca(&[]).is_none());
        assert!(neighborhood_pca(&[Vector3::zeros()]).is_none());
    }

    #[test]
    fn test_mean() {
        let points = vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(3.0, 2.0, -2.0)];
        let pca = neighborhood_pca(&points).unwrap();
        assert_relative_eq!(pca.mean, Vector3::new(2.0, 1.0, -1.0), epsilon = 1e-12);
    }
}
