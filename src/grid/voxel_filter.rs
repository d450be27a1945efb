//! Voxel-grid downsampling.
//!
//! Points falling into the same cubic leaf are merged into their centroid,
//! bounding the density of any stored cloud. Leaves are visited in sorted
//! key order so the output is reproducible across runs.

use std::collections::BTreeMap;

use nalgebra::Vector3;

/// Downsample a cloud to one centroid per leaf of side `leaf_size`.
pub fn downsample(points: &[Vector3<f64>], leaf_size: f64) -> Vec<Vector3<f64>> {
    if points.is_empty() || leaf_size <= 0.0 {
        return points.to_vec();
    }

    let mut leaves: BTreeMap<(i64, i64, i64), (Vector3<f64>, usize)> = BTreeMap::new();
    for p in points {
        let key = (
            (p.x / leaf_size).floor() as i64,
            (p.y / leaf_size).floor() as i64,
            (p.z / leaf_size).floor() as i64,
        );
        let entry = leaves.entry(key).or_insert((Vector3::zeros(), 0));
        entry.0 += p;
        entry.1 += 1;
    }

    leaves
        .into_values()
        .map(|(sum, count)| sum / count as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coincident_points_merge() {
        let points = vec![
            Vector3::new(0.01, 0.01, 0.01),
            Vector3::new(0.02, 0.02, 0.02),
            Vector3::new(0.5, 0.5, 0.5),
        ];
        let out = downsample(&points, 0.1);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_merge_averages() {
        let points = vec![Vector3::new(0.02, 0.0, 0.0), Vector3::new(0.06, 0.0, 0.0)];
        let out = downsample(&points, 0.1);
        assert_eq!(out.len(), 1);
        assert!((out[0].x - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_idempotent() {
        let points: Vec<Vector3<f64>> = (0..50)
            .map(|i| Vector3::new(i as f64 * 0.03, (i % 7) as f64 * 0.05, 0.0))
            .collect();
        let once = downsample(&points, 0.1);
        let twice = downsample(&once, 0.1);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_negative_coordinates_bucket_correctly() {
        // Points on both sides of zero must not share a leaf.
        let points = vec![Vector3::new(-0.01, 0.0, 0.0), Vector3::new(0.01, 0.0, 0.0)];
        let out = downsample(&points, 0.1);
        assert_eq!(out.len(), 2);
    }
}
