//! k-d tree wrapper over a 3D point set.

use kiddo::float::kdtree::KdTree as FloatKdTree;
use kiddo::SquaredEuclidean;
use nalgebra::Vector3;

/// Bucket size large enough to hold many points sharing a coordinate on one
/// axis (e.g. coplanar keypoints), which the default bucket size of 32 is
/// too small for.
type KdTree = FloatKdTree<f64, u64, 3, 256, u32>;

/// A point cloud indexed for nearest-neighbor queries.
///
/// The tree stores indices into the cloud it was built from; queries return
/// `(index, squared_distance)` pairs sorted by distance.
pub struct PointIndex {
    tree: KdTree,
    len: usize,
}

impl PointIndex {
    /// Build an index over a point set.
    pub fn build(points: &[Vector3<f64>]) -> Self {
        let mut tree: KdTree = KdTree::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], i as u64);
        }
        Self {
            tree,
            len: points.len(),
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `k` nearest neighbors of `query`, closest first.
    pub fn nearest_n(&self, query: &Vector3<f64>, k: usize) -> Vec<(usize, f64)> {
        self.tree
            .nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], k)
            .into_iter()
            .map(|n| (n.item as usize, n.distance))
            .collect()
    }
}
