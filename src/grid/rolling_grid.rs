//! Rolling voxel grid: the persistent landmark map.
//!
//! A fixed-capacity 3D array of voxels addressed modulo its dimensions (a
//! toroidal window). The window follows the sensor: when the sensor moves to
//! a new anchor voxel, the slabs that fall out of the window are evicted and
//! their storage is reused for the newly covered space. Each voxel keeps its
//! own leaf-downsampled point bucket, so the map stays bounded both in
//! extent and in density.

use log::trace;
use nalgebra::Vector3;

use crate::config::RollingGridConfig;

use super::voxel_filter::downsample;

#[derive(Clone, Debug, Default)]
struct Voxel {
    /// Continuous voxel coordinate of the bucket content; meaningful only
    /// while `points` is non-empty.
    coord: [i64; 3],
    points: Vec<Vector3<f64>>,
}

/// A rolling voxel map of one landmark class.
#[derive(Clone, Debug)]
pub struct RollingGrid {
    voxel_size: f64,
    leaf_size: f64,
    dims: [i64; 3],
    /// Voxel coordinate of the window's minimum corner.
    anchor: [i64; 3],
    voxels: Vec<Voxel>,
}

impl RollingGrid {
    /// Create an empty grid with the window centered on the origin.
    pub fn new(config: &RollingGridConfig) -> Self {
        let dims = [
            config.grid_nb_voxel[0] as i64,
            config.grid_nb_voxel[1] as i64,
            config.grid_nb_voxel[2] as i64,
        ];
        let anchor = [-dims[0] / 2, -dims[1] / 2, -dims[2] / 2];
        let capacity = (dims[0] * dims[1] * dims[2]) as usize;
        Self {
            voxel_size: config.voxel_size,
            leaf_size: config.leaf_size,
            dims,
            anchor,
            voxels: vec![Voxel::default(); capacity],
        }
    }

    /// Continuous voxel coordinate of a point.
    #[inline]
    fn voxel_of(&self, p: &Vector3<f64>) -> [i64; 3] {
        [
            (p.x / self.voxel_size).floor() as i64,
            (p.y / self.voxel_size).floor() as i64,
            (p.z / self.voxel_size).floor() as i64,
        ]
    }

    #[inline]
    fn in_window(&self, v: &[i64; 3]) -> bool {
        (0..3).all(|k| v[k] >= self.anchor[k] && v[k] < self.anchor[k] + self.dims[k])
    }

    /// Toroidal storage index of a voxel coordinate.
    #[inline]
    fn storage_index(&self, v: &[i64; 3]) -> usize {
        let x = v[0].rem_euclid(self.dims[0]);
        let y = v[1].rem_euclid(self.dims[1]);
        let z = v[2].rem_euclid(self.dims[2]);
        (x + self.dims[0] * (y + self.dims[1] * z)) as usize
    }

    /// Insert points, re-filtering every touched voxel so its bucket stays
    /// bounded. Points outside the current window are dropped.
    pub fn insert(&mut self, points: &[Vector3<f64>]) {
        let mut touched: Vec<usize> = Vec::new();
        let mut outside = 0usize;

        for p in points {
            let v = self.voxel_of(p);
            if !self.in_window(&v) {
                outside += 1;
                continue;
            }
            let idx = self.storage_index(&v);
            let bucket = &mut self.voxels[idx];
            if bucket.points.is_empty() {
                bucket.coord = v;
            }
            debug_assert_eq!(bucket.coord, v);
            bucket.points.push(*p);
            touched.push(idx);
        }

        touched.sort_unstable();
        touched.dedup();
        for idx in touched {
            let bucket = &mut self.voxels[idx];
            bucket.points = downsample(&bucket.points, self.leaf_size);
        }

        if outside > 0 {
            trace!("rolling grid dropped {outside} points outside the window");
        }
    }

    /// Re-center the window on a sensor position, evicting every voxel that
    /// leaves it. Evictions are permanent.
    pub fn set_center(&mut self, center: &Vector3<f64>) {
        let center_voxel = self.voxel_of(center);
        let new_anchor = [
            center_voxel[0] - self.dims[0] / 2,
            center_voxel[1] - self.dims[1] / 2,
            center_voxel[2] - self.dims[2] / 2,
        ];
        if new_anchor == self.anchor {
            return;
        }

        self.anchor = new_anchor;
        let mut evicted = 0usize;
        for bucket in &mut self.voxels {
            if !bucket.points.is_empty() && !(0..3).all(|k| {
                bucket.coord[k] >= new_anchor[k] && bucket.coord[k] < new_anchor[k] + self.dims[k]
            }) {
                evicted += bucket.points.len();
                bucket.points.clear();
            }
        }
        if evicted > 0 {
            trace!("rolling grid evicted {evicted} points on shift");
        }
    }

    /// Concatenation of the buckets inside a bounding box of
    /// `half_extent_voxels` voxels around `center`. Does not mutate the
    /// grid.
    pub fn submap(&self, center: &Vector3<f64>, half_extent_voxels: usize) -> Vec<Vector3<f64>> {
        let c = self.voxel_of(center);
        let he = half_extent_voxels as i64;
        let mut cloud = Vec::new();
        for vz in c[2] - he..=c[2] + he {
            for vy in c[1] - he..=c[1] + he {
                for vx in c[0] - he..=c[0] + he {
                    let v = [vx, vy, vz];
                    if !self.in_window(&v) {
                        continue;
                    }
                    let bucket = &self.voxels[self.storage_index(&v)];
                    if !bucket.points.is_empty() && bucket.coord == v {
                        cloud.extend_from_slice(&bucket.points);
                    }
                }
            }
        }
        cloud
    }

    /// Every stored point (diagnostics and tests).
    pub fn points(&self) -> Vec<Vector3<f64>> {
        let mut cloud = Vec::new();
        for bucket in &self.voxels {
            cloud.extend_from_slice(&bucket.points);
        }
        cloud
    }

    /// Total number of stored points.
    pub fn len(&self) -> usize {
        self.voxels.iter().map(|v| v.points.len()).sum()
    }

    /// Check whether the map holds no points.
    pub fn is_empty(&self) -> bool {
        self.voxels.iter().all(|v| v.points.is_empty())
    }

    /// Drop every stored point; the window stays where it is.
    pub fn clear(&mut self) {
        for bucket in &mut self.voxels {
            bucket.points.clear();
        }
    }

    /// Side of the window along each axis, meters.
    pub fn window_side(&self) -> [f64; 3] {
        [
            self.dims[0] as f64 * self.voxel_size,
            self.dims[1] as f64 * self.voxel_size,
            self.dims[2] as f64 * self.voxel_size,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RollingGridConfig;

    fn small_config() -> RollingGridConfig {
        RollingGridConfig {
            voxel_size: 1.0,
            grid_nb_voxel: [10, 10, 10],
            pointcloud_nb_voxel: 3,
            leaf_size: 0.1,
        }
    }

    #[test]
    fn test_insert_and_submap() {
        let mut grid = RollingGrid::new(&small_config());
        let points = vec![
            Vector3::new(0.5, 0.5, 0.5),
            Vector3::new(1.5, 0.5, 0.5),
            Vector3::new(4.2, 0.5, 0.5),
        ];
        grid.insert(&points);
        assert_eq!(grid.len(), 3);

        let submap = grid.submap(&Vector3::zeros(), 2);
        assert_eq!(submap.len(), 2);
        let all = grid.submap(&Vector3::zeros(), 5);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_points_outside_window_dropped() {
        let mut grid = RollingGrid::new(&small_config());
        grid.insert(&[Vector3::new(100.0, 0.0, 0.0)]);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_window_invariant_holds_after_shift() {
        let mut grid = RollingGrid::new(&small_config());
        for i in 0..5 {
            grid.insert(&[Vector3::new(i as f64, 0.5, 0.5)]);
        }
        // Move the window 20 m along +X: everything near the origin leaves.
        let center = Vector3::new(20.0, 0.0, 0.0);
        grid.set_center(&center);
        let side = grid.window_side();
        for p in grid.points() {
            assert!((p.x - center.x).abs() <= side[0] / 2.0 + 1.0);
        }
    }

    #[test]
    fn test_shift_evicts_trailing_slab() {
        let mut grid = RollingGrid::new(&small_config());
        grid.insert(&[Vector3::new(-4.5, 0.5, 0.5), Vector3::new(4.5, 0.5, 0.5)]);
        assert_eq!(grid.len(), 2);

        // Shift by 2 voxels: the trailing point at x=-4.5 leaves the window.
        grid.set_center(&Vector3::new(2.0, 0.0, 0.0));
        let remaining = grid.points();
        assert_eq!(remaining.len(), 1);
        assert!((remaining[0].x - 4.5).abs() < 1e-12);

        // Shifting back does not resurrect the evicted point.
        grid.set_center(&Vector3::zeros());
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_insert_same_cloud_twice_idempotent() {
        let points: Vec<Vector3<f64>> = (0..40)
            .map(|i| Vector3::new((i % 8) as f64 * 0.5 - 2.0, (i / 8) as f64 * 0.5, 0.5))
            .collect();
        let mut grid = RollingGrid::new(&small_config());
        grid.insert(&points);
        let once: Vec<_> = grid.points();

        grid.insert(&points);
        let twice: Vec<_> = grid.points();
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_in_voxel_downsampling_bounds_bucket() {
        let mut grid = RollingGrid::new(&small_config());
        // 1000 points inside one voxel collapse to at most 10^3 leaves.
        let mut points = Vec::new();
        for i in 0..1000 {
            let t = i as f64 / 1000.0;
            points.push(Vector3::new(0.001 + t * 0.99, 0.5, 0.5));
        }
        grid.insert(&points);
        assert!(grid.len() <= 10);
    }

    #[test]
    fn test_submap_does_not_mutate() {
        let mut grid = RollingGrid::new(&small_config());
        grid.insert(&[Vector3::new(0.5, 0.5, 0.5)]);
        let before = grid.len();
        let _ = grid.submap(&Vector3::zeros(), 4);
        assert_eq!(grid.len(), before);
    }

    #[test]
    fn test_clear() {
        let mut grid = RollingGrid::new(&small_config());
        grid.insert(&[Vector3::new(0.5, 0.5, 0.5)]);
        grid.clear();
        assert!(grid.is_empty());
    }
}
