//! Default value functions for serde deserialization.

pub fn neighbor_width() -> usize {
    5
}

pub fn max_edges_per_line() -> usize {
    200
}

pub fn max_planars_per_line() -> usize {
    300
}

pub fn edge_curvature_threshold() -> f64 {
    1.0
}

pub fn plane_curvature_threshold() -> f64 {
    0.1
}

pub fn min_distance_to_sensor() -> f64 {
    1.5
}

pub fn angle_resolution() -> f64 {
    // 0.2 deg, a common azimuthal step for multi-beam sensors.
    0.2f64.to_radians()
}

pub fn beam_grazing_band() -> f64 {
    0.15
}

pub fn depth_gap_relative_threshold() -> f64 {
    0.1
}

pub fn max_dist_between_two_frames() -> f64 {
    5.0
}

pub fn min_match_distance() -> f64 {
    1e-3
}

pub fn max_iterations() -> usize {
    15
}

pub fn icp_period() -> usize {
    5
}

pub fn ego_line_neighbors() -> usize {
    5
}

pub fn mapping_line_neighbors() -> usize {
    7
}

pub fn plane_neighbors() -> usize {
    5
}

pub fn line_factor() -> f64 {
    5.0
}

pub fn plane_factor1() -> f64 {
    10.0
}

pub fn plane_factor2() -> f64 {
    8.0
}

pub fn ego_max_line_distance() -> f64 {
    2.0
}

pub fn ego_max_plane_distance() -> f64 {
    2.0
}

pub fn mapping_max_line_distance() -> f64 {
    1.0
}

pub fn mapping_max_plane_distance() -> f64 {
    1.0
}

pub fn lm_initial_lambda() -> f64 {
    1e-3
}

pub fn lm_lambda_factor() -> f64 {
    10.0
}

pub fn lm_min_lambda() -> f64 {
    1e-7
}

pub fn lm_max_lambda() -> f64 {
    1e7
}

pub fn convergence_threshold() -> f64 {
    1e-6
}

pub fn min_eigenvalue_ratio() -> f64 {
    1e-6
}

pub fn voxel_size() -> f64 {
    1.0
}

pub fn grid_nb_voxel() -> [usize; 3] {
    [50, 50, 50]
}

pub fn pointcloud_nb_voxel() -> usize {
    12
}

pub fn leaf_size() -> f64 {
    0.2
}
