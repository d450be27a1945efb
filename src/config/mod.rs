//! Unified configuration for the SLAM engine.
//!
//! Every numerical knob of the pipeline lives here, grouped by stage. The
//! whole tree round-trips through YAML so a session can be tuned without
//! recompiling.

mod defaults;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation / loading error.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The YAML document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Keypoint extraction settings (stages A-C).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeypointConfig {
    /// Half-window `W` used for curvature and depth-gap computation.
    #[serde(default = "defaults::neighbor_width")]
    pub neighbor_width: usize,

    /// Maximum number of edge keypoints selected per scan line.
    #[serde(default = "defaults::max_edges_per_line")]
    pub max_edges_per_line: usize,

    /// Maximum number of planar keypoints selected per scan line.
    #[serde(default = "defaults::max_planars_per_line")]
    pub max_planars_per_line: usize,

    /// Curvature at or above this classifies a point as an edge candidate.
    #[serde(default = "defaults::edge_curvature_threshold")]
    pub edge_curvature_threshold: f64,

    /// Curvature at or below this classifies a point as a planar candidate.
    #[serde(default = "defaults::plane_curvature_threshold")]
    pub plane_curvature_threshold: f64,

    /// Points closer to the sensor than this are rejected (meters).
    #[serde(default = "defaults::min_distance_to_sensor")]
    pub min_distance_to_sensor: f64,

    /// Azimuthal resolution of the sensor (radians). Sets the expected
    /// lateral spacing `range * angle_resolution` between consecutive points
    /// of a line, which scales the grazing-surface validity check.
    #[serde(default = "defaults::angle_resolution")]
    pub angle_resolution: f64,

    /// Half-width of the rejection band around a grazing viewing angle.
    /// The check compares `|cos|` of the ray/chord angle against
    /// `cos(band)`; larger values reject more points.
    #[serde(default = "defaults::beam_grazing_band")]
    pub beam_grazing_band: f64,

    /// A depth gap larger than this fraction of the local range marks an
    /// occlusion boundary; the occluded side of the gap is rejected.
    #[serde(default = "defaults::depth_gap_relative_threshold")]
    pub depth_gap_relative_threshold: f64,
}

impl Default for KeypointConfig {
    fn default() -> Self {
        Self {
            neighbor_width: defaults::neighbor_width(),
            max_edges_per_line: defaults::max_edges_per_line(),
            max_planars_per_line: defaults::max_planars_per_line(),
            edge_curvature_threshold: defaults::edge_curvature_threshold(),
            plane_curvature_threshold: defaults::plane_curvature_threshold(),
            min_distance_to_sensor: defaults::min_distance_to_sensor(),
            angle_resolution: defaults::angle_resolution(),
            beam_grazing_band: defaults::beam_grazing_band(),
            depth_gap_relative_threshold: defaults::depth_gap_relative_threshold(),
        }
    }
}

/// Levenberg-Marquardt schedule.
///
/// LM blends between Gauss-Newton (fast near the solution) and gradient
/// descent (robust far from it). Lambda shrinks on accepted steps and grows
/// on rejected ones.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LmConfig {
    /// Initial damping factor.
    #[serde(default = "defaults::lm_initial_lambda")]
    pub initial_lambda: f64,

    /// Factor to scale lambda up (rejected step) or down (accepted step).
    #[serde(default = "defaults::lm_lambda_factor")]
    pub lambda_factor: f64,

    /// Lambda floor after successful steps.
    #[serde(default = "defaults::lm_min_lambda")]
    pub min_lambda: f64,

    /// Lambda ceiling; exceeding it stops the stage.
    #[serde(default = "defaults::lm_max_lambda")]
    pub max_lambda: f64,

    /// Stop when the parameter step norm drops below this.
    #[serde(default = "defaults::convergence_threshold")]
    pub convergence_threshold: f64,

    /// Minimum `lambda_min / lambda_max` eigenvalue ratio of the normal
    /// matrix before the system counts as degenerate.
    #[serde(default = "defaults::min_eigenvalue_ratio")]
    pub min_eigenvalue_ratio: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            initial_lambda: defaults::lm_initial_lambda(),
            lambda_factor: defaults::lm_lambda_factor(),
            min_lambda: defaults::lm_min_lambda(),
            max_lambda: defaults::lm_max_lambda(),
            convergence_threshold: defaults::convergence_threshold(),
            min_eigenvalue_ratio: defaults::min_eigenvalue_ratio(),
        }
    }
}

/// Settings for one registration stage (ego-motion or mapping).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Outer iteration budget for the LM loop.
    #[serde(default = "defaults::max_iterations")]
    pub max_iterations: usize,

    /// Iterations between two re-runs of the closest-point matching.
    #[serde(default = "defaults::icp_period")]
    pub icp_period: usize,

    /// Number of nearest neighbors fit to a line for edge keypoints.
    #[serde(default = "defaults::ego_line_neighbors")]
    pub line_neighbors: usize,

    /// Number of nearest neighbors fit to a plane for planar keypoints.
    #[serde(default = "defaults::plane_neighbors")]
    pub plane_neighbors: usize,

    /// Minimum `lambda1 / lambda2` ratio for a neighborhood to count as a
    /// line (eigenvalues sorted descending).
    #[serde(default = "defaults::line_factor")]
    pub line_factor: f64,

    /// Minimum `lambda2 / lambda3` ratio for a neighborhood to count as a
    /// plane.
    #[serde(default = "defaults::plane_factor1")]
    pub plane_factor1: f64,

    /// Maximum `lambda1 / lambda2` ratio for a plane neighborhood (the patch
    /// must be extended, not a line).
    #[serde(default = "defaults::plane_factor2")]
    pub plane_factor2: f64,

    /// Farthest allowed kNN neighbor for an edge match (meters).
    #[serde(default = "defaults::ego_max_line_distance")]
    pub max_line_distance: f64,

    /// Farthest allowed kNN neighbor for a plane match (meters).
    #[serde(default = "defaults::ego_max_plane_distance")]
    pub max_plane_distance: f64,

    /// Levenberg-Marquardt schedule.
    #[serde(default)]
    pub lm: LmConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self::ego_motion()
    }
}

impl RegistrationConfig {
    /// Defaults for the frame-to-frame stage.
    pub fn ego_motion() -> Self {
        Self {
            max_iterations: defaults::max_iterations(),
            icp_period: defaults::icp_period(),
            line_neighbors: defaults::ego_line_neighbors(),
            plane_neighbors: defaults::plane_neighbors(),
            line_factor: defaults::line_factor(),
            plane_factor1: defaults::plane_factor1(),
            plane_factor2: defaults::plane_factor2(),
            max_line_distance: defaults::ego_max_line_distance(),
            max_plane_distance: defaults::ego_max_plane_distance(),
            lm: LmConfig::default(),
        }
    }

    /// Defaults for the frame-to-map stage: more neighbors, tighter
    /// distances (the initial guess is already close).
    pub fn mapping() -> Self {
        Self {
            line_neighbors: defaults::mapping_line_neighbors(),
            max_line_distance: defaults::mapping_max_line_distance(),
            max_plane_distance: defaults::mapping_max_plane_distance(),
            ..Self::ego_motion()
        }
    }
}

/// Rolling voxel grid sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RollingGridConfig {
    /// Side of one voxel, meters.
    #[serde(default = "defaults::voxel_size")]
    pub voxel_size: f64,

    /// Grid dimensions in voxels per axis. The map window is
    /// `grid_nb_voxel * voxel_size` meters wide per axis.
    #[serde(default = "defaults::grid_nb_voxel")]
    pub grid_nb_voxel: [usize; 3],

    /// Half-extent, in voxels, of the submap bounding box extracted around
    /// the sensor for the mapping stage.
    #[serde(default = "defaults::pointcloud_nb_voxel")]
    pub pointcloud_nb_voxel: usize,

    /// Leaf size of the in-voxel downsampling filter, meters.
    #[serde(default = "defaults::leaf_size")]
    pub leaf_size: f64,
}

impl Default for RollingGridConfig {
    fn default() -> Self {
        Self {
            voxel_size: defaults::voxel_size(),
            grid_nb_voxel: defaults::grid_nb_voxel(),
            pointcloud_nb_voxel: defaults::pointcloud_nb_voxel(),
            leaf_size: defaults::leaf_size(),
        }
    }
}

/// Full engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlamConfig {
    /// Keypoint extraction settings.
    #[serde(default)]
    pub keypoints: KeypointConfig,

    /// Frame-to-frame registration settings.
    #[serde(default = "RegistrationConfig::ego_motion")]
    pub ego_motion: RegistrationConfig,

    /// Frame-to-map registration settings.
    #[serde(default = "RegistrationConfig::mapping")]
    pub mapping: RegistrationConfig,

    /// Rolling map sizing.
    #[serde(default)]
    pub grid: RollingGridConfig,

    /// Upper bound on the per-frame translation; exceeding it flags the
    /// frame as ExcessiveMotion and protects the map.
    #[serde(default = "defaults::max_dist_between_two_frames")]
    pub max_dist_between_two_frames: f64,

    /// Matches with a residual norm below this are dropped (a near-zero
    /// residual destabilizes the Jacobian).
    #[serde(default = "defaults::min_match_distance")]
    pub min_match_distance: f64,

    /// Populate per-point diagnostic arrays in the frame output.
    #[serde(default)]
    pub display_mode: bool,
}

impl Default for SlamConfig {
    fn default() -> Self {
        Self {
            keypoints: KeypointConfig::default(),
            ego_motion: RegistrationConfig::ego_motion(),
            mapping: RegistrationConfig::mapping(),
            grid: RollingGridConfig::default(),
            max_dist_between_two_frames: defaults::max_dist_between_two_frames(),
            min_match_distance: defaults::min_match_distance(),
            display_mode: false,
        }
    }
}

impl SlamConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a YAML string.
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    /// Check the configuration for unusable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keypoints.neighbor_width == 0 {
            return Err(ConfigError::Invalid("neighbor_width must be > 0".into()));
        }
        if self.grid.voxel_size <= 0.0 {
            return Err(ConfigError::Invalid("voxel_size must be > 0".into()));
        }
        if self.grid.leaf_size <= 0.0 {
            return Err(ConfigError::Invalid("leaf_size must be > 0".into()));
        }
        if self.grid.grid_nb_voxel.iter().any(|&n| n == 0) {
            return Err(ConfigError::Invalid("grid_nb_voxel must be > 0".into()));
        }
        for (name, reg) in [("ego_motion", &self.ego_motion), ("mapping", &self.mapping)] {
            if reg.line_neighbors < 2 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.line_neighbors must be >= 2"
                )));
            }
            if reg.plane_neighbors < 3 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.plane_neighbors must be >= 3"
                )));
            }
            if reg.icp_period == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.icp_period must be > 0"
                )));
            }
        }
        if self.max_dist_between_two_frames <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_dist_between_two_frames must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SlamConfig::default().validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = SlamConfig::default();
        let yaml = config.to_yaml();
        let back = SlamConfig::from_yaml(&yaml).unwrap();
        assert_eq!(
            back.keypoints.neighbor_width,
            config.keypoints.neighbor_width
        );
        assert_eq!(back.mapping.line_neighbors, config.mapping.line_neighbors);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = SlamConfig::from_yaml("keypoints:\n  neighbor_width: 3\n").unwrap();
        assert_eq!(config.keypoints.neighbor_width, 3);
        assert_eq!(
            config.keypoints.max_edges_per_line,
            defaults::max_edges_per_line()
        );
        // Stage defaults differ where the stages differ.
        assert_eq!(
            config.ego_motion.line_neighbors,
            defaults::ego_line_neighbors()
        );
        assert_eq!(
            config.mapping.line_neighbors,
            defaults::mapping_line_neighbors()
        );
    }

    #[test]
    fn test_stage_defaults_differ() {
        let config = SlamConfig::default();
        assert_eq!(
            config.ego_motion.line_neighbors,
            defaults::ego_line_neighbors()
        );
        assert_eq!(
            config.mapping.line_neighbors,
            defaults::mapping_line_neighbors()
        );
        assert!(config.mapping.max_line_distance < config.ego_motion.max_line_distance);
        assert!(config.max_dist_between_two_frames > 0.0);
    }

    #[test]
    fn test_invalid_rejected() {
        let mut config = SlamConfig::default();
        config.grid.voxel_size = 0.0;
        assert!(config.validate().is_err());
    }
}
