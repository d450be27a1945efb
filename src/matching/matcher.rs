//! Closest-point matching of keypoints against a target cloud.
//!
//! For every keypoint the matcher predicts where the point lands in the
//! target frame under the current pose guess, collects its k nearest target
//! neighbors, and fits a line (edge keypoints) or a plane (planar keypoints)
//! to them by PCA. A match is accepted only when the neighborhood is
//! geometrically convincing: tight enough, and with an eigenvalue profile
//! that actually looks like a line or a plane.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::config::RegistrationConfig;
use crate::core::{Keypoint, Pose6D};
use crate::motion::scaled_pose;

use super::kdtree::PointIndex;
use super::pca::neighborhood_pca;
use super::residual::ResidualBlock;

/// How the pose guess applies to a keypoint acquired at time `s`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionMode {
    /// Interpolate the transform to the acquisition time (ego-motion:
    /// keypoints are still distorted by in-sweep motion).
    InterpolatedSweep,
    /// Apply the full transform regardless of time (mapping: keypoints were
    /// undistorted beforehand).
    Rigid,
}

/// The cloud a stage registers against, pre-indexed.
pub struct RegistrationTarget<'a> {
    /// Edge landmark positions.
    pub edges: &'a [Vector3<f64>],
    /// Index over `edges`.
    pub edge_index: &'a PointIndex,
    /// Planar landmark positions.
    pub planars: &'a [Vector3<f64>],
    /// Index over `planars`.
    pub planar_index: &'a PointIndex,
}

/// Everything the matcher and optimizer share for one stage invocation.
pub struct MatchContext<'a> {
    /// Target clouds and indices.
    pub target: RegistrationTarget<'a>,
    /// Stage configuration.
    pub config: &'a RegistrationConfig,
    /// Matches with a residual norm below this are dropped.
    pub min_match_distance: f64,
    /// Interpolated or rigid application of the pose.
    pub mode: MotionMode,
}

impl MatchContext<'_> {
    /// Position of a keypoint in the target frame under the pose guess.
    #[inline]
    pub fn predict(&self, keypoint: &Keypoint, pose: &Pose6D) -> Vector3<f64> {
        match self.mode {
            MotionMode::InterpolatedSweep => {
                scaled_pose(pose, keypoint.time).transform_point(&keypoint.position)
            }
            MotionMode::Rigid => pose.transform_point(&keypoint.position),
        }
    }
}

/// Match every keypoint against the target at the given pose guess.
///
/// Edge and planar matches are computed in parallel; the result preserves
/// keypoint order (edges first), keeping residual accumulation
/// deterministic.
pub fn build_residuals(
    edges: &[Keypoint],
    planars: &[Keypoint],
    pose: &Pose6D,
    ctx: &MatchContext,
) -> Vec<ResidualBlock> {
    let mut residuals: Vec<ResidualBlock> = edges
        .par_iter()
        .filter_map(|k| match_edge(k, pose, ctx))
        .collect();
    let planar_blocks: Vec<ResidualBlock> = planars
        .par_iter()
        .filter_map(|k| match_plane(k, pose, ctx))
        .collect();
    residuals.extend(planar_blocks);
    residuals
}

/// Try to match one edge keypoint against a line in the target.
pub fn match_edge(keypoint: &Keypoint, pose: &Pose6D, ctx: &MatchContext) -> Option<ResidualBlock> {
    let k = ctx.config.line_neighbors;
    if ctx.target.edge_index.len() < k {
        return None;
    }
    let predicted = ctx.predict(keypoint, pose);
    let neighbors = ctx.target.edge_index.nearest_n(&predicted, k);
    let max_sq = ctx.config.max_line_distance * ctx.config.max_line_distance;
    if neighbors.last()?.1 > max_sq {
        return None;
    }

    let positions: Vec<Vector3<f64>> = neighbors
        .iter()
        .map(|&(i, _)| ctx.target.edges[i])
        .collect();
    let pca = neighborhood_pca(&positions)?;
    if pca.values[0] < ctx.config.line_factor * pca.values[1] {
        return None;
    }

    let n = pca.line_direction();
    let a = Matrix3::identity() - n * n.transpose();
    finish_match(a, pca.mean, keypoint, predicted, ctx)
}

/// Try to match one planar keypoint against a plane in the target.
pub fn match_plane(
    keypoint: &Keypoint,
    pose: &Pose6D,
    ctx: &MatchContext,
) -> Option<ResidualBlock> {
    let k = ctx.config.plane_neighbors;
    if ctx.target.planar_index.len() < k {
        return None;
    }
    let predicted = ctx.predict(keypoint, pose);
    let neighbors = ctx.target.planar_index.nearest_n(&predicted, k);
    let max_sq = ctx.config.max_plane_distance * ctx.config.max_plane_distance;
    if neighbors.last()?.1 > max_sq {
        return None;
    }

    let positions: Vec<Vector3<f64>> = neighbors
        .iter()
        .map(|&(i, _)| ctx.target.planars[i])
        .collect();
    let pca = neighborhood_pca(&positions)?;
    if pca.values[1] < ctx.config.plane_factor1 * pca.values[2]
        || pca.values[0] > ctx.config.plane_factor2 * pca.values[1]
    {
        return None;
    }

    let n = pca.plane_normal();
    let a = n * n.transpose();
    finish_match(a, pca.mean, keypoint, predicted, ctx)
}

fn finish_match(
    a: Matrix3<f64>,
    mean: Vector3<f64>,
    keypoint: &Keypoint,
    predicted: Vector3<f64>,
    ctx: &MatchContext,
) -> Option<ResidualBlock> {
    let block = ResidualBlock {
        a,
        p: mean,
        x: keypoint.position,
        time: keypoint.time,
    };
    // A near-zero residual contributes nothing but noise to the Jacobian.
    if block.squared_distance(&predicted) < ctx.min_match_distance * ctx.min_match_distance {
        return None;
    }
    Some(block)
}
