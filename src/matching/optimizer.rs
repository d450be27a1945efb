//! Levenberg-Marquardt pose refinement.
//!
//! Minimizes `F(T) = sum_i ||A_i (R(s_i) X_i + t(s_i) - P_i)||^2` over the
//! six pose parameters, where `R(s), t(s)` is the pose scaled to each
//! residual's acquisition time (identity scaling in rigid mode). The same
//! driver serves both the ego-motion and the mapping stage; only the target,
//! the motion mode and the configuration differ.
//!
//! LM blends between Gauss-Newton (fast convergence near the solution) and
//! gradient descent (robust far from it): the damped normal equations
//! `(H + lambda*diag(H)) delta = -g` are solved once per outer iteration,
//! and lambda shrinks on accepted steps and grows on rejected ones. Every
//! `icp_period` iterations the closest-point matching is re-run at the
//! current guess.

use log::{debug, warn};
use nalgebra::{Matrix3, Matrix6, SymmetricEigen, Vector3, Vector6};

use crate::core::{Keypoint, Pose6D};

use super::matcher::{build_residuals, MatchContext, MotionMode};
use super::residual::ResidualBlock;

/// A stage needs at least this many residual blocks to be worth solving.
const MIN_RESIDUALS: usize = 6;

/// Consecutive rank-deficient iterations tolerated before aborting.
const MAX_DEGENERATE_ITERATIONS: usize = 3;

/// Heavy damping applied while the system is rank-deficient.
const DEGENERATE_LAMBDA: f64 = 1e3;

/// Result of one registration stage.
#[derive(Clone, Debug)]
pub struct RegistrationOutcome {
    /// Refined pose (the initial guess if the stage aborted).
    pub pose: Pose6D,
    /// Outer iterations performed.
    pub iterations: usize,
    /// The step norm dropped below the convergence threshold.
    pub converged: bool,
    /// The stage aborted on a rank-deficient or non-finite system and
    /// retained its initial guess.
    pub degenerate: bool,
    /// Final value of the cost function.
    pub final_cost: f64,
    /// Number of residual blocks in the last matching round.
    pub matches: usize,
}

impl RegistrationOutcome {
    fn aborted(initial: Pose6D, iterations: usize, matches: usize) -> Self {
        Self {
            pose: initial,
            iterations,
            converged: false,
            degenerate: true,
            final_cost: f64::INFINITY,
            matches,
        }
    }
}

/// Run one registration stage from an initial guess.
pub fn register(
    edges: &[Keypoint],
    planars: &[Keypoint],
    initial: Pose6D,
    ctx: &MatchContext,
) -> RegistrationOutcome {
    let config = ctx.config;
    let mut pose = initial;
    let mut lambda = config.lm.initial_lambda;
    let mut residuals: Vec<ResidualBlock> = Vec::new();
    let mut consecutive_degenerate = 0usize;
    let mut converged = false;
    let mut iterations = 0usize;

    for iteration in 0..config.max_iterations {
        iterations = iteration + 1;
        if iteration % config.icp_period == 0 {
            residuals = build_residuals(edges, planars, &pose, ctx);
            if residuals.len() < MIN_RESIDUALS {
                if iteration == 0 {
                    debug!(
                        "registration aborted: {} matches at first round",
                        residuals.len()
                    );
                    return RegistrationOutcome::aborted(initial, iteration, residuals.len());
                }
                // A later round starving means the remaining residuals all
                // sit below the drop floor: nothing left to refine.
                converged = true;
                break;
            }
        }

        let (h, g, cost) = build_normal_equations(&residuals, &pose, ctx.mode);
        if !cost.is_finite() {
            warn!("registration aborted: non-finite cost at iteration {iteration}");
            return RegistrationOutcome::aborted(initial, iteration, residuals.len());
        }

        // Rank check on the normal matrix: a feature-starved scene leaves
        // one or more pose directions unobservable.
        let eigen = SymmetricEigen::new(h);
        let lambda_max = eigen.eigenvalues.max();
        let lambda_min = eigen.eigenvalues.min();
        if lambda_max <= 0.0 || lambda_min < config.lm.min_eigenvalue_ratio * lambda_max {
            consecutive_degenerate += 1;
            if consecutive_degenerate >= MAX_DEGENERATE_ITERATIONS {
                debug!("registration aborted: degenerate for {consecutive_degenerate} iterations");
                return RegistrationOutcome::aborted(initial, iteration + 1, residuals.len());
            }
            lambda = lambda.max(DEGENERATE_LAMBDA);
        } else {
            consecutive_degenerate = 0;
        }

        let damped = h + Matrix6::from_diagonal(&(h.diagonal() * lambda));
        let delta = match damped.cholesky() {
            Some(chol) => chol.solve(&(-g)),
            None => {
                lambda *= config.lm.lambda_factor;
                if lambda > config.lm.max_lambda {
                    break;
                }
                continue;
            }
        };

        let candidate = apply_step(&pose, &delta);
        if !candidate.is_finite() {
            warn!("registration aborted: non-finite pose at iteration {iteration}");
            return RegistrationOutcome::aborted(initial, iteration, residuals.len());
        }

        let candidate_cost = evaluate_cost(&residuals, &candidate, ctx.mode);
        if candidate_cost < cost {
            pose = candidate;
            lambda = (lambda / config.lm.lambda_factor).max(config.lm.min_lambda);
            if delta.norm() < config.lm.convergence_threshold {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lm.lambda_factor;
            if lambda > config.lm.max_lambda {
                break;
            }
        }
    }

    let final_cost = evaluate_cost(&residuals, &pose, ctx.mode);
    RegistrationOutcome {
        pose,
        iterations,
        converged,
        degenerate: false,
        final_cost,
        matches: residuals.len(),
    }
}

/// Effective time scaling for a residual under the given motion mode.
#[inline]
fn time_scale(mode: MotionMode, time: f64) -> f64 {
    match mode {
        MotionMode::InterpolatedSweep => time,
        MotionMode::Rigid => 1.0,
    }
}

/// Total cost `F(T)` over a fixed match set.
fn evaluate_cost(residuals: &[ResidualBlock], pose: &Pose6D, mode: MotionMode) -> f64 {
    residuals
        .iter()
        .map(|block| {
            let s = time_scale(mode, block.time);
            let scaled = crate::motion::scaled_pose(pose, s);
            block.residual(&scaled.transform_point(&block.x)).norm_squared()
        })
        .sum()
}

/// Accumulate `H = sum JᵀJ`, `g = sum Jᵀr` and the cost over the match set.
///
/// Accumulation runs serially in block order, so the result does not depend
/// on thread scheduling.
fn build_normal_equations(
    residuals: &[ResidualBlock],
    pose: &Pose6D,
    mode: MotionMode,
) -> (Matrix6<f64>, Vector6<f64>, f64) {
    let mut h = Matrix6::zeros();
    let mut g = Vector6::zeros();
    let mut cost = 0.0;

    for block in residuals {
        let s = time_scale(mode, block.time);
        let (r, jac) = residual_and_jacobian(block, pose, s);
        h += jac.transpose() * jac;
        g += jac.transpose() * r;
        cost += r.norm_squared();
    }

    (h, g, cost)
}

type Jacobian = nalgebra::Matrix3x6<f64>;

/// Residual vector and its 3x6 Jacobian w.r.t. `(rx, ry, rz, tx, ty, tz)`.
fn residual_and_jacobian(block: &ResidualBlock, pose: &Pose6D, s: f64) -> (Vector3<f64>, Jacobian) {
    let (sa, ca) = (s * pose.rx).sin_cos();
    let (sb, cb) = (s * pose.ry).sin_cos();
    let (sc, cc) = (s * pose.rz).sin_cos();

    let rot_x = Matrix3::new(1.0, 0.0, 0.0, 0.0, ca, -sa, 0.0, sa, ca);
    let rot_y = Matrix3::new(cb, 0.0, sb, 0.0, 1.0, 0.0, -sb, 0.0, cb);
    let rot_z = Matrix3::new(cc, -sc, 0.0, sc, cc, 0.0, 0.0, 0.0, 1.0);

    let drot_x = Matrix3::new(0.0, 0.0, 0.0, 0.0, -sa, -ca, 0.0, ca, -sa);
    let drot_y = Matrix3::new(-sb, 0.0, cb, 0.0, 0.0, 0.0, -cb, 0.0, -sb);
    let drot_z = Matrix3::new(-sc, -cc, 0.0, cc, -sc, 0.0, 0.0, 0.0, 0.0);

    let rotation = rot_z * rot_y * rot_x;
    let translation = Vector3::new(pose.tx, pose.ty, pose.tz) * s;
    let r = block.a * (rotation * block.x + translation - block.p);

    let d_rx = block.a * (rot_z * rot_y * drot_x * block.x) * s;
    let d_ry = block.a * (rot_z * drot_y * rot_x * block.x) * s;
    let d_rz = block.a * (drot_z * rot_y * rot_x * block.x) * s;

    let mut jac = Jacobian::zeros();
    jac.fixed_view_mut::<3, 1>(0, 0).copy_from(&d_rx);
    jac.fixed_view_mut::<3, 1>(0, 1).copy_from(&d_ry);
    jac.fixed_view_mut::<3, 1>(0, 2).copy_from(&d_rz);
    jac.fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&(block.a * s));

    (r, jac)
}

/// Additive update in parameter space.
fn apply_step(pose: &Pose6D, delta: &Vector6<f64>) -> Pose6D {
    Pose6D::new(
        pose.rx + delta[0],
        pose.ry + delta[1],
        pose.rz + delta[2],
        pose.tx + delta[3],
        pose.ty + delta[4],
        pose.tz + delta[5],
    )
}
