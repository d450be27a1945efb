//! Test utilities: a synthetic world and a raycast LiDAR simulator.
//!
//! The world is an axis-aligned room, optionally with a rectangular pillar,
//! observed by a multi-beam rotating LiDAR. Points are expressed in the
//! instantaneous sensor frame (the way a driver assembles raw range
//! returns), so a sweep taken while the sensor moves is distorted exactly
//! the way the engine's motion model assumes.

#![allow(dead_code)]

use gati_slam::{motion, LidarFrame, LidarPoint, Pose6D};
use nalgebra::{Isometry3, Vector3};

/// Axis-aligned box.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    /// Distance to the inner surface of the box along `dir` from `origin`
    /// (origin inside the box).
    fn exit_distance(&self, origin: &Vector3<f64>, dir: &Vector3<f64>) -> f64 {
        let mut t_exit = f64::INFINITY;
        for axis in 0..3 {
            if dir[axis].abs() < 1e-12 {
                continue;
            }
            let bound = if dir[axis] > 0.0 {
                self.max[axis]
            } else {
                self.min[axis]
            };
            let t = (bound - origin[axis]) / dir[axis];
            if t > 0.0 && t < t_exit {
                t_exit = t;
            }
        }
        t_exit
    }

    /// Distance to the outer surface of the box along `dir` from `origin`
    /// (origin outside the box), if the ray hits it.
    fn enter_distance(&self, origin: &Vector3<f64>, dir: &Vector3<f64>) -> Option<f64> {
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;
        for axis in 0..3 {
            if dir[axis].abs() < 1e-12 {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[axis] - origin[axis]) / dir[axis];
            let t1 = (self.max[axis] - origin[axis]) / dir[axis];
            let (t0, t1) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
            t_near = t_near.max(t0);
            t_far = t_far.min(t1);
        }
        (t_near < t_far && t_near > 0.0).then_some(t_near)
    }
}

/// A room with an optional pillar inside it.
#[derive(Clone, Copy, Debug)]
pub struct World {
    pub room: Aabb,
    pub pillar: Option<Aabb>,
}

impl World {
    /// An asymmetric room with a pillar, rich in corners and planes.
    pub fn box_room() -> Self {
        Self {
            room: Aabb::new(Vector3::new(-8.0, -6.0, -2.0), Vector3::new(12.0, 10.0, 4.0)),
            pillar: Some(Aabb::new(
                Vector3::new(4.0, -3.0, -2.0),
                Vector3::new(6.0, -1.0, 4.0),
            )),
        }
    }

    /// A long room for translation runs.
    pub fn long_room() -> Self {
        Self {
            room: Aabb::new(Vector3::new(-5.0, -7.0, -2.5), Vector3::new(30.0, 8.0, 3.5)),
            pillar: Some(Aabb::new(
                Vector3::new(10.0, -4.0, -2.5),
                Vector3::new(12.0, -2.0, 3.5),
            )),
        }
    }

    /// An endless corridor: parallel walls, floor and ceiling, nothing that
    /// constrains motion along the corridor axis.
    pub fn corridor() -> Self {
        Self {
            room: Aabb::new(
                Vector3::new(-200.0, -1.5, -1.5),
                Vector3::new(200.0, 1.5, 1.5),
            ),
            pillar: None,
        }
    }

    /// First hit along a world-frame ray, if any within `max_range`.
    fn cast(&self, origin: &Vector3<f64>, dir: &Vector3<f64>, max_range: f64) -> Option<f64> {
        let mut t = self.room.exit_distance(origin, dir);
        if let Some(pillar) = &self.pillar {
            if let Some(t_pillar) = pillar.enter_distance(origin, dir) {
                t = t.min(t_pillar);
            }
        }
        (t.is_finite() && t <= max_range).then_some(t)
    }
}

/// Simulator parameters.
#[derive(Clone, Copy, Debug)]
pub struct Lidar {
    pub n_beams: usize,
    pub n_azimuth: usize,
    pub max_range: f64,
    /// Vertical field of view, symmetric, radians.
    pub vertical_fov: f64,
}

impl Default for Lidar {
    fn default() -> Self {
        Self {
            n_beams: 12,
            n_azimuth: 240,
            max_range: 25.0,
            vertical_fov: 30f64.to_radians(),
        }
    }
}

impl Lidar {
    /// Azimuthal step, radians.
    pub fn angle_resolution(&self) -> f64 {
        std::f64::consts::TAU / self.n_azimuth as f64
    }

    /// Identity laser-id mapping for the simulated sensor.
    pub fn calibration(&self) -> Vec<u16> {
        (0..self.n_beams as u16).collect()
    }
}

/// Simulate one sweep while the sensor moves from `pose_start` to
/// `pose_end` (world-frame poses) with constant velocity. Points are
/// returned in the instantaneous sensor frame with azimuth-proportional
/// timestamps.
pub fn simulate_sweep(
    world: &World,
    lidar: &Lidar,
    pose_start: &Pose6D,
    pose_end: &Pose6D,
) -> LidarFrame {
    let rel = pose_start.inverse().compose(pose_end);
    let start_iso: Isometry3<f64> = pose_start.isometry();

    let mut points = Vec::new();
    for az_idx in 0..lidar.n_azimuth {
        let s = (az_idx as f64 + 0.5) / lidar.n_azimuth as f64;
        let azimuth = -std::f64::consts::PI + s * std::f64::consts::TAU;
        let sensor_pose = start_iso * motion::interpolate(&rel, s);

        for beam in 0..lidar.n_beams {
            let elevation = if lidar.n_beams > 1 {
                -lidar.vertical_fov / 2.0
                    + lidar.vertical_fov * beam as f64 / (lidar.n_beams - 1) as f64
            } else {
                0.0
            };
            let dir_sensor = Vector3::new(
                elevation.cos() * azimuth.cos(),
                elevation.cos() * azimuth.sin(),
                elevation.sin(),
            );
            let origin = sensor_pose.translation.vector;
            let dir_world = sensor_pose.rotation * dir_sensor;

            if let Some(t) = world.cast(&origin, &dir_world, lidar.max_range) {
                let p_sensor = dir_sensor * t;
                points.push(LidarPoint::new(
                    p_sensor.x,
                    p_sensor.y,
                    p_sensor.z,
                    beam as u16,
                    s,
                ));
            }
        }
    }
    LidarFrame::from_points(points)
}

/// Simulate a static sweep at one pose.
pub fn simulate_static(world: &World, lidar: &Lidar, pose: &Pose6D) -> LidarFrame {
    simulate_sweep(world, lidar, pose, pose)
}

/// Perturb every range by zero-mean Gaussian noise (reproducible seed).
pub fn add_range_noise(frame: &LidarFrame, std_m: f64, seed: u64) -> LidarFrame {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let mut gaussian = move || -> f64 {
        // Box-Muller transform from two uniforms.
        let u1: f64 = rng.gen_range(1e-12..1.0);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    };

    let points = frame
        .points
        .iter()
        .map(|p| {
            let range = p.range();
            let scale = if range > 1e-9 {
                (range + gaussian() * std_m) / range
            } else {
                1.0
            };
            LidarPoint {
                x: p.x * scale,
                y: p.y * scale,
                z: p.z * scale,
                ..*p
            }
        })
        .collect();
    LidarFrame::from_points(points)
}

/// Engine configuration tuned to the simulator's sampling density.
pub fn scenario_config(lidar: &Lidar) -> gati_slam::SlamConfig {
    let mut config = gati_slam::SlamConfig::default();
    config.keypoints.neighbor_width = 5;
    config.keypoints.edge_curvature_threshold = 2.0;
    config.keypoints.plane_curvature_threshold = 0.05;
    config.keypoints.min_distance_to_sensor = 1.0;
    config.keypoints.angle_resolution = lidar.angle_resolution();
    config.keypoints.beam_grazing_band = 0.08;
    config.keypoints.max_edges_per_line = 50;
    config.keypoints.max_planars_per_line = 120;
    config
}
