//! The SLAM engine: one value owning every piece of persistent state.
//!
//! Frames are processed strictly sequentially. Per-frame state (organized
//! scan, feature arrays, residuals) lives and dies inside `add_frame`; the
//! world pose, the two rolling maps, the previous frame's keypoints and the
//! trajectory persist across frames until `reset`.
//!
//! A bad frame never fails the call: every per-frame failure mode degrades
//! to constant-velocity dead-reckoning, tags the output status, and the
//! engine keeps going. Only a missing calibration is a hard error.

use log::{debug, warn};
use nalgebra::Vector3;

use crate::config::SlamConfig;
use crate::core::{Keypoint, Keypoints, LidarFrame, Pose6D};
use crate::error::{Result, SlamError};
use crate::grid::RollingGrid;
use crate::matching::{register, MatchContext, MotionMode, PointIndex, RegistrationTarget};
use crate::motion::transform_to_end;
use crate::scan::keypoints::{extract_keypoints, ExtractionResult};
use crate::scan::organizer::{organize, OrganizedScan, SensorCalibration};
use crate::scan::PointLabel;

/// Minimum surviving edge keypoints for the ego-motion stage to run.
const MIN_EDGE_KEYPOINTS: usize = 10;

/// Minimum surviving planar keypoints for the ego-motion stage to run.
const MIN_PLANAR_KEYPOINTS: usize = 10;

/// How a frame was processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Both stages ran and produced a refined pose.
    Ok,
    /// No valid point survived organization; pose dead-reckoned.
    EmptyFrame,
    /// Too few keypoints; pose extrapolated, map untouched.
    InsufficientKeypoints,
    /// Ego-motion aborted on a rank-deficient system; its initial guess was
    /// kept and the frame proceeded to mapping.
    DegenerateEgoMotion,
    /// Mapping aborted on a rank-deficient system; the dead-reckoned world
    /// pose was kept.
    DegenerateMapping,
    /// The estimated frame-to-frame translation exceeded the configured
    /// bound; pose extrapolated, map untouched.
    ExcessiveMotion,
}

/// Per-point diagnostic arrays, in input point order.
#[derive(Clone, Debug, Default)]
pub struct FrameAnnotations {
    /// Curvature of each input point (0 where not computable).
    pub curvature: Vec<f64>,
    /// Label of each input point; points dropped by the organizer are
    /// reported as rejected.
    pub labels: Vec<PointLabel>,
}

/// Result of processing one frame.
#[derive(Clone, Debug)]
pub struct FrameOutput {
    /// Index of the frame in the processed sequence (0-based).
    pub frame_index: u64,
    /// How the frame was processed.
    pub status: FrameStatus,
    /// World pose after the frame, `[rx, ry, rz, tx, ty, tz]`.
    pub pose: [f64; 6],
    /// Frame-to-frame transform used for this frame.
    pub relative: Pose6D,
    /// Number of edge keypoints extracted.
    pub edge_count: usize,
    /// Number of planar keypoints extracted.
    pub planar_count: usize,
    /// Diagnostic arrays, populated when `display_mode` is on.
    pub annotations: Option<FrameAnnotations>,
}

/// Previous frame's keypoints, re-expressed at its sweep end.
#[derive(Clone, Debug, Default)]
struct PrevFeatures {
    edge_positions: Vec<Vector3<f64>>,
    planar_positions: Vec<Vector3<f64>>,
}

/// LOAM-style LiDAR odometry and mapping engine.
pub struct SlamEngine {
    config: SlamConfig,
    calibration: Option<SensorCalibration>,
    /// Pose of the sensor at the current sweep end, in the previous sweep
    /// end's frame.
    t_rel: Pose6D,
    /// Pose of the sensor in the world frame (sensor frame of frame 0).
    t_world: Pose6D,
    prev_features: Option<PrevFeatures>,
    edge_map: RollingGrid,
    planar_map: RollingGrid,
    trajectory: Vec<Vector3<f64>>,
    frames_processed: u64,
}

impl SlamEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: SlamConfig) -> Self {
        let edge_map = RollingGrid::new(&config.grid);
        let planar_map = RollingGrid::new(&config.grid);
        Self {
            config,
            calibration: None,
            t_rel: Pose6D::identity(),
            t_world: Pose6D::identity(),
            prev_features: None,
            edge_map,
            planar_map,
            trajectory: Vec::new(),
            frames_processed: 0,
        }
    }

    /// Supply the raw-laser-id to beam-index mapping. Must be called before
    /// the first `add_frame`.
    pub fn set_sensor_calibration(
        &mut self,
        laser_id_mapping: &[u16],
        n_lasers: usize,
    ) -> Result<()> {
        self.calibration = Some(SensorCalibration::new(laser_id_mapping, n_lasers)?);
        Ok(())
    }

    /// Whether a calibration has been provided.
    pub fn is_calibration_provided(&self) -> bool {
        self.calibration.is_some()
    }

    /// Current world transform as `[rx, ry, rz, tx, ty, tz]`.
    pub fn get_world_transform(&self) -> [f64; 6] {
        self.t_world.to_array()
    }

    /// Current world pose.
    pub fn world_pose(&self) -> Pose6D {
        self.t_world
    }

    /// Current frame-to-frame transform.
    pub fn relative_pose(&self) -> Pose6D {
        self.t_rel
    }

    /// Sensor positions accumulated so far, one per processed frame.
    pub fn trajectory(&self) -> &[Vector3<f64>] {
        &self.trajectory
    }

    /// Number of frames processed since creation or the last reset.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Number of points in the edge landmark map.
    pub fn edge_map_size(&self) -> usize {
        self.edge_map.len()
    }

    /// Number of points in the planar landmark map.
    pub fn planar_map_size(&self) -> usize {
        self.planar_map.len()
    }

    /// Erase the maps and every transform computed so far. The sensor
    /// calibration and the configuration are retained.
    pub fn reset(&mut self) {
        self.t_rel = Pose6D::identity();
        self.t_world = Pose6D::identity();
        self.prev_features = None;
        self.edge_map = RollingGrid::new(&self.config.grid);
        self.planar_map = RollingGrid::new(&self.config.grid);
        self.trajectory.clear();
        self.frames_processed = 0;
    }

    /// Run the keypoint extraction stages only and return the diagnostic
    /// arrays. No engine state changes.
    pub fn only_compute_keypoints(&self, frame: &LidarFrame) -> Result<FrameAnnotations> {
        let calibration = self
            .calibration
            .as_ref()
            .ok_or(SlamError::CalibrationMissing)?;
        let scan = organize(frame, calibration);
        let extraction = extract_keypoints(&scan, &self.config.keypoints);
        Ok(annotate(&scan, &extraction))
    }

    /// Process one frame: extract keypoints, recover the ego-motion, refine
    /// against the map, and insert the new landmarks.
    pub fn add_frame(&mut self, frame: &LidarFrame) -> Result<FrameOutput> {
        let calibration = self
            .calibration
            .as_ref()
            .ok_or(SlamError::CalibrationMissing)?;

        let scan = organize(frame, calibration);
        if scan.is_empty() {
            warn!("frame {} is empty, dead-reckoning", self.frames_processed);
            return Ok(self.finish_dead_reckoned(FrameStatus::EmptyFrame, &Keypoints::default(), None));
        }

        let extraction = extract_keypoints(&scan, &self.config.keypoints);
        let annotations = self
            .config
            .display_mode
            .then(|| annotate(&scan, &extraction));
        let keypoints = &extraction.keypoints;

        // First frame: nothing to register against, seed the maps. The
        // previous-feature record is owned and moved out for the frame,
        // then replaced on every path below.
        let Some(prev) = self.prev_features.take() else {
            self.insert_keypoints(keypoints);
            self.prev_features = Some(to_prev_features(keypoints, &self.t_rel));
            return Ok(self.finish(FrameStatus::Ok, keypoints, annotations));
        };

        if !self.keypoints_sufficient(keypoints, &prev) {
            warn!(
                "frame {}: {} edges / {} planars, extrapolating",
                self.frames_processed,
                keypoints.edges.len(),
                keypoints.planars.len()
            );
            self.prev_features = Some(to_prev_features(keypoints, &self.t_rel));
            return Ok(self.finish_dead_reckoned(
                FrameStatus::InsufficientKeypoints,
                keypoints,
                annotations,
            ));
        }

        // Stage G: frame-to-frame ego-motion.
        let mut status = FrameStatus::Ok;
        let ego = self.run_ego_motion(keypoints, &prev);
        if ego.degenerate {
            debug!("frame {}: degenerate ego-motion", self.frames_processed);
            status = FrameStatus::DegenerateEgoMotion;
        } else if ego.pose.translation_norm() > self.config.max_dist_between_two_frames {
            warn!(
                "frame {}: translation {:.2} m exceeds limit, extrapolating",
                self.frames_processed,
                ego.pose.translation_norm()
            );
            self.prev_features = Some(to_prev_features(keypoints, &self.t_rel));
            return Ok(self.finish_dead_reckoned(
                FrameStatus::ExcessiveMotion,
                keypoints,
                annotations,
            ));
        } else {
            self.t_rel = ego.pose;
        }

        // Undistort to the sweep end: both the mapping stage and the map
        // itself work on motion-compensated points.
        let edges_end = undistort_to_end(&keypoints.edges, &self.t_rel);
        let planars_end = undistort_to_end(&keypoints.planars, &self.t_rel);

        // Stage H: frame-to-map refinement.
        let mut t_world_new = self.t_world.compose(&self.t_rel);
        if let Some(refined) = self.run_mapping(&edges_end, &planars_end, t_world_new) {
            t_world_new = refined;
        } else if status == FrameStatus::Ok {
            debug!("frame {}: degenerate mapping", self.frames_processed);
            status = FrameStatus::DegenerateMapping;
        }

        self.t_rel = self.t_world.inverse().compose(&t_world_new);
        self.t_world = t_world_new;

        // Map update: world-transform the undistorted keypoints, roll the
        // window to the new position, insert.
        let world_edges: Vec<Vector3<f64>> = edges_end
            .iter()
            .map(|k| self.t_world.transform_point(&k.position))
            .collect();
        let world_planars: Vec<Vector3<f64>> = planars_end
            .iter()
            .map(|k| self.t_world.transform_point(&k.position))
            .collect();
        let center = self.t_world.translation();
        self.edge_map.set_center(&center);
        self.planar_map.set_center(&center);
        self.edge_map.insert(&world_edges);
        self.planar_map.insert(&world_planars);

        self.prev_features = Some(PrevFeatures {
            edge_positions: edges_end.iter().map(|k| k.position).collect(),
            planar_positions: planars_end.iter().map(|k| k.position).collect(),
        });

        Ok(self.finish(status, keypoints, annotations))
    }

    fn keypoints_sufficient(&self, keypoints: &Keypoints, prev: &PrevFeatures) -> bool {
        keypoints.edges.len() >= MIN_EDGE_KEYPOINTS
            && keypoints.planars.len() >= MIN_PLANAR_KEYPOINTS
            && prev.edge_positions.len() >= self.config.ego_motion.line_neighbors
            && prev.planar_positions.len() >= self.config.ego_motion.plane_neighbors
    }

    fn run_ego_motion(
        &self,
        keypoints: &Keypoints,
        prev: &PrevFeatures,
    ) -> crate::matching::RegistrationOutcome {
        // The trees over the previous keypoints are rebuilt here once per
        // frame and stay immutable for the whole stage.
        let edge_index = PointIndex::build(&prev.edge_positions);
        let planar_index = PointIndex::build(&prev.planar_positions);
        let ctx = MatchContext {
            target: RegistrationTarget {
                edges: &prev.edge_positions,
                edge_index: &edge_index,
                planars: &prev.planar_positions,
                planar_index: &planar_index,
            },
            config: &self.config.ego_motion,
            min_match_distance: self.config.min_match_distance,
            mode: MotionMode::InterpolatedSweep,
        };
        register(&keypoints.edges, &keypoints.planars, self.t_rel, &ctx)
    }

    /// Returns the refined world pose, or `None` when the stage could not
    /// run or aborted.
    fn run_mapping(
        &self,
        edges_end: &[Keypoint],
        planars_end: &[Keypoint],
        guess: Pose6D,
    ) -> Option<Pose6D> {
        let half_extent = self.config.grid.pointcloud_nb_voxel;
        let center = guess.translation();
        let submap_edges = self.edge_map.submap(&center, half_extent);
        let submap_planars = self.planar_map.submap(&center, half_extent);
        if submap_edges.len() < self.config.mapping.line_neighbors
            || submap_planars.len() < self.config.mapping.plane_neighbors
        {
            debug!("submap too small ({} edges, {} planars)", submap_edges.len(), submap_planars.len());
            return None;
        }

        let edge_index = PointIndex::build(&submap_edges);
        let planar_index = PointIndex::build(&submap_planars);
        let ctx = MatchContext {
            target: RegistrationTarget {
                edges: &submap_edges,
                edge_index: &edge_index,
                planars: &submap_planars,
                planar_index: &planar_index,
            },
            config: &self.config.mapping,
            min_match_distance: self.config.min_match_distance,
            mode: MotionMode::Rigid,
        };
        let outcome = register(edges_end, planars_end, guess, &ctx);
        if outcome.degenerate {
            None
        } else {
            Some(outcome.pose)
        }
    }

    /// Advance by the retained relative transform and finish the frame
    /// without touching the map.
    fn finish_dead_reckoned(
        &mut self,
        status: FrameStatus,
        keypoints: &Keypoints,
        annotations: Option<FrameAnnotations>,
    ) -> FrameOutput {
        self.t_world = self.t_world.compose(&self.t_rel);
        self.finish(status, keypoints, annotations)
    }

    fn finish(
        &mut self,
        status: FrameStatus,
        keypoints: &Keypoints,
        annotations: Option<FrameAnnotations>,
    ) -> FrameOutput {
        let frame_index = self.frames_processed;
        self.trajectory.push(self.t_world.translation());
        self.frames_processed += 1;
        FrameOutput {
            frame_index,
            status,
            pose: self.t_world.to_array(),
            relative: self.t_rel,
            edge_count: keypoints.edges.len(),
            planar_count: keypoints.planars.len(),
            annotations,
        }
    }

    fn insert_keypoints(&mut self, keypoints: &Keypoints) {
        let center = self.t_world.translation();
        self.edge_map.set_center(&center);
        self.planar_map.set_center(&center);
        let edges: Vec<Vector3<f64>> = keypoints
            .edges
            .iter()
            .map(|k| self.t_world.transform_point(&k.position))
            .collect();
        let planars: Vec<Vector3<f64>> = keypoints
            .planars
            .iter()
            .map(|k| self.t_world.transform_point(&k.position))
            .collect();
        self.edge_map.insert(&edges);
        self.planar_map.insert(&planars);
    }
}

/// Re-express keypoints at the sweep end under the recovered motion.
fn undistort_to_end(keypoints: &[Keypoint], sweep: &Pose6D) -> Vec<Keypoint> {
    keypoints
        .iter()
        .map(|k| Keypoint {
            position: transform_to_end(&k.position, k.time, sweep),
            time: k.time,
            laser_id: k.laser_id,
        })
        .collect()
}

fn to_prev_features(keypoints: &Keypoints, sweep: &Pose6D) -> PrevFeatures {
    PrevFeatures {
        edge_positions: keypoints
            .edges
            .iter()
            .map(|k| transform_to_end(&k.position, k.time, sweep))
            .collect(),
        planar_positions: keypoints
            .planars
            .iter()
            .map(|k| transform_to_end(&k.position, k.time, sweep))
            .collect(),
    }
}

fn annotate(scan: &OrganizedScan, extraction: &ExtractionResult) -> FrameAnnotations {
    let mut annotations = FrameAnnotations {
        curvature: vec![0.0; scan.input_len],
        labels: vec![PointLabel::Rejected; scan.input_len],
    };
    for (input_idx, slot) in scan.forward.iter().enumerate() {
        if let Some((line, pos)) = slot {
            annotations.curvature[input_idx] =
                extraction.curvature[*line as usize][*pos as usize];
            annotations.labels[input_idx] = extraction.labels[*line as usize][*pos as usize];
        }
    }
    annotations
}
