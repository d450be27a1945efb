//! Keypoint selection: classify scan points as edge, planar or rejected.
//!
//! The validity filter runs first and discards points that would produce
//! unreliable matches: returns too close to the sensor, grazing returns on
//! surfaces nearly parallel to the beam, and groups of points next to an
//! occlusion boundary (the far side of a depth gap looks like an edge but
//! moves with the viewpoint). Selection then picks the highest-curvature
//! survivors as edges and the lowest-curvature ones as planars, suppressing
//! the neighbors of every pick so keypoints spread along the line.

use rayon::prelude::*;

use crate::config::KeypointConfig;
use crate::core::{Keypoint, Keypoints};

use super::curvature::{compute_line_features, LineFeatures};
use super::organizer::{OrganizedScan, ScanLine};

/// Classification of one scan point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointLabel {
    /// Not selected and not rejected.
    #[default]
    Unset,
    /// High-curvature keypoint, matched against lines.
    Edge,
    /// Low-curvature keypoint, matched against planes.
    Planar,
    /// Discarded by the validity filter.
    Rejected,
}

/// Keypoints plus the per-line diagnostic arrays they were selected from.
#[derive(Clone, Debug, Default)]
pub struct ExtractionResult {
    /// Edge and planar keypoint sets.
    pub keypoints: Keypoints,
    /// Per-line point labels, parallel to the organized scan.
    pub labels: Vec<Vec<PointLabel>>,
    /// Per-line curvature values, parallel to the organized scan.
    pub curvature: Vec<Vec<f64>>,
}

/// Extract keypoints from an organized scan. Scan lines are independent and
/// processed in parallel.
pub fn extract_keypoints(scan: &OrganizedScan, config: &KeypointConfig) -> ExtractionResult {
    let per_line: Vec<(Keypoints, Vec<PointLabel>, Vec<f64>)> = scan
        .lines
        .par_iter()
        .map(|line| {
            let features = compute_line_features(line, config.neighbor_width);
            let labels = label_line(line, &features, config);
            let keypoints = collect_keypoints(line, &labels);
            (keypoints, labels, features.curvature)
        })
        .collect();

    let mut result = ExtractionResult::default();
    for (keypoints, labels, curvature) in per_line {
        result.keypoints.edges.extend(keypoints.edges);
        result.keypoints.planars.extend(keypoints.planars);
        result.labels.push(labels);
        result.curvature.push(curvature);
    }
    result
}

/// Label every point of one line.
pub fn label_line(
    line: &ScanLine,
    features: &LineFeatures,
    config: &KeypointConfig,
) -> Vec<PointLabel> {
    let n = line.len();
    let width = config.neighbor_width;
    let mut labels = vec![PointLabel::Unset; n];

    // Validity filter.
    for i in 0..n {
        if !features.valid[i] {
            labels[i] = PointLabel::Rejected;
        } else if line.points[i].range < config.min_distance_to_sensor {
            labels[i] = PointLabel::Rejected;
        }
    }
    reject_grazing(line, &mut labels, config);
    reject_occluded(line, &mut labels, config);

    // Selection with spatial spread: picking a point suppresses its
    // neighborhood for further picks.
    let mut suppressed = vec![false; n];
    let mut candidates: Vec<usize> = (0..n).filter(|&i| labels[i] == PointLabel::Unset).collect();

    candidates.sort_by(|&a, &b| {
        features.curvature[b]
            .partial_cmp(&features.curvature[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut picked = 0usize;
    for &i in &candidates {
        if picked >= config.max_edges_per_line
            || features.curvature[i] < config.edge_curvature_threshold
        {
            break;
        }
        if suppressed[i] || labels[i] != PointLabel::Unset {
            continue;
        }
        labels[i] = PointLabel::Edge;
        suppress_neighbors(&mut suppressed, i, width, n);
        picked += 1;
    }

    candidates.reverse();
    let mut picked = 0usize;
    for &i in &candidates {
        if picked >= config.max_planars_per_line
            || features.curvature[i] > config.plane_curvature_threshold
        {
            break;
        }
        if suppressed[i] || labels[i] != PointLabel::Unset {
            continue;
        }
        labels[i] = PointLabel::Planar;
        suppress_neighbors(&mut suppressed, i, width, n);
        picked += 1;
    }

    labels
}

/// Reject returns whose local surface is nearly parallel to the beam.
///
/// On a grazing surface the chord through the two neighbors lines up with
/// the viewing ray and stretches far beyond the nominal lateral step
/// `range * angle_resolution`; both conditions together single it out.
fn reject_grazing(line: &ScanLine, labels: &mut [PointLabel], config: &KeypointConfig) {
    let n = line.len();
    let cos_band = config.beam_grazing_band.cos();
    for i in 1..n.saturating_sub(1) {
        if labels[i] == PointLabel::Rejected {
            continue;
        }
        let chord = line.points[i + 1].position - line.points[i - 1].position;
        let chord_len = chord.norm();
        let expected_step = line.points[i].range * config.angle_resolution;
        if chord_len < 4.0 * expected_step || chord_len < 1e-9 {
            continue;
        }
        let ray = line.points[i].position / line.points[i].range.max(1e-9);
        let cos_angle = (chord.dot(&ray) / chord_len).abs();
        if cos_angle > cos_band {
            labels[i] = PointLabel::Rejected;
        }
    }
}

/// Reject the occluded side of every depth discontinuity.
fn reject_occluded(line: &ScanLine, labels: &mut [PointLabel], config: &KeypointConfig) {
    let n = line.len();
    let width = config.neighbor_width;
    for j in 0..n.saturating_sub(1) {
        let near = line.points[j].range.min(line.points[j + 1].range);
        let gap = (line.points[j].range - line.points[j + 1].range).abs();
        if gap <= config.depth_gap_relative_threshold * near {
            continue;
        }
        if line.points[j + 1].range > line.points[j].range {
            for label in labels.iter_mut().skip(j + 1).take(width) {
                *label = PointLabel::Rejected;
            }
        } else {
            let start = (j + 1).saturating_sub(width);
            for label in labels.iter_mut().take(j + 1).skip(start) {
                *label = PointLabel::Rejected;
            }
        }
    }
}

fn suppress_neighbors(suppressed: &mut [bool], i: usize, width: usize, n: usize) {
    let start = i.saturating_sub(width);
    let end = (i + width + 1).min(n);
    for s in suppressed.iter_mut().take(end).skip(start) {
        *s = true;
    }
}

fn collect_keypoints(line: &ScanLine, labels: &[PointLabel]) -> Keypoints {
    let mut keypoints = Keypoints::default();
    for (point, label) in line.points.iter().zip(labels) {
        let keypoint = Keypoint {
            position: point.position,
            time: point.time,
            laser_id: line.beam,
        };
        match label {
            PointLabel::Edge => keypoints.edges.push(keypoint),
            PointLabel::Planar => keypoints.planars.push(keypoint),
            _ => {}
        }
    }
    keypoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::organizer::ScanPoint;
    use nalgebra::Vector3;

    fn line_from_positions(positions: &[Vector3<f64>]) -> ScanLine {
        ScanLine {
            beam: 0,
            points: positions
                .iter()
                .enumerate()
                .map(|(i, p)| ScanPoint {
                    position: *p,
                    range: p.norm(),
                    intensity: 0.0,
                    time: i as f64 / positions.len() as f64,
                    source_index: i,
                })
                .collect(),
        }
    }

    fn test_config() -> KeypointConfig {
        KeypointConfig {
            neighbor_width: 2,
            max_edges_per_line: 4,
            max_planars_per_line: 8,
            edge_curvature_threshold: 0.01,
            plane_curvature_threshold: 0.001,
            min_distance_to_sensor: 0.5,
            ..KeypointConfig::default()
        }
    }

    /// Two wall segments meeting at a right angle; the corner vertex sits at
    /// index 15.
    fn corner_positions() -> Vec<Vector3<f64>> {
        let mut positions = Vec::new();
        for i in 0..=15 {
            positions.push(Vector3::new(5.0, -1.5 + 0.1 * i as f64, 0.0));
        }
        for i in 1..15 {
            positions.push(Vector3::new(5.0 - 0.1 * i as f64, 0.0, 0.0));
        }
        positions
    }

    const CORNER: usize = 15;

    #[test]
    fn test_corner_selected_as_edge() {
        let line = line_from_positions(&corner_positions());
        let config = test_config();
        let features = compute_line_features(&line, config.neighbor_width);
        let labels = label_line(&line, &features, &config);
        assert_eq!(labels[CORNER], PointLabel::Edge);
    }

    #[test]
    fn test_flat_stretch_selected_as_planar() {
        let line = line_from_positions(&corner_positions());
        let config = test_config();
        let features = compute_line_features(&line, config.neighbor_width);
        let labels = label_line(&line, &features, &config);
        assert!(labels.iter().any(|&l| l == PointLabel::Planar));
    }

    #[test]
    fn test_edge_neighbors_not_selected() {
        let line = line_from_positions(&corner_positions());
        let config = test_config();
        let features = compute_line_features(&line, config.neighbor_width);
        let labels = label_line(&line, &features, &config);
        for d in 1..=config.neighbor_width {
            assert_ne!(labels[CORNER - d], PointLabel::Edge);
            assert_ne!(labels[CORNER + d], PointLabel::Edge);
            assert_ne!(labels[CORNER - d], PointLabel::Planar);
            assert_ne!(labels[CORNER + d], PointLabel::Planar);
        }
    }

    #[test]
    fn test_too_close_rejected() {
        let mut positions = corner_positions();
        for p in &mut positions {
            *p *= 0.05; // everything within 0.5 m
        }
        let line = line_from_positions(&positions);
        let config = test_config();
        let features = compute_line_features(&line, config.neighbor_width);
        let labels = label_line(&line, &features, &config);
        assert!(labels.iter().all(|&l| l == PointLabel::Rejected));
    }

    #[test]
    fn test_quota_respected() {
        let line = line_from_positions(&corner_positions());
        let mut config = test_config();
        config.max_planars_per_line = 2;
        let features = compute_line_features(&line, config.neighbor_width);
        let labels = label_line(&line, &features, &config);
        let planars = labels.iter().filter(|&&l| l == PointLabel::Planar).count();
        assert!(planars <= 2);
    }

    #[test]
    fn test_occlusion_boundary_rejected() {
        // Near wall, then a far wall behind it: the first points of the far
        // wall must not become edges.
        let mut positions = Vec::new();
        for i in 0..12 {
            positions.push(Vector3::new(4.0, -1.0 + 0.08 * i as f64, 0.0));
        }
        for i in 0..12 {
            positions.push(Vector3::new(9.0, 0.1 + 0.18 * i as f64, 0.0));
        }
        let line = line_from_positions(&positions);
        let config = test_config();
        let features = compute_line_features(&line, config.neighbor_width);
        let labels = label_line(&line, &features, &config);
        for label in labels.iter().skip(12).take(config.neighbor_width) {
            assert_eq!(*label, PointLabel::Rejected);
        }
    }

    #[test]
    fn test_extraction_collects_both_classes() {
        use crate::core::{LidarFrame, LidarPoint};
        use crate::scan::organizer::{organize, SensorCalibration};

        let mut points = Vec::new();
        for (i, p) in corner_positions().into_iter().enumerate() {
            points.push(LidarPoint::new(p.x, p.y, p.z, 0, i as f64 * 1e-3));
        }
        let frame = LidarFrame::from_points(points);
        let calib = SensorCalibration::new(&[0], 1).unwrap();
        let scan = organize(&frame, &calib);
        let result = extract_keypoints(&scan, &test_config());
        assert!(!result.keypoints.edges.is_empty());
        assert!(!result.keypoints.planars.is_empty());
        assert_eq!(result.labels.len(), 1);
        assert_eq!(result.curvature[0].len(), frame.len());
    }
}
