//! Per-line discrete differential features.
//!
//! The curvature computed here is the curvature of the scan line taken in
//! isolation, not of the surface that produced it: a corner crossed by the
//! line spikes it, a wall keeps it near zero. The depth gap and the beam
//! angle feed the validity filter of the keypoint selector.

use super::organizer::ScanLine;

/// Differential features of one scan line, indexed by position in the line.
#[derive(Clone, Debug, Default)]
pub struct LineFeatures {
    /// `||sum_{k != i} (p_i - p_k)||^2` over the symmetric neighborhood.
    pub curvature: Vec<f64>,
    /// Max range jump between consecutive points in the neighborhood.
    pub depth_gap: Vec<f64>,
    /// Angle between `(p_{i-1} - p_i)` and `(p_{i+1} - p_i)`, radians.
    pub beam_angle: Vec<f64>,
    /// False for points whose neighborhood does not fit inside the line.
    pub valid: Vec<bool>,
}

impl LineFeatures {
    /// Number of points the features describe.
    pub fn len(&self) -> usize {
        self.curvature.len()
    }

    /// Check whether the feature arrays are empty.
    pub fn is_empty(&self) -> bool {
        self.curvature.is_empty()
    }
}

/// Compute features for one scan line with half-window `width`.
pub fn compute_line_features(line: &ScanLine, width: usize) -> LineFeatures {
    let n = line.len();
    let mut features = LineFeatures {
        curvature: vec![0.0; n],
        depth_gap: vec![0.0; n],
        beam_angle: vec![0.0; n],
        valid: vec![false; n],
    };

    if n < 2 * width + 1 {
        return features;
    }

    let points = &line.points;
    for i in width..n - width {
        // Curvature: the difference sum degenerates to zero on a locally
        // straight, evenly sampled stretch and grows across corners.
        let mut diff_sum = nalgebra::Vector3::zeros();
        for k in i - width..=i + width {
            if k != i {
                diff_sum += points[i].position - points[k].position;
            }
        }
        features.curvature[i] = diff_sum.norm_squared();

        let mut max_gap = 0.0f64;
        for j in i - width..i + width {
            let gap = (points[j].range - points[j + 1].range).abs();
            if gap > max_gap {
                max_gap = gap;
            }
        }
        features.depth_gap[i] = max_gap;

        let left = points[i - 1].position - points[i].position;
        let right = points[i + 1].position - points[i].position;
        let denom = left.norm() * right.norm();
        features.beam_angle[i] = if denom > 1e-12 {
            (left.dot(&right) / denom).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };

        features.valid[i] = true;
    }

    features
}
