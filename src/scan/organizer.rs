//! Scan organizer: assign points to beams, sort each beam by azimuth.
//!
//! The raw frame arrives as an unordered point batch whose `laser_id` field
//! is the sensor's own numbering, which is not sorted by vertical angle. The
//! calibration remaps laser ids onto vertical-angle-ordered beam indices;
//! points are then bucketed per beam and sorted by azimuth, keeping forward
//! and inverse index mappings so per-point diagnostics can be written back
//! in input order.

use log::debug;
use nalgebra::Vector3;

use crate::core::{LidarFrame, LidarPoint};
use crate::error::{Result, SlamError};

/// Laser-id remapping supplied by the host.
#[derive(Clone, Debug)]
pub struct SensorCalibration {
    /// `beam_of_laser[raw_laser_id]` is the beam index sorted by vertical
    /// angle.
    pub beam_of_laser: Vec<u16>,
    /// Number of beams the sensor produces.
    pub n_beams: usize,
}

impl SensorCalibration {
    /// Build and validate a calibration.
    pub fn new(laser_id_mapping: &[u16], n_lasers: usize) -> Result<Self> {
        if n_lasers == 0 || laser_id_mapping.is_empty() {
            return Err(SlamError::InvalidCalibration(
                "empty laser id mapping".into(),
            ));
        }
        if let Some(&bad) = laser_id_mapping.iter().find(|&&b| b as usize >= n_lasers) {
            return Err(SlamError::InvalidCalibration(format!(
                "beam index {bad} out of range for {n_lasers} lasers"
            )));
        }
        Ok(Self {
            beam_of_laser: laser_id_mapping.to_vec(),
            n_beams: n_lasers,
        })
    }

    /// Beam index for a raw laser id, if the id is known.
    #[inline]
    pub fn beam_index(&self, laser_id: u16) -> Option<u16> {
        self.beam_of_laser.get(laser_id as usize).copied()
    }
}

/// One point after organization.
#[derive(Clone, Copy, Debug)]
pub struct ScanPoint {
    /// Position in the sensor frame.
    pub position: Vector3<f64>,
    /// Distance to the sensor, cached.
    pub range: f64,
    /// Return intensity.
    pub intensity: f32,
    /// In-sweep acquisition time in `[0, 1)`.
    pub time: f64,
    /// Index of the point in the input frame.
    pub source_index: usize,
}

impl ScanPoint {
    fn from_lidar(p: &LidarPoint, source_index: usize) -> Self {
        Self {
            position: p.position(),
            range: p.range(),
            intensity: p.intensity,
            time: p.time,
            source_index,
        }
    }
}

/// Points of one beam, sorted by azimuth.
#[derive(Clone, Debug, Default)]
pub struct ScanLine {
    /// Beam index the line belongs to.
    pub beam: u16,
    /// Points sorted by azimuth.
    pub points: Vec<ScanPoint>,
}

impl ScanLine {
    /// Number of points in the line.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check whether the line is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A frame organized into per-beam scan lines.
#[derive(Clone, Debug, Default)]
pub struct OrganizedScan {
    /// One line per beam; lines may be empty.
    pub lines: Vec<ScanLine>,
    /// `forward[input_index] = Some((line, position))`; `None` for dropped
    /// points.
    pub forward: Vec<Option<(u16, u32)>>,
    /// Number of input points dropped (unknown laser id or non-finite).
    pub dropped: usize,
    /// Size of the input frame the mappings refer to.
    pub input_len: usize,
}

impl OrganizedScan {
    /// Total number of organized points.
    pub fn point_count(&self) -> usize {
        self.lines.iter().map(ScanLine::len).sum()
    }

    /// True when no point survived organization.
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(ScanLine::is_empty)
    }
}

/// Organize a raw frame into azimuth-sorted scan lines.
pub fn organize(frame: &LidarFrame, calibration: &SensorCalibration) -> OrganizedScan {
    let mut lines: Vec<ScanLine> = (0..calibration.n_beams)
        .map(|beam| ScanLine {
            beam: beam as u16,
            points: Vec::new(),
        })
        .collect();

    let mut dropped = 0usize;
    for (index, point) in frame.points.iter().enumerate() {
        let beam = match calibration.beam_index(point.laser_id) {
            Some(beam) if point.is_finite() => beam,
            _ => {
                dropped += 1;
                continue;
            }
        };
        lines[beam as usize]
            .points
            .push(ScanPoint::from_lidar(point, index));
    }

    for line in &mut lines {
        line.points.sort_by(|a, b| {
            let az_a = a.position.y.atan2(a.position.x);
            let az_b = b.position.y.atan2(b.position.x);
            az_a.partial_cmp(&az_b).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    let mut forward = vec![None; frame.points.len()];
    for (line_idx, line) in lines.iter().enumerate() {
        for (pos, point) in line.points.iter().enumerate() {
            forward[point.source_index] = Some((line_idx as u16, pos as u32));
        }
    }

    if dropped > 0 {
        debug!("organizer dropped {dropped} of {} points", frame.len());
    }

    OrganizedScan {
        lines,
        forward,
        dropped,
        input_len: frame.points.len(),
    }
}
