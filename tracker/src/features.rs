//! Per-frame facial feature vectors.
//!
//! A `FeatureVector` is the landmark-derived geometry of one processed frame
//! followed by the head pose. Models always see the full row, pose included.

use serde::{Deserialize, Serialize};

use crate::screen::GazePoint;

/// Head orientation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl HeadPose {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }
}

/// Number of trailing head-pose components in a feature row.
pub const POSE_DIM: usize = 3;

/// Immutable feature vector for one frame.
///
/// Serialized as a flat array: ratios followed by yaw, pitch, roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FeatureVector {
    ratios: Vec<f64>,
    pose: HeadPose,
}

impl FeatureVector {
    pub fn new(ratios: Vec<f64>, pose: HeadPose) -> Self {
        Self { ratios, pose }
    }

    /// Rebuild from a flat row; the last three values are the head pose.
    pub fn from_row(row: &[f64]) -> Option<Self> {
        if row.len() < POSE_DIM {
            return None;
        }
        let split = row.len() - POSE_DIM;
        Some(Self {
            ratios: row[..split].to_vec(),
            pose: HeadPose::new(row[split], row[split + 1], row[split + 2]),
        })
    }

    pub fn ratios(&self) -> &[f64] {
        &self.ratios
    }

    pub fn pose(&self) -> HeadPose {
        self.pose
    }

    /// Total row length including the pose angles.
    pub fn len(&self) -> usize {
        self.ratios.len() + POSE_DIM
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The design-matrix row for this frame.
    pub fn as_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.len());
        row.extend_from_slice(&self.ratios);
        row.push(self.pose.yaw);
        row.push(self.pose.pitch);
        row.push(self.pose.roll);
        row
    }

    pub fn is_finite(&self) -> bool {
        self.ratios.iter().all(|v| v.is_finite())
            && self.pose.yaw.is_finite()
            && self.pose.pitch.is_finite()
            && self.pose.roll.is_finite()
    }
}

impl TryFrom<Vec<f64>> for FeatureVector {
    type Error = String;

    fn try_from(row: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_row(&row).ok_or_else(|| {
            format!(
                "feature row needs at least {} values (head pose), got {}",
                POSE_DIM,
                row.len()
            )
        })
    }
}

impl From<FeatureVector> for Vec<f64> {
    fn from(v: FeatureVector) -> Self {
        v.as_row()
    }
}

/// A feature vector captured while the user looked at a known target.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSample {
    pub features: FeatureVector,
    pub target: GazePoint,
    /// Index of the calibration point the sample belongs to.
    pub point: usize,
}
