use crate::math::RotatedRect;
use crate::roi::Roi;
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One timestamped detection for one ROI. Positions are relative to the ROI offset.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPoint {
    pub t: i64,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub phi: i32,
    /// Distance moved since the previous detection, in pixels.
    pub xy_dist: i32,
    #[serde(default)]
    pub has_interacted: bool,
}

impl DataPoint {
    /// The same point expressed in frame coordinates.
    pub fn to_absolute(&self, roi: &Roi) -> Self {
        let (ox, oy) = roi.offset();

        Self {
            x: self.x + ox as i32,
            y: self.y + oy as i32,
            ..*self
        }
    }

    /// Oriented box of the detection, centred on the reported position.
    pub fn rotated_rect(&self) -> RotatedRect {
        RotatedRect {
            center: na::Point2::new(self.x as f64, self.y as f64),
            width: self.w as f64,
            height: self.h as f64,
            angle: self.phi as f64,
        }
    }

    #[inline]
    pub fn with_interaction(self, has_interacted: bool) -> Self {
        Self {
            has_interacted,
            ..self
        }
    }

    /// Named numeric variables, in output column order.
    pub fn variables(&self) -> [(&'static str, i64); 7] {
        [
            ("x", self.x as i64),
            ("y", self.y as i64),
            ("w", self.w as i64),
            ("h", self.h as i64),
            ("phi", self.phi as i64),
            ("xy_dist", self.xy_dist as i64),
            ("has_interacted", self.has_interacted as i64),
        ]
    }
}

/// Why a tracker could not resolve a position this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoPosition {
    /// First frame: the background estimate is being initialised.
    NoBackground,
    EmptyForeground,
    ForegroundTooLarge,
    NoContour,
    DegenerateContour,
    /// Several blobs, and too little appearance history to pick one.
    ModelNotReady,
    NoValidCandidate,
    AppearanceMismatch,
    ImplausibleSize,
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    Detected(DataPoint),
    NotDetected(NoPosition),
}

impl Detection {
    #[inline]
    pub fn point(&self) -> Option<&DataPoint> {
        match self {
            Detection::Detected(p) => Some(p),
            Detection::NotDetected(_) => None,
        }
    }

    #[inline]
    pub fn into_point(self) -> Option<DataPoint> {
        match self {
            Detection::Detected(p) => Some(p),
            Detection::NotDetected(_) => None,
        }
    }
}

/// Detections of one frame, keyed by ROI index.
pub type Positions = BTreeMap<usize, DataPoint>;
