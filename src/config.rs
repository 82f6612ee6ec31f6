use crate::error::Result;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/// Running-average background settings. Half-lives are in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct BackgroundModelConfig {
    pub min_half_life_ms: f64,
    pub max_half_life_ms: f64,
    /// Multiplicative step applied to the half-life by the learning rate controls.
    pub learning_rate_factor: f64,
}

impl Default for BackgroundModelConfig {
    fn default() -> Self {
        Self {
            min_half_life_ms: 1_000.0,
            max_half_life_ms: 100_000.0,
            learning_rate_factor: 1.2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ObjectModelConfig {
    /// Number of feature vectors kept in the ring buffer.
    pub history_length: usize,
    /// The model is emptied when it has not been touched for longer than this.
    pub max_unupdated_duration_ms: i64,
}

impl Default for ObjectModelConfig {
    fn default() -> Self {
        Self {
            history_length: 1000,
            max_unupdated_duration_ms: 60 * 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Expected organism size as a proportion of the ROI main axis.
    pub object_expected_size: f64,
    /// The largest foreground fraction accepted is `(max_area_factor * object_expected_size)^2`.
    pub max_area_factor: f64,
    pub blur_sigma: f64,
    /// Invert the grey image so that a dark animal becomes bright foreground.
    pub darker_foreground: bool,
    /// Masked mean intensity every frame is rescaled to.
    pub target_mean_intensity: f64,
    /// Foreground pixels at or below this value are zeroed.
    pub foreground_threshold: u8,
    /// Douglas-Peucker tolerance for contour simplification, in pixels.
    pub contour_epsilon: f64,
    /// Highest appearance cost (negative mean log10-likelihood) accepted.
    pub max_appearance_cost: f64,
    /// Detections larger than `max_size_ratio * min(frame width, frame height)` are rejected.
    pub max_size_ratio: f64,
    pub background: BackgroundModelConfig,
}

impl TrackerConfig {
    #[inline]
    pub fn max_area(&self) -> f64 {
        let side = self.max_area_factor * self.object_expected_size;

        side * side
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            object_expected_size: 0.035,
            max_area_factor: 5.0,
            blur_sigma: 1.2,
            darker_foreground: true,
            target_mean_intensity: 128.0,
            foreground_threshold: 20,
            contour_epsilon: 1.2,
            max_appearance_cost: 6.0,
            max_size_ratio: 2.0,
            background: BackgroundModelConfig::default(),
        }
    }
}

/// Whether all trackers of a run pool their appearance statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectModelSharing {
    #[default]
    PerRun,
    PerRoi,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    pub draw_results: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { draw_results: true }
    }
}

/// Records a processing panel for the single ROI carrying this value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub roi_value: i32,
    /// Greyscale DIVX file the panels are appended to. Needs the `opencv` feature.
    pub video_file: Option<String>,
    pub fps: f64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            roi_value: 0,
            video_file: None,
            fps: 2.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub object_model: ObjectModelConfig,
    pub object_model_sharing: ObjectModelSharing,
    pub monitor: MonitorConfig,
    pub debug: Option<DebugConfig>,
}

impl Config {
    pub fn from_json_str(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let src = std::fs::read_to_string(path)?;

        Self::from_json_str(&src)
    }
}
