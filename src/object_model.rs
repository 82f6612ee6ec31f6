use crate::circular_queue::CircularQueue;
use crate::config::ObjectModelConfig;
use crate::math::{self, bounding_rect, min_area_rect};
use image::{GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::contour_area;
use imageproc::point::Point;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// `[log10(area + 1), short side + 1, mean grey + 1]` of one blob.
pub type Features = [f64; 3];

pub const FEATURES_HEADER: [&str; 3] = ["fg_model_area", "fg_model_height", "fg_model_mean_grey"];

/// Appearance model handed to every tracker that should pool statistics with it.
pub type SharedObjectModel = Arc<Mutex<ObjectModel>>;

/// Rolling statistical model of the tracked animal's appearance.
///
/// Candidate blobs are scored by their negative mean log10-likelihood under
/// per-feature normal distributions fitted on recent detections. The score is a
/// cost: lower is a better match, and 0 means "accept" whenever the model has
/// too little information to judge.
#[derive(Debug, Clone)]
pub struct ObjectModel {
    config: ObjectModelConfig,
    history: CircularQueue<Features>,
    last_updated_time: i64,
}

impl ObjectModel {
    pub fn new(config: ObjectModelConfig) -> Self {
        Self {
            history: CircularQueue::with_capacity(config.history_length),
            config,
            last_updated_time: 0,
        }
    }

    #[inline]
    pub fn shared(config: ObjectModelConfig) -> SharedObjectModel {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// `true` once the history buffer has wrapped around.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.history.is_full()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    #[inline]
    pub fn last_updated_time(&self) -> i64 {
        self.last_updated_time
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_updated_time = 0;
    }

    #[inline]
    fn is_stale(&self, t: i64) -> bool {
        t - self.last_updated_time > self.config.max_unupdated_duration_ms
    }

    pub fn compute_features(&self, image: &RgbImage, contour: &[Point<i32>]) -> Features {
        let area = contour_area(contour);
        let rect = min_area_rect(contour);
        let height = rect.width.min(rect.height);
        let mean_grey = mean_grey_inside(image, contour);

        [(area + 1.0).log10(), height + 1.0, mean_grey + 1.0]
    }

    pub fn update(&mut self, image: &RgbImage, contour: &[Point<i32>], t: i64) {
        if self.is_stale(t) && !self.is_empty() {
            warn!(t, last = self.last_updated_time, "object model not updated for too long, resetting");
            self.reset();
        }

        self.last_updated_time = t;

        let features = self.compute_features(image, contour);
        if self.history.push(features) {
            debug!(t, len = self.history.capacity(), "object model ready");
        }
    }

    /// Appearance cost of `features`, 0 when the model cannot discriminate.
    pub fn distance(&mut self, features: &Features, t: i64) -> f64 {
        if self.is_stale(t) {
            if !self.is_empty() {
                warn!(t, last = self.last_updated_time, "object model not updated for too long, resetting");
            }

            self.reset();
            return 0.0;
        }

        let rows = self.history.filled();
        if rows.is_empty() {
            return 0.0;
        }

        let n = rows.len() as f64;
        let mut means = [0.0; 3];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut stds = [0.0; 3];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m).abs() / n;
            }
        }

        if stds.iter().any(|&s| s == 0.0) {
            return 0.0;
        }

        let mut log_sum = 0.0;
        for ((x, m), s) in features.iter().zip(&means).zip(&stds) {
            let likelihood = math::gauss_likelihood(*x, *m, *s);
            if likelihood == 0.0 {
                return 0.0;
            }

            log_sum += likelihood.log10();
        }

        -log_sum / features.len() as f64
    }
}

/// Mean grey level of the pixels covered by the filled contour.
fn mean_grey_inside(image: &RgbImage, contour: &[Point<i32>]) -> f64 {
    let (x, y, w, h) = bounding_rect(contour);
    if w == 0 || h == 0 {
        return 0.0;
    }

    let mut mask = GrayImage::new(w, h);
    let local: Vec<Point<i32>> = contour
        .iter()
        .map(|p| Point::new(p.x - x, p.y - y))
        .collect();

    if local.len() >= 3 && local.first() != local.last() {
        draw_polygon_mut(&mut mask, &local, Luma([255u8]));
    } else {
        for p in &local {
            mask.put_pixel(p.x as u32, p.y as u32, Luma([255u8]));
        }
    }

    let (mut sum, mut count) = (0u64, 0u64);
    for (mx, my, m) in mask.enumerate_pixels() {
        let (ix, iy) = (x + mx as i32, y + my as i32);

        if m[0] == 0 || ix < 0 || iy < 0 || ix as u32 >= image.width() || iy as u32 >= image.height() {
            continue;
        }

        sum += math::luma(image.get_pixel(ix as u32, iy as u32)) as u64;
        count += 1;
    }

    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
