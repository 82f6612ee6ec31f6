use crate::background::BackgroundModel;
use crate::config::{Config, DebugConfig, ObjectModelConfig, ObjectModelSharing, TrackerConfig};
use crate::detection::{DataPoint, Detection, NoPosition};
use crate::error::{Error, Result};
use crate::math::{self, min_area_rect, simplify_contour};
use crate::object_model::{ObjectModel, SharedObjectModel};
use crate::roi::Roi;
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::filter::separable_filter_equal;
use imageproc::point::Point;
use nalgebra as na;
use ndarray::{ArrayView2, ArrayViewMut2, Zip};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Per-ROI position estimator.
///
/// `image` is the ROI's bounding-rectangle crop and `mask` its polygon mask of
/// the same size. Timestamps are milliseconds and must not decrease.
pub trait Tracker: Send {
    fn track(&mut self, image: &RgbImage, mask: &GrayImage, t: i64) -> Result<Detection>;
}

/// Receives the side-by-side processing panel of one tracker.
pub trait DebugSink: Send {
    fn record(&mut self, t: i64, panel: &GrayImage) -> Result<()>;
}

/// Builds one tracker per ROI.
pub trait TrackerFactory {
    fn build(&mut self, roi: &Roi) -> Box<dyn Tracker>;
}

impl<F> TrackerFactory for F
where
    F: FnMut(&Roi) -> Box<dyn Tracker>,
{
    #[inline]
    fn build(&mut self, roi: &Roi) -> Box<dyn Tracker> {
        self(roi)
    }
}

#[derive(Debug, Clone)]
struct Buffers {
    grey: GrayImage,
    fg: GrayImage,
    prev_fg: GrayImage,
    /// `fg` inside a one-pixel zero border, so blobs touching the ROI edge
    /// still get an outer contour.
    padded_fg: GrayImage,
    kernel: Vec<f32>,
}

impl Buffers {
    fn new(w: u32, h: u32, config: &TrackerConfig) -> Self {
        let size = blur_kernel_size(w, h, config.object_expected_size);

        Self {
            grey: GrayImage::new(w, h),
            fg: GrayImage::new(w, h),
            prev_fg: GrayImage::new(w, h),
            padded_fg: GrayImage::new(w + 2, h + 2),
            kernel: if size > 1 {
                math::gaussian_kernel(size, config.blur_sigma)
            } else {
                Vec::new()
            },
        }
    }

    #[inline]
    fn dimensions(&self) -> (u32, u32) {
        self.grey.dimensions()
    }
}

/// Odd blur aperture scaled to the expected animal size.
fn blur_kernel_size(w: u32, h: u32, object_expected_size: f64) -> usize {
    let size = (object_expected_size * w.max(h) as f64 / 2.0) as usize;

    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

fn mass_centroid(width: usize, weights: impl Iterator<Item = u8>) -> Option<(f64, f64)> {
    let (mut m, mut mx, mut my) = (0.0, 0.0, 0.0);

    for (i, v) in weights.enumerate() {
        if v == 0 {
            continue;
        }

        let v = v as f64;
        m += v;
        mx += v * (i % width) as f64;
        my += v * (i / width) as f64;
    }

    (m > 0.0).then(|| (mx / m, my / m))
}

/// Adaptive background subtraction tracker for a single animal in one ROI.
pub struct AdaptiveBgTracker {
    roi_idx: usize,
    config: TrackerConfig,
    bg_model: BackgroundModel,
    object_model: SharedObjectModel,
    buffers: Buffers,
    old_pos: na::Complex<f64>,
    previous_shape: Vec<Point<i32>>,
    debug: Option<Box<dyn DebugSink>>,
}

impl AdaptiveBgTracker {
    pub fn new(roi: &Roi, config: TrackerConfig, object_model: SharedObjectModel) -> Self {
        let rect = roi.rect();

        Self {
            roi_idx: roi.idx(),
            bg_model: BackgroundModel::new(config.background),
            buffers: Buffers::new(rect.w, rect.h, &config),
            config,
            object_model,
            old_pos: na::Complex::new(0.0, 0.0),
            previous_shape: Vec::new(),
            debug: None,
        }
    }

    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug = Some(sink);
        self
    }

    #[inline]
    pub fn roi_idx(&self) -> usize {
        self.roi_idx
    }

    #[inline]
    pub fn background(&self) -> &BackgroundModel {
        &self.bg_model
    }

    #[inline]
    pub fn object_model(&self) -> &SharedObjectModel {
        &self.object_model
    }

    /// Simplified outline of the last accepted blob, in ROI coordinates.
    #[inline]
    pub fn previous_shape(&self) -> &[Point<i32>] {
        &self.previous_shape
    }

    /// Grey conversion, blur, optional inversion and mean normalisation into
    /// `buffers.grey`, masked to the ROI polygon.
    fn preprocess(&mut self, image: &RgbImage, mask: &GrayImage) {
        let (w, h) = image.dimensions();
        if self.buffers.dimensions() != (w, h) {
            warn!(roi = self.roi_idx, w, h, "ROI image size changed, reallocating buffers");
            self.buffers = Buffers::new(w, h, &self.config);
        }

        let Buffers { grey, kernel, .. } = &mut self.buffers;

        for (g, px) in grey.pixels_mut().zip(image.pixels()) {
            *g = Luma([math::luma(px)]);
        }

        if !kernel.is_empty() {
            *grey = separable_filter_equal(&*grey, kernel.as_slice());
        }

        if self.config.darker_foreground {
            imageops::invert(grey);
        }

        let (sum, count) = grey
            .pixels()
            .zip(mask.pixels())
            .filter(|(_, m)| m[0] > 0)
            .fold((0u64, 0u64), |(s, c), (g, _)| (s + g[0] as u64, c + 1));

        if count > 0 && sum > 0 {
            let scale = self.config.target_mean_intensity * count as f64 / sum as f64;

            for g in grey.pixels_mut() {
                g[0] = (g[0] as f64 * scale).round().min(255.0) as u8;
            }
        }

        for (g, m) in grey.pixels_mut().zip(mask.pixels()) {
            g[0] &= m[0];
        }
    }

    /// Intensity-weighted centre of the foreground present in both this and the
    /// previous frame, or of the current foreground when they do not overlap.
    fn centroid(&self) -> (f64, f64) {
        let width = self.buffers.fg.width() as usize;
        let fg = self.buffers.fg.as_raw();
        let prev = self.buffers.prev_fg.as_raw();

        mass_centroid(width, fg.iter().zip(prev).map(|(&c, &p)| c.min(p)))
            .or_else(|| mass_centroid(width, fg.iter().copied()))
            .unwrap_or_default()
    }

    /// Outer contours of the foreground blobs, in ROI coordinates.
    fn contours(&mut self) -> Vec<Vec<Point<i32>>> {
        let Buffers { fg, padded_fg, .. } = &mut self.buffers;
        imageops::replace(padded_fg, &*fg, 1, 1);

        let epsilon = self.config.contour_epsilon;

        find_contours::<i32>(&*padded_fg)
            .into_iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .map(|c| {
                let points: Vec<Point<i32>> = c
                    .points
                    .iter()
                    .map(|p| Point::new(p.x - 1, p.y - 1))
                    .collect();

                simplify_contour(&points, epsilon)
            })
            .collect()
    }

    fn detect(&mut self, image: &RgbImage, t: i64) -> Result<Detection> {
        let (w, h) = self.buffers.dimensions();
        let shape = (h as usize, w as usize);

        let Some(bg) = self.bg_model.bg_img().filter(|bg| bg.dim() == shape) else {
            self.old_pos = na::Complex::new(0.0, 0.0);
            return Ok(Detection::NotDetected(NoPosition::NoBackground));
        };

        std::mem::swap(&mut self.buffers.fg, &mut self.buffers.prev_fg);

        let threshold = self.config.foreground_threshold;
        let grey = ArrayView2::from_shape(shape, self.buffers.grey.as_raw().as_slice())?;
        let fg = ArrayViewMut2::from_shape(shape, &mut *self.buffers.fg)?;

        Zip::from(fg).and(&grey).and(bg).for_each(|f, &g, &b| {
            let d = g.saturating_sub(b as u8);
            *f = if d > threshold { d } else { 0 };
        });

        let n_fg = self.buffers.fg.as_raw().iter().filter(|&&v| v > 0).count();
        if n_fg == 0 {
            self.bg_model.increase_learning_rate();
            return Ok(Detection::NotDetected(NoPosition::EmptyForeground));
        }

        let prop_fg = n_fg as f64 / (w as f64 * h as f64);
        if prop_fg > self.config.max_area() {
            self.bg_model.increase_learning_rate();
            return Ok(Detection::NotDetected(NoPosition::ForegroundTooLarge));
        }

        let mut contours = self.contours();
        let mut model = self.object_model.lock();

        let (contour, cost, ambiguous) = match contours.len() {
            0 => {
                self.bg_model.increase_learning_rate();
                return Ok(Detection::NotDetected(NoPosition::NoContour));
            }

            1 => {
                let contour = contours.swap_remove(0);
                if contour.len() < 3 {
                    self.bg_model.increase_learning_rate();
                    return Ok(Detection::NotDetected(NoPosition::DegenerateContour));
                }

                let features = model.compute_features(image, &contour);
                let cost = model.distance(&features, t);

                (contour, cost, false)
            }

            n => {
                if !model.is_ready() {
                    return Ok(Detection::NotDetected(NoPosition::ModelNotReady));
                }

                contours.retain(|c| c.len() >= 3);
                let ambiguous = contours.len() > 1;
                trace!(roi = self.roi_idx, t, blobs = n, valid = contours.len(), "several candidates");

                let mut best: Option<(Vec<Point<i32>>, f64)> = None;
                for contour in contours {
                    let features = model.compute_features(image, &contour);
                    let cost = model.distance(&features, t);

                    if best.as_ref().map_or(true, |(_, c)| cost < *c) {
                        best = Some((contour, cost));
                    }
                }

                let Some((contour, cost)) = best else {
                    return Ok(Detection::NotDetected(NoPosition::NoValidCandidate));
                };

                (contour, cost, ambiguous)
            }
        };

        if cost > self.config.max_appearance_cost {
            trace!(roi = self.roi_idx, t, cost, "candidate does not look like the animal");
            self.bg_model.increase_learning_rate();
            return Ok(Detection::NotDetected(NoPosition::AppearanceMismatch));
        }

        let rect = min_area_rect(&contour).normalized();
        let max_side = self.config.max_size_ratio * w.min(h) as f64;
        if rect.width > max_side || rect.height > max_side {
            return Ok(Detection::NotDetected(NoPosition::ImplausibleSize));
        }

        let (x, y) = self.centroid();
        let pos = na::Complex::new(x, y);
        let xy_dist = (pos - self.old_pos).norm().round() as i32;
        self.old_pos = pos;

        if ambiguous {
            self.bg_model.increase_learning_rate();
            self.bg_model.update(&self.buffers.grey, t, None)?;
        } else {
            self.bg_model.decrease_learning_rate();
            self.bg_model
                .update(&self.buffers.grey, t, Some(&self.buffers.fg))?;
        }

        model.update(image, &contour, t);
        drop(model);

        self.previous_shape = contour;

        Ok(Detection::Detected(DataPoint {
            t,
            x: x.round() as i32,
            y: y.round() as i32,
            w: rect.width.round() as i32,
            h: rect.height.round() as i32,
            phi: rect.angle.round() as i32,
            xy_dist,
            has_interacted: false,
        }))
    }

    fn record_debug(&mut self, t: i64, point: Option<&DataPoint>) {
        let Some(sink) = self.debug.as_mut() else {
            return;
        };

        let panel = debug_panel(&self.buffers, self.bg_model.to_gray_image(), point);
        if let Err(err) = sink.record(t, &panel) {
            warn!(roi = self.roi_idx, %err, "failed to record debug panel");
        }
    }
}

impl Tracker for AdaptiveBgTracker {
    fn track(&mut self, image: &RgbImage, mask: &GrayImage, t: i64) -> Result<Detection> {
        if image.dimensions() != mask.dimensions() {
            return Err(Error::MaskMismatch {
                mask_w: mask.width(),
                mask_h: mask.height(),
                frame_w: image.width(),
                frame_h: image.height(),
            });
        }

        self.preprocess(image, mask);

        let detection = self.detect(image, t)?;
        if let Detection::NotDetected(reason) = detection {
            trace!(roi = self.roi_idx, t, ?reason, "no position");
            self.bg_model.update(&self.buffers.grey, t, None)?;
        }

        self.record_debug(t, detection.point());

        Ok(detection)
    }
}

/// `grey | background | foreground` with the detection outlined.
fn debug_panel(buffers: &Buffers, bg: Option<GrayImage>, point: Option<&DataPoint>) -> GrayImage {
    let (w, h) = buffers.dimensions();
    let mut panel = GrayImage::new(w * 3, h);

    imageops::replace(&mut panel, &buffers.grey, 0, 0);
    if let Some(bg) = bg {
        imageops::replace(&mut panel, &bg, w as i64, 0);
    }

    let mut fg = buffers.fg.clone();
    if let Some(point) = point {
        let corners = point.rotated_rect().corners();

        for (i, a) in corners.iter().enumerate() {
            let b = corners[(i + 1) % corners.len()];
            draw_line_segment_mut(
                &mut fg,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                Luma([255u8]),
            );
        }
    }
    imageops::replace(&mut panel, &fg, 2 * w as i64, 0);

    panel
}

/// Builds [`AdaptiveBgTracker`]s that share, or not, one appearance model.
pub struct AdaptiveBgFactory {
    tracker: TrackerConfig,
    object_model: ObjectModelConfig,
    sharing: ObjectModelSharing,
    shared: SharedObjectModel,
    debug: Option<DebugConfig>,
    debug_sink: Option<Box<dyn DebugSink>>,
}

impl AdaptiveBgFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            tracker: config.tracker,
            object_model: config.object_model,
            sharing: config.object_model_sharing,
            shared: ObjectModel::shared(config.object_model),
            debug: config.debug.clone(),
            debug_sink: None,
        }
    }

    /// Sink for the ROI selected by the `debug` config entry. Only that one
    /// tracker records panels. Takes precedence over `debug.video_file`.
    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    /// The model handed to every tracker when sharing per run.
    #[inline]
    pub fn shared_object_model(&self) -> &SharedObjectModel {
        &self.shared
    }
}

impl TrackerFactory for AdaptiveBgFactory {
    fn build(&mut self, roi: &Roi) -> Box<dyn Tracker> {
        let object_model = match self.sharing {
            ObjectModelSharing::PerRun => Arc::clone(&self.shared),
            ObjectModelSharing::PerRoi => ObjectModel::shared(self.object_model),
        };

        let mut tracker = AdaptiveBgTracker::new(roi, self.tracker, object_model);

        if self.debug.as_ref().is_some_and(|d| Some(d.roi_value) == roi.value()) {
            let debug = self.debug.take();
            let sink = self
                .debug_sink
                .take()
                .or_else(|| debug.as_ref().and_then(video_debug_sink));

            if let Some(sink) = sink {
                debug!(roi = roi.idx(), "recording debug panels");
                tracker = tracker.with_debug_sink(sink);
            }
        }

        Box::new(tracker)
    }
}

#[cfg(feature = "opencv")]
fn video_debug_sink(debug: &DebugConfig) -> Option<Box<dyn DebugSink>> {
    let path = debug.video_file.as_deref()?;

    Some(Box::new(crate::movie::VideoDebugSink::new(path, debug.fps)))
}

#[cfg(not(feature = "opencv"))]
fn video_debug_sink(debug: &DebugConfig) -> Option<Box<dyn DebugSink>> {
    if let Some(path) = debug.video_file.as_deref() {
        warn!(path, "debug video output requires the `opencv` feature");
    }

    None
}
