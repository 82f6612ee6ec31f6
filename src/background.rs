use crate::config::BackgroundModelConfig;
use crate::error::{Error, Result};
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate_mut;
use ndarray::{Array2, ArrayView2, Zip};
use std::f64::consts::LN_2;
use tracing::{debug, warn};

/// Running-average background estimate of one ROI.
///
/// The blend weight of each new frame follows from the time elapsed since the
/// previous update and the current half-life, so irregular frame rates are
/// handled naturally. The half-life is steered by the tracker: shorter after
/// failed or ambiguous frames, longer after confident detections.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    config: BackgroundModelConfig,
    half_life: f64,
    bg: Option<Array2<f32>>,
    alpha: Array2<f32>,
    protected: GrayImage,
    last_t: i64,
}

impl BackgroundModel {
    pub fn new(config: BackgroundModelConfig) -> Self {
        Self {
            half_life: config.min_half_life_ms,
            config,
            bg: None,
            alpha: Array2::zeros((0, 0)),
            protected: GrayImage::new(0, 0),
            last_t: 0,
        }
    }

    #[inline]
    pub fn bg_img(&self) -> Option<&Array2<f32>> {
        self.bg.as_ref()
    }

    #[inline]
    pub fn half_life(&self) -> f64 {
        self.half_life
    }

    #[inline]
    pub fn last_t(&self) -> i64 {
        self.last_t
    }

    #[inline]
    pub fn increase_learning_rate(&mut self) {
        self.half_life /= self.config.learning_rate_factor;
    }

    #[inline]
    pub fn decrease_learning_rate(&mut self) {
        self.half_life *= self.config.learning_rate_factor;
    }

    /// Blends `frame` into the background. Pixels set in `fg_mask` (dilated by
    /// one pixel) keep their previous background value.
    pub fn update(&mut self, frame: &GrayImage, t: i64, fg_mask: Option<&GrayImage>) -> Result<()> {
        let dt = t - self.last_t;
        if dt < 0 {
            return Err(Error::Timing {
                last: self.last_t,
                t,
            });
        }

        let (w, h) = frame.dimensions();
        if let Some(mask) = fg_mask.filter(|m| m.dimensions() != (w, h)) {
            return Err(Error::MaskMismatch {
                mask_w: mask.width(),
                mask_h: mask.height(),
                frame_w: w,
                frame_h: h,
            });
        }

        self.half_life = self
            .half_life
            .clamp(self.config.min_half_life_ms, self.config.max_half_life_ms);

        let shape = (h as usize, w as usize);
        let img = ArrayView2::from_shape(shape, frame.as_raw().as_slice())?;

        if self.bg.as_ref().map_or(true, |bg| bg.dim() != shape) {
            if self.bg.is_some() {
                warn!(w, h, "frame size changed, resetting background");
            }

            self.bg = Some(img.mapv(|v| v as f32));
            self.alpha = Array2::zeros(shape);
        }

        let alpha = (1.0 - (-LN_2 * dt as f64 / self.half_life).exp()) as f32;
        self.alpha.fill(alpha);

        if let Some(mask) = fg_mask {
            if self.protected.dimensions() != (w, h) {
                self.protected = GrayImage::new(w, h);
            }
            self.protected.copy_from_slice(mask.as_raw());
            dilate_mut(&mut self.protected, Norm::LInf, 1);

            let dilated = ArrayView2::from_shape(shape, self.protected.as_raw().as_slice())?;

            Zip::from(&mut self.alpha)
                .and(&dilated)
                .for_each(|a, &m| {
                    if m > 0 {
                        *a = 0.0;
                    }
                });
        }

        if let Some(bg) = self.bg.as_mut() {
            Zip::from(bg)
                .and(&img)
                .and(&self.alpha)
                .for_each(|b, &v, &a| *b = a * v as f32 + (1.0 - a) * *b);
        }

        debug!(t, dt, half_life = self.half_life, alpha, "background updated");
        self.last_t = t;

        Ok(())
    }

    /// The background truncated to 8 bits.
    pub fn to_gray_image(&self) -> Option<GrayImage> {
        let bg = self.bg.as_ref()?;
        let (h, w) = bg.dim();

        GrayImage::from_raw(w as u32, h as u32, bg.iter().map(|&v| v as u8).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    fn flat(w: u32, h: u32, v: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([v]))
    }

    #[test]
    fn first_update_initializes_background() {
        let mut model = BackgroundModel::new(BackgroundModelConfig::default());
        assert!(model.bg_img().is_none());

        model.update(&flat(8, 6, 100), 0, None).unwrap();

        let bg = model.bg_img().unwrap();
        assert_eq!(bg.dim(), (6, 8));
        assert_relative_eq!(bg[[3, 4]], 100.0);
        assert_eq!(model.last_t(), 0);
    }

    #[test]
    fn negative_interval_is_a_timing_error() {
        for mask in [None, Some(flat(4, 4, 255))] {
            let mut model = BackgroundModel::new(BackgroundModelConfig::default());
            model.update(&flat(4, 4, 10), 1000, None).unwrap();

            let err = model.update(&flat(4, 4, 10), 999, mask.as_ref()).unwrap_err();
            assert!(err.is_timing());
            assert_eq!(model.last_t(), 1000);
        }
    }

    #[test]
    fn one_half_life_moves_halfway() {
        let mut model = BackgroundModel::new(BackgroundModelConfig::default());
        model.update(&flat(4, 4, 0), 0, None).unwrap();
        model.update(&flat(4, 4, 200), 1000, None).unwrap();

        assert_relative_eq!(model.bg_img().unwrap()[[1, 1]], 100.0, epsilon = 1e-3);
    }

    #[test]
    fn masked_update_stays_closer_to_prior() {
        let mut masked = BackgroundModel::new(BackgroundModelConfig::default());
        let mut unmasked = masked.clone();

        masked.update(&flat(6, 6, 50), 0, None).unwrap();
        unmasked.update(&flat(6, 6, 50), 0, None).unwrap();

        let mask = flat(6, 6, 255);
        masked.update(&flat(6, 6, 250), 500, Some(&mask)).unwrap();
        unmasked.update(&flat(6, 6, 250), 500, None).unwrap();

        let prior = 50.0f32;
        let m = masked.bg_img().unwrap();
        let u = unmasked.bg_img().unwrap();

        for (a, b) in m.iter().zip(u.iter()) {
            assert!((a - prior).abs() < (b - prior).abs());
        }
        assert_eq!(masked.last_t(), 500);
    }

    #[test]
    fn mask_protects_dilated_neighbourhood_only() {
        let mut model = BackgroundModel::new(BackgroundModelConfig::default());
        model.update(&flat(9, 9, 0), 0, None).unwrap();

        let mut mask = flat(9, 9, 0);
        mask.put_pixel(4, 4, Luma([255]));
        model.update(&flat(9, 9, 100), 1000, Some(&mask)).unwrap();

        let bg = model.bg_img().unwrap();
        assert_relative_eq!(bg[[4, 4]], 0.0);
        assert_relative_eq!(bg[[3, 5]], 0.0);
        assert_relative_eq!(bg[[0, 0]], 50.0, epsilon = 1e-3);
    }

    #[test]
    fn mask_of_wrong_size_is_rejected() {
        let mut model = BackgroundModel::new(BackgroundModelConfig::default());
        model.update(&flat(6, 6, 0), 0, None).unwrap();

        let err = model
            .update(&flat(6, 6, 100), 40, Some(&flat(3, 6, 255)))
            .unwrap_err();

        assert!(matches!(err, Error::MaskMismatch { mask_w: 3, .. }));
        assert_eq!(model.last_t(), 0);
    }

    #[test]
    fn half_life_is_clipped_on_update() {
        let cfg = BackgroundModelConfig::default();
        let mut model = BackgroundModel::new(cfg);

        for _ in 0..100 {
            model.decrease_learning_rate();
        }
        model.update(&flat(2, 2, 0), 0, None).unwrap();
        assert_relative_eq!(model.half_life(), cfg.max_half_life_ms);

        for _ in 0..100 {
            model.increase_learning_rate();
        }
        model.update(&flat(2, 2, 0), 10, None).unwrap();
        assert_relative_eq!(model.half_life(), cfg.min_half_life_ms);
    }

    #[test]
    fn learning_rate_steps_are_multiplicative() {
        let mut model = BackgroundModel::new(BackgroundModelConfig::default());

        model.decrease_learning_rate();
        assert_relative_eq!(model.half_life(), 1200.0, epsilon = 1e-9);
        model.increase_learning_rate();
        assert_relative_eq!(model.half_life(), 1000.0, epsilon = 1e-9);
    }
}
