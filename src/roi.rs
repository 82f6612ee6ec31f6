use crate::error::{Error, Result};
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use nalgebra as na;

/// Axis-aligned rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A fixed polygonal region of the frame tracked independently.
#[derive(Debug, Clone)]
pub struct Roi {
    polygon: Vec<na::Point2<i32>>,
    idx: usize,
    value: Option<i32>,
    rect: Rect,
    mask: GrayImage,
}

impl Roi {
    pub fn new(polygon: Vec<na::Point2<i32>>, idx: usize, value: Option<i32>) -> Result<Self> {
        if polygon.len() < 3 {
            return Err(Error::InvalidRoi(format!(
                "ROI {} has {} points, at least 3 are required",
                idx,
                polygon.len()
            )));
        }

        if polygon.iter().any(|p| p.x < 0 || p.y < 0) {
            return Err(Error::InvalidRoi(format!(
                "ROI {} has negative coordinates",
                idx
            )));
        }

        let (min_x, min_y, max_x, max_y) = polygon.iter().fold(
            (i32::MAX, i32::MAX, i32::MIN, i32::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        );

        let rect = Rect {
            x: min_x as u32,
            y: min_y as u32,
            w: (max_x - min_x + 1) as u32,
            h: (max_y - min_y + 1) as u32,
        };

        let mut local: Vec<Point<i32>> = polygon
            .iter()
            .map(|p| Point::new(p.x - min_x, p.y - min_y))
            .collect();
        local.dedup();
        while local.len() > 1 && local.first() == local.last() {
            local.pop();
        }

        let mut mask = GrayImage::new(rect.w, rect.h);
        if local.len() >= 3 {
            draw_polygon_mut(&mut mask, &local, Luma([255u8]));
        } else {
            return Err(Error::InvalidRoi(format!("ROI {} polygon is degenerate", idx)));
        }

        Ok(Self {
            polygon,
            idx,
            value,
            rect,
            mask,
        })
    }

    /// A single ROI covering a whole `w x h` frame.
    pub fn full_frame(w: u32, h: u32) -> Result<Self> {
        let (w, h) = (w as i32, h as i32);

        Self::new(
            vec![
                na::Point2::new(0, 0),
                na::Point2::new(0, h - 1),
                na::Point2::new(w - 1, h - 1),
                na::Point2::new(w - 1, 0),
            ],
            1,
            None,
        )
    }

    #[inline]
    pub fn idx(&self) -> usize {
        self.idx
    }

    #[inline]
    pub fn value(&self) -> Option<i32> {
        self.value
    }

    #[inline]
    pub fn polygon(&self) -> &[na::Point2<i32>] {
        &self.polygon
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    #[inline]
    pub fn offset(&self) -> (u32, u32) {
        (self.rect.x, self.rect.y)
    }

    /// Filled polygon mask (255 inside) aligned with the bounding rectangle.
    #[inline]
    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Crops the ROI's bounding rectangle out of `frame`.
    pub fn apply<'a>(&'a self, frame: &RgbImage) -> Result<(RgbImage, &'a GrayImage)> {
        let Rect { x, y, w, h } = self.rect;

        if x + w > frame.width() || y + h > frame.height() {
            return Err(Error::RoiOutOfFrame {
                idx: self.idx,
                x,
                y,
                w,
                h,
                frame_w: frame.width(),
                frame_h: frame.height(),
            });
        }

        let sub = imageops::crop_imm(frame, x, y, w, h).to_image();

        Ok((sub, &self.mask))
    }

    fn with_value(mut self, value: i32) -> Self {
        self.value = Some(value);
        self
    }
}

/// Orders ROIs for a run and settles their values.
///
/// If any ROI lacks a value, all are sorted left to right by bounding box and
/// valued by rank. Otherwise they are sorted by their existing value.
pub fn sort_rois(mut rois: Vec<Roi>) -> Vec<Roi> {
    if rois.iter().any(|r| r.value.is_none()) {
        rois.sort_by_key(|r| r.rect.x);

        rois.into_iter()
            .enumerate()
            .map(|(i, r)| r.with_value(i as i32))
            .collect()
    } else {
        rois.sort_by_key(|r| r.value);
        rois
    }
}
