use crate::detection::Positions;
use crate::error::Result;
use crate::math;
use crate::monitor::TrackingUnit;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const ROI_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const POSITION_COLOUR: Rgb<u8> = Rgb([0, 0, 255]);
const INTERACTED_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

const ELLIPSE_SEGMENTS: usize = 36;

/// Consumes every processed frame with its results. Errors are reported but
/// never stop tracking.
pub trait Drawer {
    fn draw(&mut self, frame: &RgbImage, t: i64, positions: &Positions, units: &[TrackingUnit]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullDrawer;

impl Drawer for NullDrawer {
    #[inline]
    fn draw(&mut self, _: &RgbImage, _: i64, _: &Positions, _: &[TrackingUnit]) -> Result<()> {
        Ok(())
    }
}

/// Outlines ROIs and draws an ellipse on every detection.
#[derive(Debug, Clone, Default)]
pub struct DefaultDrawer {
    last_drawn_frame: Option<RgbImage>,
    last_t: Option<i64>,
}

impl DefaultDrawer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn last_drawn_frame(&self) -> Option<&RgbImage> {
        self.last_drawn_frame.as_ref()
    }

    #[inline]
    pub fn last_t(&self) -> Option<i64> {
        self.last_t
    }

    pub fn annotate(img: &mut RgbImage, positions: &Positions, units: &[TrackingUnit]) {
        for unit in units {
            let roi = unit.roi();
            let polygon: Vec<(f32, f32)> = roi
                .polygon()
                .iter()
                .map(|p| (p.x as f32, p.y as f32))
                .collect();

            draw_closed_path(img, &polygon, BLACK, 3);
            draw_closed_path(img, &polygon, ROI_COLOUR, 1);

            let Some(point) = positions.get(&roi.idx()) else {
                continue;
            };

            let colour = if point.has_interacted {
                INTERACTED_COLOUR
            } else {
                POSITION_COLOUR
            };

            let rect = point.to_absolute(roi).rotated_rect();
            let ellipse: Vec<(f32, f32)> = math::ellipse_points(&rect, ELLIPSE_SEGMENTS)
                .into_iter()
                .map(|p| (p.x as f32, p.y as f32))
                .collect();

            draw_closed_path(img, &ellipse, BLACK, 3);
            draw_closed_path(img, &ellipse, colour, 1);
        }
    }
}

impl Drawer for DefaultDrawer {
    fn draw(&mut self, frame: &RgbImage, t: i64, positions: &Positions, units: &[TrackingUnit]) -> Result<()> {
        let mut img = frame.clone();
        Self::annotate(&mut img, positions, units);

        self.last_drawn_frame = Some(img);
        self.last_t = Some(t);

        Ok(())
    }
}

fn draw_closed_path(img: &mut RgbImage, points: &[(f32, f32)], colour: Rgb<u8>, thickness: i32) {
    let r = (thickness / 2) as f32;
    let steps = thickness.max(1);

    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];

        for dy in 0..steps {
            for dx in 0..steps {
                let (ox, oy) = (dx as f32 - r, dy as f32 - r);
                draw_line_segment_mut(img, (a.0 + ox, a.1 + oy), (b.0 + ox, b.1 + oy), colour);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DataPoint, Detection, NoPosition};
    use crate::roi::Roi;
    use crate::tracker::Tracker;
    use image::GrayImage;
    use nalgebra as na;

    struct Idle;

    impl Tracker for Idle {
        fn track(&mut self, _: &RgbImage, _: &GrayImage, _: i64) -> Result<Detection> {
            Ok(Detection::NotDetected(NoPosition::EmptyForeground))
        }
    }

    fn unit() -> TrackingUnit {
        let roi = Roi::new(
            vec![
                na::Point2::new(20, 20),
                na::Point2::new(79, 20),
                na::Point2::new(79, 79),
                na::Point2::new(20, 79),
            ],
            1,
            None,
        )
        .unwrap();

        TrackingUnit::new(roi, Box::new(Idle))
    }

    fn positions(has_interacted: bool) -> Positions {
        let mut positions = Positions::new();
        positions.insert(
            1,
            DataPoint {
                t: 0,
                x: 30,
                y: 30,
                w: 20,
                h: 10,
                phi: 0,
                xy_dist: 0,
                has_interacted,
            },
        );

        positions
    }

    #[test]
    fn draws_roi_outline_and_ellipse() {
        let frame = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let mut drawer = DefaultDrawer::new();

        drawer.draw(&frame, 40, &positions(false), &[unit()]).unwrap();

        let img = drawer.last_drawn_frame().unwrap();
        assert_eq!(*img.get_pixel(50, 20), ROI_COLOUR);
        assert_eq!(*img.get_pixel(60, 50), POSITION_COLOUR);
        assert_eq!(drawer.last_t(), Some(40));
        assert_eq!(*frame.get_pixel(50, 20), Rgb([128, 128, 128]));
    }

    #[test]
    fn interaction_changes_colour() {
        let frame = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let mut drawer = DefaultDrawer::new();

        drawer.draw(&frame, 0, &positions(true), &[unit()]).unwrap();

        let img = drawer.last_drawn_frame().unwrap();
        assert_eq!(*img.get_pixel(60, 50), INTERACTED_COLOUR);
    }
}
