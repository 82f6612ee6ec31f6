use image::Rgb;
use imageproc::geometry::{approximate_polygon_dp, convex_hull};
use imageproc::point::Point;
use nalgebra as na;
use std::f64::consts::PI;

const SQRT_2_PI: f64 = 2.506_628_274_631_000_7;

/// Rotated rectangle; `angle` is the direction of the `width` side, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: na::Point2<f64>,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedRect {
    /// Swaps sides so that `width >= height` and brings `angle` into `[0, 180)`.
    pub fn normalized(self) -> Self {
        let (width, height, angle) = if self.width < self.height {
            (self.height, self.width, self.angle - 90.0)
        } else {
            (self.width, self.height, self.angle)
        };

        Self {
            center: self.center,
            width,
            height,
            angle: angle.rem_euclid(180.0),
        }
    }

    pub fn corners(&self) -> [na::Point2<f64>; 4] {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let u = na::Vector2::new(cos, sin) * (self.width / 2.0);
        let v = na::Vector2::new(-sin, cos) * (self.height / 2.0);

        [
            self.center - u - v,
            self.center + u - v,
            self.center + u + v,
            self.center - u + v,
        ]
    }
}

/// ITU-R BT.601 luma, rounded like OpenCV's RGB to grey conversion.
#[inline]
pub fn luma(px: &Rgb<u8>) -> u8 {
    let [r, g, b] = px.0;

    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + 8192) >> 14) as u8
}

/// Douglas-Peucker simplification of a closed contour, without the repeated
/// closing vertex or consecutive duplicates.
pub fn simplify_contour(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.is_empty() {
        return Vec::new();
    }

    let mut out = approximate_polygon_dp(points, epsilon, true);
    out.dedup();

    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }

    out
}

/// Upright bounding rectangle `(x, y, w, h)`, both ends inclusive.
pub fn bounding_rect(points: &[Point<i32>]) -> (i32, i32, u32, u32) {
    if points.is_empty() {
        return (0, 0, 0, 0);
    }

    let mut min = Point::new(i32::MAX, i32::MAX);
    let mut max = Point::new(i32::MIN, i32::MIN);

    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }

    (
        min.x,
        min.y,
        (max.x - min.x + 1) as u32,
        (max.y - min.y + 1) as u32,
    )
}

/// Minimal-area enclosing rectangle, by rotating calipers over the convex hull.
pub fn min_area_rect(points: &[Point<i32>]) -> RotatedRect {
    let hull: Vec<na::Point2<f64>> = convex_hull(points)
        .into_iter()
        .map(|p| na::Point2::new(p.x as f64, p.y as f64))
        .collect();

    let mut best: Option<(f64, RotatedRect)> = None;
    let n = hull.len();

    for i in 0..n {
        let edge = hull[(i + 1) % n] - hull[i];
        let len = edge.norm();
        if len < f64::EPSILON {
            continue;
        }

        let u = edge / len;
        let v = na::Vector2::new(-u.y, u.x);

        let (mut u_min, mut u_max) = (f64::MAX, f64::MIN);
        let (mut v_min, mut v_max) = (f64::MAX, f64::MIN);

        for p in &hull {
            let d = p - hull[i];
            let (pu, pv) = (d.dot(&u), d.dot(&v));

            u_min = u_min.min(pu);
            u_max = u_max.max(pu);
            v_min = v_min.min(pv);
            v_max = v_max.max(pv);
        }

        let (width, height) = (u_max - u_min, v_max - v_min);
        let area = width * height;

        if best.as_ref().map_or(true, |(a, _)| area < *a) {
            let center =
                hull[i] + u * ((u_min + u_max) / 2.0) + v * ((v_min + v_max) / 2.0);

            best = Some((
                area,
                RotatedRect {
                    center,
                    width,
                    height,
                    angle: u.y.atan2(u.x).to_degrees(),
                },
            ));
        }
    }

    match best {
        Some((_, rect)) => rect,
        None => RotatedRect {
            center: hull.first().copied().unwrap_or_else(na::Point2::origin),
            width: 0.0,
            height: 0.0,
            angle: 0.0,
        },
    }
}

/// Normalised 1D Gaussian kernel of odd `size`, sampled like OpenCV's `getGaussianKernel`.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let half = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;

            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let sum: f64 = weights.iter().sum();

    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Normal probability density of `x`.
#[inline]
pub fn gauss_likelihood(x: f64, mean: f64, std: f64) -> f64 {
    let a = 1.0 / (std * SQRT_2_PI);
    let d = x - mean;

    a * (-(d * d) / (2.0 * std * std)).exp()
}

/// Points along a rotated ellipse inscribed in `rect`, for drawing.
pub fn ellipse_points(rect: &RotatedRect, count: usize) -> Vec<na::Point2<f64>> {
    let (sin, cos) = rect.angle.to_radians().sin_cos();
    let (a, b) = (rect.width / 2.0, rect.height / 2.0);

    (0..count)
        .map(|i| {
            let theta = 2.0 * PI * i as f64 / count as f64;
            let (x, y) = (a * theta.cos(), b * theta.sin());

            na::Point2::new(
                rect.center.x + x * cos - y * sin,
                rect.center.y + x * sin + y * cos,
            )
        })
        .collect()
}
