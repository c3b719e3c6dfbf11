//! Pan/zoom of the displayed image.
//!
//! Three coordinate spaces are involved:
//!
//! - Image space: pixels, origin at the top-left corner of the image.
//! - Display space: display units, origin at the top-left corner of the
//!   viewport.
//! - In between, the user's pan/zoom matrix operates on coordinates
//!   centered on the viewport, so that an identity matrix shows the image
//!   centered at one image pixel per `pixel_ratio` display units.

use glam::{Mat3, Vec2};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    /// In display units.
    pub size: Vec2,
    /// Physical pixels per display unit.
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32, pixel_ratio: f32) -> Viewport {
        Viewport {
            size: Vec2::new(width, height),
            pixel_ratio: pixel_ratio,
        }
    }
}

impl Default for Viewport {
    fn default() -> Viewport {
        Viewport::new(1024.0, 768.0, 1.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    matrix: Mat3,
    viewport: Viewport,
}

impl Transform {
    pub fn new(viewport: Viewport) -> Transform {
        Transform {
            matrix: Mat3::IDENTITY,
            viewport: viewport,
        }
    }

    pub fn matrix(&self) -> Mat3 {
        self.matrix
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Non-finite deltas are ignored.
    pub fn translate(&mut self, delta: Vec2) {
        if !delta.is_finite() {
            log::warn!("Ignoring non-finite translation {:?}", delta);
            return;
        }
        self.matrix = Mat3::from_translation(delta) * self.matrix;
    }

    /// Zooms by `factor`, keeping the display space point `origin` fixed.
    ///
    /// The matrix must stay invertible, so factors that aren't finite and
    /// positive are ignored, as are non-finite origins.
    pub fn scale(&mut self, factor: f32, origin: Vec2) {
        if !(factor.is_finite() && factor > 0.0) || !origin.is_finite() {
            log::warn!("Ignoring zoom by {} around {:?}", factor, origin);
            return;
        }
        let offset = origin - self.viewport.size * 0.5;
        self.matrix = Mat3::from_translation(offset)
            * Mat3::from_scale(Vec2::splat(factor))
            * Mat3::from_translation(-offset)
            * self.matrix;
    }

    /// Mouse wheel zoom: each unit of `amount` zooms by 10%.
    pub fn scroll(&mut self, amount: f32, origin: Vec2) {
        self.scale(1.1f32.powf(amount), origin);
    }

    /// Centers the image and scales it to fill the viewport along its
    /// limiting dimension.
    pub fn fit_to_screen(&mut self, image_size: (usize, usize)) {
        if image_size.0 == 0 || image_size.1 == 0 {
            self.reset();
            return;
        }
        let ratio = self.viewport.pixel_ratio;
        let factor = (self.viewport.size.x * ratio / image_size.0 as f32)
            .min(self.viewport.size.y * ratio / image_size.1 as f32);
        if !(factor.is_finite() && factor > 0.0) {
            self.reset();
            return;
        }
        self.matrix = Mat3::from_scale(Vec2::splat(factor));
    }

    pub fn reset(&mut self) {
        self.matrix = Mat3::IDENTITY;
    }

    pub fn extract_scale(&self) -> f32 {
        let m = &self.matrix;
        let det = m.x_axis.x * m.y_axis.y - m.x_axis.y * m.y_axis.x;
        det.sqrt()
    }

    /// Maps image pixel coordinates to display coordinates.
    pub fn image_to_display(&self, image_size: (usize, usize)) -> Mat3 {
        let image_size = Vec2::new(image_size.0 as f32, image_size.1 as f32);
        Mat3::from_translation(self.viewport.size * 0.5)
            * self.matrix
            * Mat3::from_scale(Vec2::splat(1.0 / self.viewport.pixel_ratio))
            * Mat3::from_translation(image_size * -0.5)
    }

    pub fn display_coordinate_from_image_pixel(&self, p: Vec2, image_size: (usize, usize)) -> Vec2 {
        self.image_to_display(image_size).transform_point2(p)
    }

    pub fn image_pixel_from_display_coordinate(&self, p: Vec2, image_size: (usize, usize)) -> Vec2 {
        self.image_to_display(image_size)
            .inverse()
            .transform_point2(p)
    }
}

impl Default for Transform {
    fn default() -> Transform {
        Transform::new(Viewport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn identity_centers_image() {
        let t = Transform::new(Viewport::new(800.0, 600.0, 1.0));
        let center = t.display_coordinate_from_image_pixel(Vec2::new(50.0, 25.0), (100, 50));
        assert!(close(center, Vec2::new(400.0, 300.0)));
        let corner = t.display_coordinate_from_image_pixel(Vec2::ZERO, (100, 50));
        assert!(close(corner, Vec2::new(350.0, 275.0)));
    }

    #[test]
    fn pixel_ratio() {
        let t = Transform::new(Viewport::new(800.0, 600.0, 2.0));
        let corner = t.display_coordinate_from_image_pixel(Vec2::ZERO, (100, 50));
        assert!(close(corner, Vec2::new(375.0, 287.5)));
    }

    #[test]
    fn scale_round_trip() {
        let mut t = Transform::new(Viewport::new(800.0, 600.0, 1.0));
        for &k in &[0.25f32, 1.0, 3.5] {
            t.reset();
            t.scale(k, Vec2::new(123.0, 456.0));
            assert!((t.extract_scale() - k).abs() < 1e-5);
        }

        // Scales compose.
        t.reset();
        t.scale(2.0, Vec2::new(10.0, 10.0));
        t.scale(3.0, Vec2::new(700.0, 20.0));
        assert!((t.extract_scale() - 6.0).abs() < 1e-4);
    }

    #[test]
    fn scale_keeps_origin_fixed() {
        let mut t = Transform::new(Viewport::new(800.0, 600.0, 1.0));
        let origin = Vec2::new(500.0, 200.0);
        let before = t.image_pixel_from_display_coordinate(origin, (64, 64));
        t.scale(4.0, origin);
        let after = t.image_pixel_from_display_coordinate(origin, (64, 64));
        assert!(close(before, after));
    }

    #[test]
    fn scroll() {
        let mut t = Transform::default();
        t.scroll(2.0, Vec2::ZERO);
        assert!((t.extract_scale() - 1.21).abs() < 1e-5);
        t.scroll(-2.0, Vec2::ZERO);
        assert!((t.extract_scale() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn fit_to_screen_limiting_dimension() {
        let mut t = Transform::new(Viewport::new(800.0, 600.0, 1.0));

        // Wide image: width is the limiting dimension.
        t.fit_to_screen((1600, 400));
        assert!((t.extract_scale() - 0.5).abs() < 1e-6);
        let left = t.display_coordinate_from_image_pixel(Vec2::new(0.0, 200.0), (1600, 400));
        let right = t.display_coordinate_from_image_pixel(Vec2::new(1600.0, 200.0), (1600, 400));
        assert!(close(left, Vec2::new(0.0, 300.0)));
        assert!(close(right, Vec2::new(800.0, 300.0)));

        // Tall image: height is.
        t.fit_to_screen((100, 300));
        assert!((t.extract_scale() - 2.0).abs() < 1e-6);
        let top = t.display_coordinate_from_image_pixel(Vec2::new(50.0, 0.0), (100, 300));
        assert!(close(top, Vec2::new(400.0, 0.0)));
    }

    #[test]
    fn display_image_round_trip() {
        let mut t = Transform::new(Viewport::new(640.0, 480.0, 1.5));
        t.scale(2.5, Vec2::new(100.0, 50.0));
        t.translate(Vec2::new(-33.0, 71.0));
        for &p in &[Vec2::ZERO, Vec2::new(12.5, 99.0), Vec2::new(-40.0, 300.0)] {
            let display = t.display_coordinate_from_image_pixel(p, (200, 100));
            let back = t.image_pixel_from_display_coordinate(display, (200, 100));
            assert!(close(p, back));
        }
    }

    #[test]
    fn degenerate_zoom_is_ignored() {
        let mut t = Transform::new(Viewport::new(100.0, 100.0, 1.0));
        t.scale(2.0, Vec2::new(50.0, 50.0));
        let before = t.matrix();
        for &factor in &[0.0f32, -1.0, f32::NAN, f32::INFINITY] {
            t.scale(factor, Vec2::new(50.0, 50.0));
            assert_eq!(t.matrix(), before);
        }
        t.scale(2.0, Vec2::NAN);
        t.translate(Vec2::new(f32::INFINITY, 0.0));
        t.scroll(f32::NAN, Vec2::ZERO);
        assert_eq!(t.matrix(), before);
        assert!((t.extract_scale() - 2.0).abs() < 1e-6);

        // A collapsed viewport can't be fitted to.
        t.set_viewport(Viewport::new(0.0, 0.0, 1.0));
        t.fit_to_screen((10, 10));
        assert_eq!(t.matrix(), Mat3::IDENTITY);
    }

    #[test]
    fn translate() {
        let mut t = Transform::new(Viewport::new(100.0, 100.0, 1.0));
        t.translate(Vec2::new(10.0, -5.0));
        let center = t.display_coordinate_from_image_pixel(Vec2::new(5.0, 5.0), (10, 10));
        assert!(close(center, Vec2::new(60.0, 45.0)));
        t.reset();
        assert_eq!(t.matrix(), Mat3::IDENTITY);
    }
}
