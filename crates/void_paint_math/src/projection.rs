//! Screen-space helpers
//!
//! Converts pointer positions into world rays and UV hits into texel
//! coordinates. Screen coordinates use a top-left origin.

use glam::{Mat4, Vec2, Vec3};

use crate::ray::Ray;

/// Anything that can turn a screen position into a world-space ray
///
/// Usually implemented by the active camera.
pub trait ScreenToRay {
    fn screen_to_ray(&self, position: Vec2) -> Ray;
}

/// Camera matrices plus viewport size
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenProjector {
    pub view: Mat4,
    pub projection: Mat4,
    /// Viewport size in pixels
    pub viewport: Vec2,
}

impl ScreenProjector {
    pub fn new(view: Mat4, projection: Mat4, viewport: Vec2) -> Self {
        Self {
            view,
            projection,
            viewport,
        }
    }
}

impl ScreenToRay for ScreenProjector {
    fn screen_to_ray(&self, position: Vec2) -> Ray {
        screen_to_ray(position, self.viewport, &self.view, &self.projection)
    }
}

/// Convert screen coordinates to a world-space ray
///
/// Unprojects the near and far clip points under the pixel and returns the
/// ray between them (origin on the near plane).
pub fn screen_to_ray(screen_pos: Vec2, screen_size: Vec2, view: &Mat4, projection: &Mat4) -> Ray {
    let ndc_x = (screen_pos.x / screen_size.x) * 2.0 - 1.0;
    let ndc_y = 1.0 - (screen_pos.y / screen_size.y) * 2.0;

    let inv_view = view.inverse();
    let inv_proj = projection.inverse();

    let near_view = inv_proj.project_point3(Vec3::new(ndc_x, ndc_y, -1.0));
    let far_view = inv_proj.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));

    Ray::from_points(
        inv_view.transform_point3(near_view),
        inv_view.transform_point3(far_view),
    )
}

/// Map a UV hit onto a texture of `size` texels
///
/// V is flipped so that `uv = (0, 0)` lands on the bottom-left texel row,
/// matching the usual texture-space convention.
pub fn uv_to_pixel(uv: Vec2, size: (u32, u32)) -> Vec2 {
    Vec2::new(uv.x * size.0 as f32, (1.0 - uv.y) * size.1 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> ScreenProjector {
        ScreenProjector::new(
            Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y),
            Mat4::perspective_rh_gl(60.0_f32.to_radians(), 1.0, 0.1, 100.0),
            Vec2::new(1000.0, 1000.0),
        )
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let ray = camera().screen_to_ray(Vec2::new(500.0, 500.0));
        assert_relative_eq!(ray.direction.z, -1.0, epsilon = 1e-4);
        assert_relative_eq!(ray.origin.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(ray.origin.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_offset_pixels_diverge() {
        let projector = camera();
        let left = projector.screen_to_ray(Vec2::new(100.0, 500.0));
        let right = projector.screen_to_ray(Vec2::new(900.0, 500.0));
        assert!(left.direction.x < 0.0);
        assert!(right.direction.x > 0.0);

        let top = projector.screen_to_ray(Vec2::new(500.0, 100.0));
        assert!(top.direction.y > 0.0);
    }

    #[test]
    fn test_uv_to_pixel() {
        assert_eq!(uv_to_pixel(Vec2::new(0.5, 0.5), (512, 256)), Vec2::new(256.0, 128.0));
        assert_eq!(uv_to_pixel(Vec2::new(0.0, 1.0), (512, 256)), Vec2::ZERO);
    }
}
