//! Barycentric weights
//!
//! A point on a triangle `(p0, p1, p2)` is expressed as
//! `p0 * u + p1 * v + p2 * w` with `u + v + w = 1`.

use glam::{Vec2, Vec3};

use crate::consts::WEIGHT_EPSILON;

/// Barycentric weights `(u, v, w)` for the vertices `(p0, p1, p2)`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Barycentric {
    pub u: f32,
    pub v: f32,
    pub w: f32,
}

impl Barycentric {
    /// Result for degenerate input; every component is NaN
    pub const INVALID: Self = Self {
        u: f32::NAN,
        v: f32::NAN,
        w: f32::NAN,
    };

    /// Weights at the centroid
    pub const CENTROID: Self = Self {
        u: 1.0 / 3.0,
        v: 1.0 / 3.0,
        w: 1.0 / 3.0,
    };

    #[inline]
    pub const fn new(u: f32, v: f32, w: f32) -> Self {
        Self { u, v, w }
    }

    /// Weights of `point` with respect to the triangle `(p0, p1, p2)`
    ///
    /// Projects `point - p2` onto the edges `a = p1 - p2` and `b = p0 - p2`
    /// and solves the resulting 2x2 system. Points off the triangle plane
    /// are projected onto it. A zero-area triangle returns
    /// [`Barycentric::INVALID`].
    pub fn compute(p0: Vec3, p1: Vec3, p2: Vec3, point: Vec3) -> Self {
        let a = p1 - p2;
        let b = p0 - p2;
        let c = point - p2;

        let aa = a.dot(a);
        let bb = b.dot(b);
        let ab = a.dot(b);
        let ac = a.dot(c);
        let bc = b.dot(c);

        let d = aa * bb - ab * ab;
        // Relative test: |a x b|^2 == d, compared against the edge scale
        if !(d.abs() > f32::EPSILON * aa * bb) {
            return Self::INVALID;
        }

        let inv_d = 1.0 / d;
        let u = (aa * bc - ab * ac) * inv_d;
        let v = (bb * ac - ab * bc) * inv_d;
        Self::new(u, v, 1.0 - u - v)
    }

    /// Convert edge-space weights into vertex weights
    ///
    /// Ray-triangle kernels report hits as `p0 + s * (p1 - p0) + t * (p2 - p0)`;
    /// that point carries the weights `(1 - s - t, s, t)`.
    #[inline]
    pub fn from_edge_weights(s: f32, t: f32) -> Self {
        Self::new(1.0 - s - t, s, t)
    }

    /// Reconstruct a point from three vertices
    #[inline]
    pub fn interpolate_vec3(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> Vec3 {
        v0 * self.u + v1 * self.v + v2 * self.w
    }

    /// Interpolate a 2D attribute such as a UV
    #[inline]
    pub fn interpolate_vec2(&self, v0: Vec2, v1: Vec2, v2: Vec2) -> Vec2 {
        v0 * self.u + v1 * self.v + v2 * self.w
    }

    #[inline]
    pub fn sum(&self) -> f32 {
        self.u + self.v + self.w
    }

    /// All components are finite
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.u.is_finite() && self.v.is_finite() && self.w.is_finite()
    }

    /// Point lies on the triangle (within tolerance)
    pub fn is_inside(&self) -> bool {
        let range = -WEIGHT_EPSILON..=1.0 + WEIGHT_EPSILON;
        self.is_valid()
            && range.contains(&self.u)
            && range.contains(&self.v)
            && range.contains(&self.w)
    }

    #[inline]
    pub fn to_array(&self) -> [f32; 3] {
        [self.u, self.v, self.w]
    }
}
