//! Rays for pointer picking
//!
//! A pointer position is turned into a ray by the camera collaborator; the
//! raycaster then moves it into mesh-local space with [`Ray::transform`].

use glam::{Mat4, Vec3};

use crate::consts::MIN_DIRECTION_SQ;

/// 3D ray with a normalized direction
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ray {
    /// Ray origin point
    pub origin: Vec3,
    /// Ray direction (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray, normalizing the direction
    ///
    /// A zero-length direction stays zero; such a ray reports
    /// `is_valid() == false` and never hits anything.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Create a ray from `start` towards `end`
    #[inline]
    pub fn from_points(start: Vec3, end: Vec3) -> Self {
        Self::new(start, end - start)
    }

    /// Point at distance `t` along the ray
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transform the ray by a matrix
    ///
    /// The origin is transformed as a point, the direction as a vector and
    /// then re-normalized, so distances along the result are measured in
    /// the target space.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        Self::new(
            matrix.transform_point3(self.origin),
            matrix.transform_vector3(self.direction),
        )
    }

    /// Finite origin and a non-zero direction
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.origin.is_finite()
            && self.direction.is_finite()
            && self.direction.length_squared() > MIN_DIRECTION_SQ
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::Z,
        }
    }
}
