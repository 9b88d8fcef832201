//! Half-space planes

use glam::Vec3;

/// Plane in 3D space (normal · p + distance = 0)
///
/// Signed distances are positive on the side the normal points to, which
/// culling code treats as "outside".
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane {
    /// Plane normal (unit vector)
    pub normal: Vec3,
    /// Offset from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane through `point` facing `normal`
    ///
    /// Returns `None` when the normal has no usable direction.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Option<Self> {
        let normal = normal.try_normalize()?;
        Some(Self {
            normal,
            distance: -normal.dot(point),
        })
    }

    /// Signed distance from a point to the plane
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Flip the plane so the other side becomes "outside"
    #[inline]
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            distance: -self.distance,
        }
    }
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            distance: 0.0,
        }
    }
}
