//! Public raycast result

use std::sync::Arc;

use glam::{Vec2, Vec3};
use void_paint_math::{uv_to_pixel, Barycentric};

use crate::ids::{PointerId, RequestHandle, TargetId};
use crate::kernel::RaycastHit;
use crate::mesh::TransformHandle;
use crate::triangle::{MeshGeometry, Triangle};

/// Where a pointer ray landed on a paint target
///
/// The hit point is kept in mesh-local space; [`RaycastData::world_point`]
/// applies the target's transform as it is at the time of the call, not as
/// it was when the ray was cast.
#[derive(Clone, Debug)]
pub struct RaycastData {
    target: TargetId,
    pointer: PointerId,
    triangle: Triangle,
    barycentric: Barycentric,
    uv: Vec2,
    distance: f32,
    transform: TransformHandle,
}

impl RaycastData {
    /// Build the public result for a kernel hit
    ///
    /// Returns `None` for misses and for weights that do not describe a
    /// point (NaN).
    pub(crate) fn from_hit(
        handle: RequestHandle,
        hit: &RaycastHit,
        geometry: Arc<MeshGeometry>,
        transform: TransformHandle,
    ) -> Option<Self> {
        if !hit.is_hit() {
            return None;
        }
        let barycentric = hit.barycentric();
        if !barycentric.is_valid() {
            return None;
        }
        let triangle = Triangle::new(geometry, hit.triangle_id as u32)?;

        Some(Self {
            target: handle.target,
            pointer: handle.pointer,
            triangle,
            barycentric,
            uv: hit.uv_hit,
            distance: hit.distance,
            transform,
        })
    }

    #[inline]
    pub fn target(&self) -> TargetId {
        self.target
    }

    #[inline]
    pub fn pointer(&self) -> PointerId {
        self.pointer
    }

    /// Triangle that was hit
    #[inline]
    pub fn triangle(&self) -> &Triangle {
        &self.triangle
    }

    #[inline]
    pub fn triangle_id(&self) -> u32 {
        self.triangle.id()
    }

    /// Vertex weights of the hit point
    #[inline]
    pub fn barycentric(&self) -> Barycentric {
        self.barycentric
    }

    /// Interpolated UV at the hit point
    #[inline]
    pub fn uv(&self) -> Vec2 {
        self.uv
    }

    /// Distance along the mesh-local ray
    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// UV channel the hit was computed for
    #[inline]
    pub fn uv_channel(&self) -> usize {
        self.triangle.uv_channel()
    }

    /// Hit point in mesh-local space
    pub fn local_point(&self) -> Vec3 {
        self.triangle.point_at(&self.barycentric)
    }

    /// Hit point under the target's current transform
    pub fn world_point(&self) -> Vec3 {
        self.transform.get().transform_point3(self.local_point())
    }

    /// Hit position on a texture of `size` texels
    pub fn pixel_position(&self, size: (u32, u32)) -> Vec2 {
        uv_to_pixel(self.uv, size)
    }
}
