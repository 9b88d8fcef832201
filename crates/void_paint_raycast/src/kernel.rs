//! Ray-triangle intersection kernel
//!
//! Per-triangle work shared by the serial loop and the parallel jobs:
//!
//! 1. Optional stroke culling ([`CullVolume`]) discards triangles that lie
//!    entirely outside one of up to three half-spaces.
//! 2. Möller-Trumbore intersection ([`intersect`]) with explicit NaN
//!    rejection at every comparison.
//!
//! [`nearest_hit`] reduces a buffer of per-triangle results to the closest
//! valid hit.

use glam::{Vec2, Vec3};
use void_paint_math::consts::MIN_DIRECTION_SQ;
use void_paint_math::{Barycentric, Plane, Ray};

use crate::config::RaycastConfig;
use crate::triangle::TriangleSnapshot;

/// Numeric policy for the intersection test
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelSettings {
    /// Determinants with `|det| <= determinant_epsilon` mean the ray is
    /// parallel to the triangle plane
    pub determinant_epsilon: f32,
    /// Hits at `t <= distance_epsilon` are behind (or at) the origin
    pub distance_epsilon: f32,
    /// Reject triangles facing away from the ray
    pub cull_backfaces: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self::from(&RaycastConfig::default())
    }
}

impl From<&RaycastConfig> for KernelSettings {
    fn from(config: &RaycastConfig) -> Self {
        Self {
            determinant_epsilon: config.determinant_epsilon,
            distance_epsilon: config.distance_epsilon,
            cull_backfaces: config.cull_backfaces,
        }
    }
}

/// Intersection of a ray with one triangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelHit {
    /// Distance along the ray
    pub distance: f32,
    /// Weight along `p1 - p0`
    pub u: f32,
    /// Weight along `p2 - p0`
    pub v: f32,
    pub point: Vec3,
    pub uv: Vec2,
}

/// Ray-triangle intersection (Möller-Trumbore)
pub fn intersect(ray: &Ray, tri: &TriangleSnapshot, settings: &KernelSettings) -> Option<KernelHit> {
    let e1 = tri.p1 - tri.p0;
    let e2 = tri.p2 - tri.p0;

    let pvec = ray.direction.cross(e2);
    let det = e1.dot(pvec);

    // Parallel to the plane, degenerate, or NaN
    if det.is_nan() || det.abs() <= settings.determinant_epsilon {
        return None;
    }
    if settings.cull_backfaces && det < 0.0 {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = ray.origin - tri.p0;

    let u = tvec.dot(pvec) * inv_det;
    if u.is_nan() || !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(e1);
    let v = ray.direction.dot(qvec) * inv_det;
    if v.is_nan() || v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(qvec) * inv_det;
    if t.is_nan() || t <= settings.distance_epsilon {
        return None;
    }

    let point = tri.p0 + e1 * u + e2 * v;
    let uv = tri.uv0 + (tri.uv1 - tri.uv0) * u + (tri.uv2 - tri.uv0) * v;
    if !point.is_finite() || !uv.is_finite() || !t.is_finite() {
        return None;
    }

    Some(KernelHit {
        distance: t,
        u,
        v,
        point,
        uv,
    })
}

/// Up to three half-spaces that a hit triangle must touch
///
/// Every plane keeps the current ray on its inside, so a triangle the ray
/// actually hits always has a vertex at or inside each plane and is never
/// culled. Signed distances that come out NaN keep the triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CullVolume {
    planes: [Plane; 3],
    count: usize,
    margin: f32,
}

impl CullVolume {
    /// Volume that culls nothing
    pub const SKIP: Self = Self {
        planes: [Plane {
            normal: Vec3::Y,
            distance: 0.0,
        }; 3],
        count: 0,
        margin: 0.0,
    };

    /// Use the first three of `planes`; a vertex counts as outside when its
    /// signed distance exceeds `margin`
    pub fn from_planes(planes: &[Plane], margin: f32) -> Self {
        let mut volume = Self {
            margin,
            ..Self::SKIP
        };
        for (slot, plane) in volume.planes.iter_mut().zip(planes) {
            *slot = *plane;
            volume.count += 1;
        }
        volume
    }

    /// Volume swept by a stroke from `previous` to `current`
    ///
    /// Two planes bound a slab of half-width `margin` around the surface
    /// spanned by the current ray and the stroke direction; the third drops
    /// everything behind the ray origin. A stationary pointer has no sweep
    /// and yields [`CullVolume::SKIP`].
    pub fn from_stroke(previous: &Ray, current: &Ray, margin: f32) -> Self {
        if !previous.is_valid() || !current.is_valid() {
            return Self::SKIP;
        }

        let sweep = (current.origin + current.direction) - (previous.origin + previous.direction);
        let normal = current.direction.cross(sweep);
        if !(normal.length_squared() > MIN_DIRECTION_SQ) {
            return Self::SKIP;
        }

        match (
            Plane::from_point_normal(current.origin, normal),
            Plane::from_point_normal(current.origin, -current.direction),
        ) {
            (Some(sheet), Some(front)) => Self::from_planes(&[sheet, sheet.flipped(), front], margin),
            _ => Self::SKIP,
        }
    }

    /// Culling is bypassed and every triangle gets the full test
    #[inline]
    pub fn is_skipped(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn planes(&self) -> &[Plane] {
        &self.planes[..self.count]
    }

    #[inline]
    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Index of the plane that rejects the triangle, if any
    pub fn rejecting_plane(&self, tri: &TriangleSnapshot) -> Option<usize> {
        self.planes().iter().position(|plane| {
            [tri.p0, tri.p1, tri.p2]
                .iter()
                .all(|&p| plane.signed_distance(p) > self.margin)
        })
    }
}

impl Default for CullVolume {
    fn default() -> Self {
        Self::SKIP
    }
}

/// Kernel output for one triangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastHit {
    /// Triangle id, or -1 for a miss
    pub triangle_id: i32,
    /// -1 when the triangle was culled out, otherwise the number of
    /// culling planes it passed
    pub cull_plane_id: i32,
    /// Distance along the (mesh-local) ray
    pub distance: f32,
    /// Hit point in mesh-local space
    pub hit_point: Vec3,
    pub uv_hit: Vec2,
    /// Edge weights `(u, v)` reported by the intersection test
    pub weights: Vec2,
}

impl RaycastHit {
    pub const MISS: Self = Self {
        triangle_id: -1,
        cull_plane_id: 0,
        distance: f32::INFINITY,
        hit_point: Vec3::ZERO,
        uv_hit: Vec2::ZERO,
        weights: Vec2::ZERO,
    };

    #[inline]
    pub fn is_hit(&self) -> bool {
        self.triangle_id >= 0 && !self.distance.is_nan()
    }

    #[inline]
    pub fn is_culled(&self) -> bool {
        self.cull_plane_id < 0
    }

    /// Vertex weights of the hit point
    pub fn barycentric(&self) -> Barycentric {
        Barycentric::from_edge_weights(self.weights.x, self.weights.y)
    }

    /// Whether `self` should win over `other` in a nearest-hit reduction
    ///
    /// Closer hits win; equal distances go to the lower triangle id so the
    /// result does not depend on evaluation order.
    #[inline]
    pub fn is_closer_than(&self, other: &RaycastHit) -> bool {
        if !self.is_hit() {
            return false;
        }
        if !other.is_hit() {
            return true;
        }
        self.distance < other.distance
            || (self.distance == other.distance && self.triangle_id < other.triangle_id)
    }
}

impl Default for RaycastHit {
    fn default() -> Self {
        Self::MISS
    }
}

/// Run culling and intersection for one triangle
pub fn raycast_triangle(
    ray: &Ray,
    tri: &TriangleSnapshot,
    cull: &CullVolume,
    settings: &KernelSettings,
) -> RaycastHit {
    if cull.rejecting_plane(tri).is_some() {
        return RaycastHit {
            cull_plane_id: -1,
            ..RaycastHit::MISS
        };
    }
    let passed = cull.planes().len() as i32;

    match intersect(ray, tri, settings) {
        Some(hit) => RaycastHit {
            triangle_id: tri.id as i32,
            cull_plane_id: passed,
            distance: hit.distance,
            hit_point: hit.point,
            uv_hit: hit.uv,
            weights: Vec2::new(hit.u, hit.v),
        },
        None => RaycastHit {
            cull_plane_id: passed,
            ..RaycastHit::MISS
        },
    }
}

/// Test every triangle in order on the calling thread
///
/// Fills `output` with one slot per triangle and returns the nearest hit.
pub fn run_serial(
    ray: &Ray,
    triangles: &[TriangleSnapshot],
    cull: &CullVolume,
    settings: &KernelSettings,
    output: &mut Vec<RaycastHit>,
) -> Option<RaycastHit> {
    output.clear();
    output.reserve(triangles.len());

    let mut nearest: Option<RaycastHit> = None;
    for tri in triangles {
        let hit = raycast_triangle(ray, tri, cull, settings);
        if nearest.map_or(hit.is_hit(), |best| hit.is_closer_than(&best)) {
            nearest = Some(hit);
        }
        output.push(hit);
    }
    nearest
}

/// Closest valid hit in a result buffer
pub fn nearest_hit(hits: &[RaycastHit]) -> Option<RaycastHit> {
    hits.iter()
        .filter(|hit| hit.is_hit())
        .fold(None, |best: Option<RaycastHit>, hit| match best {
            Some(best) if !hit.is_closer_than(&best) => Some(best),
            _ => Some(*hit),
        })
}
