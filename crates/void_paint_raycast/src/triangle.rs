//! Triangle data model
//!
//! [`MeshGeometry`] is one frame's copy of a mesh: positions, UV sets,
//! index triples and the derived [`TriangleSnapshot`] list. Geometry is
//! shared through `Arc` so that results can keep reading it after the
//! provider has moved on to a newer frame.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use void_paint_math::{Barycentric, Bounds};

/// One triangle's positions and UVs at a point in time
///
/// `id` is the triangle's index inside its sub-mesh and stays the same
/// across frames even though positions change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleSnapshot {
    pub id: u32,
    pub p0: Vec3,
    pub p1: Vec3,
    pub p2: Vec3,
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub uv2: Vec2,
}

impl TriangleSnapshot {
    #[inline]
    pub fn centroid(&self) -> Vec3 {
        (self.p0 + self.p1 + self.p2) / 3.0
    }

    #[inline]
    pub fn area(&self) -> f32 {
        (self.p1 - self.p0).cross(self.p2 - self.p0).length() * 0.5
    }

    /// Zero area, or non-finite positions
    pub fn is_degenerate(&self) -> bool {
        let area = self.area();
        !(area > f32::EPSILON * self.longest_edge_sq())
    }

    fn longest_edge_sq(&self) -> f32 {
        (self.p1 - self.p0)
            .length_squared()
            .max((self.p2 - self.p1).length_squared())
            .max((self.p0 - self.p2).length_squared())
    }
}

/// Geometry of one mesh for one frame
#[derive(Clone, Debug)]
pub struct MeshGeometry {
    positions: Vec<Vec3>,
    uv_sets: Vec<Vec<Vec2>>,
    indices: Vec<[u32; 3]>,
    uv_channel: usize,
    local_bounds: Bounds,
    triangles: Vec<TriangleSnapshot>,
}

impl MeshGeometry {
    /// Build geometry from validated buffers
    ///
    /// Callers guarantee every index is in range for `positions` and the
    /// UV set at `uv_channel`.
    pub(crate) fn new(
        positions: Vec<Vec3>,
        uv_sets: Vec<Vec<Vec2>>,
        indices: Vec<[u32; 3]>,
        uv_channel: usize,
    ) -> Self {
        let mut geometry = Self {
            local_bounds: Bounds::from_points(&positions),
            positions,
            uv_sets,
            indices,
            uv_channel,
            triangles: Vec::new(),
        };
        geometry.rebuild_triangles();
        geometry
    }

    /// Replace vertex positions and the active UV channel in place
    pub(crate) fn update_vertices(&mut self, positions: &[Vec3], uvs: &[Vec2]) {
        self.positions.clear();
        self.positions.extend_from_slice(positions);

        if self.uv_sets.len() <= self.uv_channel {
            self.uv_sets.resize_with(self.uv_channel + 1, Vec::new);
        }
        let channel = &mut self.uv_sets[self.uv_channel];
        channel.clear();
        channel.extend_from_slice(uvs);

        self.local_bounds = Bounds::from_points(&self.positions);
        self.rebuild_triangles();
    }

    fn rebuild_triangles(&mut self) {
        let uvs = &self.uv_sets[self.uv_channel];
        let positions = &self.positions;
        self.triangles.clear();
        self.triangles.extend(self.indices.iter().enumerate().map(|(id, &[a, b, c])| {
            let (a, b, c) = (a as usize, b as usize, c as usize);
            TriangleSnapshot {
                id: id as u32,
                p0: positions[a],
                p1: positions[b],
                p2: positions[c],
                uv0: uvs[a],
                uv1: uvs[b],
                uv2: uvs[c],
            }
        }));
    }

    /// Largest vertex index referenced by the index buffer
    pub fn max_index(&self) -> Option<u32> {
        self.indices.iter().flatten().copied().max()
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec3] {
        &self.positions
    }

    /// UVs of a channel; empty when the channel was never loaded
    pub fn uv(&self, channel: usize) -> &[Vec2] {
        self.uv_sets.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn uv_channel(&self) -> usize {
        self.uv_channel
    }

    #[inline]
    pub fn triangle_indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    /// Snapshots for every triangle, in registration order
    #[inline]
    pub fn triangles(&self) -> &[TriangleSnapshot] {
        &self.triangles
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn local_bounds(&self) -> Bounds {
        self.local_bounds
    }
}

/// Lightweight view of one triangle inside a mesh snapshot
///
/// Positions and UVs are looked up by index on every call. For skinned
/// meshes the provider swaps in a new snapshot each frame, so a `Triangle`
/// kept past the frame it was produced in describes an old pose.
#[derive(Clone, Debug)]
pub struct Triangle {
    geometry: Arc<MeshGeometry>,
    id: u32,
}

impl Triangle {
    /// Returns `None` if `id` is out of range
    pub fn new(geometry: Arc<MeshGeometry>, id: u32) -> Option<Self> {
        if (id as usize) < geometry.triangle_count() {
            Some(Self { geometry, id })
        } else {
            None
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn uv_channel(&self) -> usize {
        self.geometry.uv_channel()
    }

    #[inline]
    pub fn indices(&self) -> [u32; 3] {
        self.geometry.triangle_indices()[self.id as usize]
    }

    pub fn positions(&self) -> [Vec3; 3] {
        let vertices = self.geometry.vertices();
        self.indices().map(|index| vertices[index as usize])
    }

    pub fn uvs(&self) -> [Vec2; 3] {
        let uvs = self.geometry.uv(self.uv_channel());
        self.indices().map(|index| uvs[index as usize])
    }

    /// Point on the triangle for the given weights
    pub fn point_at(&self, weights: &Barycentric) -> Vec3 {
        let [p0, p1, p2] = self.positions();
        weights.interpolate_vec3(p0, p1, p2)
    }

    /// UV on the triangle for the given weights
    pub fn uv_at(&self, weights: &Barycentric) -> Vec2 {
        let [uv0, uv1, uv2] = self.uvs();
        weights.interpolate_vec2(uv0, uv1, uv2)
    }

    pub fn snapshot(&self) -> TriangleSnapshot {
        self.geometry.triangles()[self.id as usize]
    }

    pub fn geometry(&self) -> &Arc<MeshGeometry> {
        &self.geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshGeometry {
        MeshGeometry::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ]],
            vec![[0, 1, 2], [0, 2, 3]],
            0,
        )
    }

    #[test]
    fn test_snapshots_follow_indices() {
        let geometry = quad();
        let triangles = geometry.triangles();
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[1].id, 1);
        assert_eq!(triangles[1].p2, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(triangles[1].uv1, Vec2::new(1.0, 1.0));
        assert_eq!(geometry.local_bounds().max, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(geometry.max_index(), Some(3));
    }

    #[test]
    fn test_update_vertices_keeps_ids() {
        let mut geometry = quad();
        let moved: Vec<Vec3> = geometry
            .vertices()
            .iter()
            .map(|p| *p + Vec3::Z)
            .collect();
        let uvs = geometry.uv(0).to_vec();
        geometry.update_vertices(&moved, &uvs);

        assert_eq!(geometry.triangles()[0].id, 0);
        assert_eq!(geometry.triangles()[0].p0, Vec3::Z);
        assert_eq!(geometry.local_bounds().min.z, 1.0);
    }

    #[test]
    fn test_missing_uv_channel_is_empty() {
        assert!(quad().uv(3).is_empty());
    }

    #[test]
    fn test_triangle_reads_by_index() {
        let geometry = Arc::new(quad());
        let triangle = Triangle::new(geometry.clone(), 1).unwrap();
        assert_eq!(triangle.indices(), [0, 2, 3]);
        assert_eq!(triangle.positions()[1], Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(triangle.snapshot(), geometry.triangles()[1]);

        let center = triangle.point_at(&Barycentric::CENTROID);
        assert!((center - Vec3::new(1.0 / 3.0, 2.0 / 3.0, 0.0)).length() < 1e-6);
        assert!(Triangle::new(geometry, 2).is_none());
    }

    #[test]
    fn test_degenerate_snapshot() {
        let geometry = quad();
        assert!(!geometry.triangles()[0].is_degenerate());

        let flat = TriangleSnapshot {
            id: 0,
            p0: Vec3::ZERO,
            p1: Vec3::X,
            p2: Vec3::X * 2.0,
            uv0: Vec2::ZERO,
            uv1: Vec2::ZERO,
            uv2: Vec2::ZERO,
        };
        assert!(flat.is_degenerate());
    }
}
