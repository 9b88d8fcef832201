//! Bone-deformed mesh provider

use std::sync::Arc;

use crate::mesh::{MeshDeformer, MeshKind, MeshProvider, TransformHandle};
use crate::triangle::MeshGeometry;

/// Provider for skinned meshes
///
/// Each frame counter bakes the deformer at most once, however many
/// pointers query the mesh. The bake is copied into the snapshot in place
/// when no raycast result still holds the previous snapshot, otherwise a
/// fresh snapshot is allocated.
pub struct SkinnedMeshProvider {
    name: String,
    geometry: Arc<MeshGeometry>,
    transform: TransformHandle,
    deformer: Arc<dyn MeshDeformer>,
    /// Highest vertex index the snapshot needs
    required_vertices: usize,
    baked_frame: Option<u64>,
    baked_pose: Option<u64>,
    skip_unchanged_pose: bool,
    bake_count: u64,
}

impl SkinnedMeshProvider {
    pub fn new(
        name: String,
        geometry: MeshGeometry,
        transform: TransformHandle,
        deformer: Arc<dyn MeshDeformer>,
        skip_unchanged_pose: bool,
    ) -> Self {
        let required_vertices = geometry.max_index().map_or(0, |index| index as usize + 1);
        log::debug!(
            "Skinned mesh '{}' registered: {} triangles, uv channel {}",
            name,
            geometry.triangle_count(),
            geometry.uv_channel()
        );
        Self {
            name,
            geometry: Arc::new(geometry),
            transform,
            deformer,
            required_vertices,
            baked_frame: None,
            baked_pose: None,
            skip_unchanged_pose,
            bake_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of deformer bakes performed so far
    pub fn bake_count(&self) -> u64 {
        self.bake_count
    }

    /// Frame counter of the last refresh
    pub fn baked_frame(&self) -> Option<u64> {
        self.baked_frame
    }
}

impl MeshProvider for SkinnedMeshProvider {
    fn kind(&self) -> MeshKind {
        MeshKind::Skinned
    }

    fn refresh(&mut self, frame: u64) -> bool {
        if !self.needs_rebuild(frame) {
            return false;
        }
        // Marked before baking: a rejected bake is not retried this frame
        self.baked_frame = Some(frame);

        let pose = self.deformer.pose_version();
        if self.skip_unchanged_pose && pose.is_some() && pose == self.baked_pose {
            log::trace!("Skinned mesh '{}' pose unchanged, bake skipped", self.name);
            return false;
        }

        let uv_channel = self.geometry.uv_channel();
        let baked = self.deformer.bake(uv_channel);
        self.bake_count += 1;

        if baked.positions.len() < self.required_vertices || baked.uvs.len() != baked.positions.len() {
            log::warn!(
                "Skinned mesh '{}' bake rejected: {} vertices / {} uvs, need {} vertices; keeping previous pose",
                self.name,
                baked.positions.len(),
                baked.uvs.len(),
                self.required_vertices
            );
            return false;
        }

        Arc::make_mut(&mut self.geometry).update_vertices(&baked.positions, &baked.uvs);
        self.baked_pose = pose;
        log::trace!("Skinned mesh '{}' baked for frame {}", self.name, frame);
        true
    }

    fn needs_rebuild(&self, frame: u64) -> bool {
        self.baked_frame != Some(frame)
    }

    fn geometry(&self) -> &Arc<MeshGeometry> {
        &self.geometry
    }

    fn transform(&self) -> &TransformHandle {
        &self.transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BakedMesh;
    use glam::{Vec2, Vec3};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Quad that moves one unit along +Z per bake
    struct SlidingQuad {
        bakes: AtomicUsize,
        pose: Option<AtomicU64>,
        vertex_count: usize,
    }

    impl SlidingQuad {
        fn new() -> Self {
            Self {
                bakes: AtomicUsize::new(0),
                pose: None,
                vertex_count: 4,
            }
        }
    }

    impl MeshDeformer for SlidingQuad {
        fn bake(&self, _uv_channel: usize) -> BakedMesh {
            let offset = self.bakes.fetch_add(1, Ordering::SeqCst) as f32 + 1.0;
            let corners = [
                Vec3::new(0.0, 0.0, offset),
                Vec3::new(1.0, 0.0, offset),
                Vec3::new(1.0, 1.0, offset),
                Vec3::new(0.0, 1.0, offset),
            ];
            BakedMesh {
                positions: corners[..self.vertex_count].to_vec(),
                uvs: vec![Vec2::ZERO; self.vertex_count],
            }
        }

        fn pose_version(&self) -> Option<u64> {
            self.pose.as_ref().map(|pose| pose.load(Ordering::SeqCst))
        }
    }

    fn provider(deformer: Arc<SlidingQuad>, skip_unchanged_pose: bool) -> SkinnedMeshProvider {
        let geometry = MeshGeometry::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![vec![Vec2::ZERO; 4]],
            vec![[0, 1, 2], [0, 2, 3]],
            0,
        );
        SkinnedMeshProvider::new(
            "skin".into(),
            geometry,
            TransformHandle::default(),
            deformer,
            skip_unchanged_pose,
        )
    }

    #[test]
    fn test_bakes_once_per_frame() {
        let deformer = Arc::new(SlidingQuad::new());
        let mut provider = provider(deformer.clone(), false);

        assert!(provider.needs_rebuild(1));
        assert!(provider.refresh(1));
        for _ in 0..5 {
            assert!(!provider.refresh(1));
        }
        assert_eq!(deformer.bakes.load(Ordering::SeqCst), 1);
        assert_eq!(provider.vertices()[0].z, 1.0);

        assert!(provider.refresh(2));
        assert_eq!(deformer.bakes.load(Ordering::SeqCst), 2);
        assert_eq!(provider.vertices()[0].z, 2.0);
        assert_eq!(provider.bake_count(), 2);
    }

    #[test]
    fn test_held_snapshot_is_not_mutated() {
        let deformer = Arc::new(SlidingQuad::new());
        let mut provider = provider(deformer, false);
        provider.refresh(1);

        let held = provider.geometry().clone();
        provider.refresh(2);

        assert_eq!(held.vertices()[0].z, 1.0);
        assert_eq!(provider.vertices()[0].z, 2.0);
        assert_eq!(held.triangles()[1].id, provider.geometry().triangles()[1].id);
    }

    #[test]
    fn test_short_bake_keeps_previous_pose() {
        let deformer = Arc::new(SlidingQuad {
            vertex_count: 2,
            ..SlidingQuad::new()
        });
        let mut provider = provider(deformer.clone(), false);

        assert!(!provider.refresh(1));
        assert!(!provider.refresh(1));
        assert_eq!(deformer.bakes.load(Ordering::SeqCst), 1);
        assert_eq!(provider.vertices()[0], Vec3::ZERO);
    }

    #[test]
    fn test_unchanged_pose_skips_bake() {
        let deformer = Arc::new(SlidingQuad {
            pose: Some(AtomicU64::new(7)),
            ..SlidingQuad::new()
        });
        let mut provider = provider(deformer.clone(), true);

        assert!(provider.refresh(1));
        assert!(!provider.refresh(2));
        assert_eq!(deformer.bakes.load(Ordering::SeqCst), 1);

        deformer.pose.as_ref().unwrap().store(8, Ordering::SeqCst);
        assert!(provider.refresh(3));
        assert_eq!(deformer.bakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pose_skip_disabled_by_default() {
        let deformer = Arc::new(SlidingQuad {
            pose: Some(AtomicU64::new(7)),
            ..SlidingQuad::new()
        });
        let mut provider = provider(deformer.clone(), false);

        provider.refresh(1);
        provider.refresh(2);
        assert_eq!(deformer.bakes.load(Ordering::SeqCst), 2);
    }
}
