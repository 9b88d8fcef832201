//! Static mesh provider

use std::sync::Arc;

use crate::mesh::{MeshKind, MeshProvider, TransformHandle};
use crate::triangle::MeshGeometry;

/// Provider for meshes whose vertices never change
///
/// Geometry is copied once at registration. Refreshing never rebuilds;
/// world bounds are recomputed from the live transform on every query.
pub struct RigidMeshProvider {
    name: String,
    geometry: Arc<MeshGeometry>,
    transform: TransformHandle,
}

impl RigidMeshProvider {
    pub fn new(name: String, geometry: MeshGeometry, transform: TransformHandle) -> Self {
        log::debug!(
            "Rigid mesh '{}' snapshot: {} vertices, {} triangles",
            name,
            geometry.vertices().len(),
            geometry.triangle_count()
        );
        Self {
            name,
            geometry: Arc::new(geometry),
            transform,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MeshProvider for RigidMeshProvider {
    fn kind(&self) -> MeshKind {
        MeshKind::Rigid
    }

    fn refresh(&mut self, _frame: u64) -> bool {
        false
    }

    fn needs_rebuild(&self, _frame: u64) -> bool {
        false
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
    use crate::config::RaycastConfig;
    use crate::mesh::{build_provider, MeshDescriptor};
    use glam::{Mat4, Vec3};

    #[test]
    fn test_refresh_is_noop() {
        let mut provider =
            build_provider(MeshDescriptor::quad("quad", 1.0), 0, 0, &RaycastConfig::default()).unwrap();
        let before = Arc::as_ptr(provider.geometry());

        assert!(!provider.needs_rebuild(1));
        assert!(!provider.refresh(1));
        assert!(!provider.refresh(2));
        assert_eq!(Arc::as_ptr(provider.geometry()), before);
        assert_eq!(provider.vertices().len(), 4);
        assert_eq!(provider.uv(0).len(), 4);
    }

    #[test]
    fn test_world_bounds_follow_transform() {
        let transform = TransformHandle::default();
        let descriptor = MeshDescriptor::quad("quad", 1.0).with_transform(transform.clone());
        let provider = build_provider(descriptor, 0, 0, &RaycastConfig::default()).unwrap();

        assert_eq!(provider.world_bounds().max, Vec3::new(1.0, 1.0, 0.0));

        transform.set(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        let bounds = provider.world_bounds();
        assert_eq!(bounds.min.z, 5.0);
        assert_eq!(bounds.max.z, 5.0);
    }
}
