//! Mesh snapshot providers
//!
//! A provider owns the current-frame [`MeshGeometry`] of one paint target
//! and knows how to bring it up to date:
//!
//! - [`RigidMeshProvider`] copies the mesh once at registration; only its
//!   world bounds follow the transform.
//! - [`SkinnedMeshProvider`] re-bakes the deformed mesh at most once per
//!   frame counter.
//!
//! Registration input is a [`MeshDescriptor`], validated by
//! [`build_provider`] before any provider exists.

mod rigid;
mod skinned;

pub use rigid::RigidMeshProvider;
pub use skinned::SkinnedMeshProvider;

use std::fmt;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use parking_lot::RwLock;
use void_paint_math::Bounds;

use crate::config::RaycastConfig;
use crate::error::{RaycastError, Result};
use crate::triangle::MeshGeometry;

/// Capability of a mesh provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    Rigid,
    Skinned,
}

/// Shared, live local-to-world matrix of a paint target
///
/// The owner (scene/renderer) writes it whenever the object moves; results
/// read it lazily when asked for world-space points.
#[derive(Clone, Debug, Default)]
pub struct TransformHandle(Arc<RwLock<Mat4>>);

impl TransformHandle {
    pub fn new(local_to_world: Mat4) -> Self {
        Self(Arc::new(RwLock::new(local_to_world)))
    }

    #[inline]
    pub fn get(&self) -> Mat4 {
        *self.0.read()
    }

    #[inline]
    pub fn set(&self, local_to_world: Mat4) {
        *self.0.write() = local_to_world;
    }
}

/// Output of one deformer bake
#[derive(Clone, Debug, Default)]
pub struct BakedMesh {
    /// Deformed vertex positions in mesh-local space
    pub positions: Vec<Vec3>,
    /// UVs of the requested channel, one per vertex
    pub uvs: Vec<Vec2>,
}

/// Skinning collaborator that bakes the current pose of a mesh
pub trait MeshDeformer: Send + Sync {
    /// Bake the deformed vertices together with the given UV channel
    fn bake(&self, uv_channel: usize) -> BakedMesh;

    /// Version number that changes whenever the pose changes
    ///
    /// `None` means the deformer cannot tell, and the mesh is re-baked
    /// every frame.
    fn pose_version(&self) -> Option<u64> {
        None
    }
}

/// Description of a mesh offered for painting
#[derive(Clone)]
pub struct MeshDescriptor {
    /// Display name used in logs and errors
    pub name: String,
    /// Vertex positions (bind pose for skinned meshes)
    pub positions: Vec<Vec3>,
    /// One UV list per channel
    pub uv_channels: Vec<Vec<Vec2>>,
    /// Flat triangle index lists, one per sub-mesh
    pub sub_meshes: Vec<Vec<u32>>,
    /// Live local-to-world transform
    pub transform: TransformHandle,
    /// Whether the mesh is deformed by bones
    pub skinned: bool,
    /// Bake collaborator, required for skinned meshes
    pub deformer: Option<Arc<dyn MeshDeformer>>,
}

impl MeshDescriptor {
    /// A static mesh with a single sub-mesh
    pub fn rigid(name: impl Into<String>, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            positions,
            uv_channels: Vec::new(),
            sub_meshes: vec![indices],
            transform: TransformHandle::default(),
            skinned: false,
            deformer: None,
        }
    }

    /// A bone-deformed mesh with a single sub-mesh
    pub fn skinned(
        name: impl Into<String>,
        bind_positions: Vec<Vec3>,
        indices: Vec<u32>,
        deformer: Arc<dyn MeshDeformer>,
    ) -> Self {
        Self {
            skinned: true,
            deformer: Some(deformer),
            ..Self::rigid(name, bind_positions, indices)
        }
    }

    /// Square of side `size` in the XY plane, corner at the origin
    pub fn quad(name: impl Into<String>, size: f32) -> Self {
        Self::rigid(
            name,
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(size, 0.0, 0.0),
                Vec3::new(size, size, 0.0),
                Vec3::new(0.0, size, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
        .with_uv_channel(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ])
    }

    /// Append a UV channel
    pub fn with_uv_channel(mut self, uvs: Vec<Vec2>) -> Self {
        self.uv_channels.push(uvs);
        self
    }

    /// Append a sub-mesh
    pub fn with_sub_mesh(mut self, indices: Vec<u32>) -> Self {
        self.sub_meshes.push(indices);
        self
    }

    /// Share an existing transform
    pub fn with_transform(mut self, transform: TransformHandle) -> Self {
        self.transform = transform;
        self
    }

    /// Check the descriptor and return the sub-mesh as index triples
    pub fn validate(&self, uv_channel: usize, sub_mesh: usize) -> Result<Vec<[u32; 3]>> {
        if self.skinned && self.deformer.is_none() {
            return Err(RaycastError::DeformerUnavailable(self.name.clone()));
        }

        let indices = self.sub_meshes.get(sub_mesh).ok_or_else(|| {
            RaycastError::missing(
                &self.name,
                format!("sub-mesh {} not present ({} available)", sub_mesh, self.sub_meshes.len()),
            )
        })?;
        if indices.is_empty() {
            return Err(RaycastError::missing(&self.name, "empty index buffer"));
        }
        if indices.len() % 3 != 0 {
            return Err(RaycastError::missing(
                &self.name,
                format!("index count {} is not a multiple of 3", indices.len()),
            ));
        }
        let vertex_count = self.positions.len();
        if let Some(&bad) = indices.iter().find(|&&index| index as usize >= vertex_count) {
            return Err(RaycastError::missing(
                &self.name,
                format!("index {} out of range for {} vertices", bad, vertex_count),
            ));
        }

        let uvs = self.uv_channels.get(uv_channel).ok_or_else(|| {
            RaycastError::missing(&self.name, format!("uv channel {} not present", uv_channel))
        })?;
        if uvs.len() != vertex_count {
            return Err(RaycastError::missing(
                &self.name,
                format!(
                    "uv channel {} has {} entries for {} vertices",
                    uv_channel,
                    uvs.len(),
                    vertex_count
                ),
            ));
        }

        Ok(indices
            .chunks_exact(3)
            .map(|tri| [tri[0], tri[1], tri[2]])
            .collect())
    }
}

impl fmt::Debug for MeshDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshDescriptor")
            .field("name", &self.name)
            .field("vertices", &self.positions.len())
            .field("uv_channels", &self.uv_channels.len())
            .field("sub_meshes", &self.sub_meshes.len())
            .field("skinned", &self.skinned)
            .field("has_deformer", &self.deformer.is_some())
            .finish()
    }
}

/// Source of per-frame mesh snapshots
pub trait MeshProvider: Send {
    fn kind(&self) -> MeshKind;

    /// Bring the snapshot up to date for `frame`
    ///
    /// Returns whether the geometry changed.
    fn refresh(&mut self, frame: u64) -> bool;

    /// Whether `refresh(frame)` would rebuild the geometry
    fn needs_rebuild(&self, frame: u64) -> bool;

    /// Current snapshot
    fn geometry(&self) -> &Arc<MeshGeometry>;

    fn transform(&self) -> &TransformHandle;

    /// Current world-space bounds
    fn world_bounds(&self) -> Bounds {
        self.geometry().local_bounds().transform(&self.local_to_world())
    }

    fn local_to_world(&self) -> Mat4 {
        self.transform().get()
    }

    fn vertices(&self) -> &[Vec3] {
        self.geometry().vertices()
    }

    fn uv(&self, channel: usize) -> &[Vec2] {
        self.geometry().uv(channel)
    }

    fn triangle_indices(&self) -> &[[u32; 3]] {
        self.geometry().triangle_indices()
    }
}

/// Validate a descriptor and create the matching provider
pub fn build_provider(
    descriptor: MeshDescriptor,
    uv_channel: usize,
    sub_mesh: usize,
    config: &RaycastConfig,
) -> Result<Box<dyn MeshProvider>> {
    let indices = descriptor.validate(uv_channel, sub_mesh)?;
    let MeshDescriptor {
        name,
        positions,
        uv_channels,
        transform,
        skinned,
        deformer,
        ..
    } = descriptor;

    let geometry = MeshGeometry::new(positions, uv_channels, indices, uv_channel);

    match (skinned, deformer) {
        (true, Some(deformer)) => Ok(Box::new(SkinnedMeshProvider::new(
            name,
            geometry,
            transform,
            deformer,
            config.skip_unchanged_pose,
        ))),
        (true, None) => Err(RaycastError::DeformerUnavailable(name)),
        (false, _) => Ok(Box::new(RigidMeshProvider::new(name, geometry, transform))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_descriptor_is_valid() {
        let descriptor = MeshDescriptor::quad("quad", 1.0);
        let triangles = descriptor.validate(0, 0).unwrap();
        assert_eq!(triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_missing_uv_channel() {
        let descriptor = MeshDescriptor::quad("quad", 1.0);
        let err = descriptor.validate(1, 0).unwrap_err();
        assert!(matches!(err, RaycastError::MissingMeshData { .. }));
    }

    #[test]
    fn test_missing_sub_mesh() {
        let descriptor = MeshDescriptor::quad("quad", 1.0);
        assert!(descriptor.validate(0, 2).is_err());
    }

    #[test]
    fn test_bad_index_buffers() {
        let mut descriptor = MeshDescriptor::quad("quad", 1.0);
        descriptor.sub_meshes[0] = vec![0, 1];
        assert!(descriptor.validate(0, 0).is_err());

        descriptor.sub_meshes[0] = vec![0, 1, 9];
        assert!(descriptor.validate(0, 0).is_err());

        descriptor.sub_meshes[0] = Vec::new();
        assert!(descriptor.validate(0, 0).is_err());
    }

    #[test]
    fn test_uv_count_mismatch() {
        let mut descriptor = MeshDescriptor::quad("quad", 1.0);
        descriptor.uv_channels[0].pop();
        assert!(descriptor.validate(0, 0).is_err());
    }

    #[test]
    fn test_skinned_without_deformer() {
        let mut descriptor = MeshDescriptor::quad("skin", 1.0);
        descriptor.skinned = true;
        let err = build_provider(descriptor, 0, 0, &RaycastConfig::default()).err().unwrap();
        assert!(matches!(err, RaycastError::DeformerUnavailable(name) if name == "skin"));
    }

    #[test]
    fn test_second_sub_mesh_selected() {
        let descriptor = MeshDescriptor::quad("quad", 1.0).with_sub_mesh(vec![1, 2, 3]);
        let provider = build_provider(descriptor, 0, 1, &RaycastConfig::default()).unwrap();
        assert_eq!(provider.kind(), MeshKind::Rigid);
        assert_eq!(provider.triangle_indices(), &[[1, 2, 3]]);
    }

    #[test]
    fn test_transform_handle_is_shared() {
        let handle = TransformHandle::default();
        let clone = handle.clone();
        clone.set(Mat4::from_translation(Vec3::X));
        assert_eq!(handle.get().w_axis.x, 1.0);
    }
}
