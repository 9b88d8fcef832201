//! Void Paint Raycast - Pointer to UV Hit Testing
//!
//! Maps a pointer ray onto a triangle and UV coordinate of a paint target,
//! for both static meshes and bone-deformed (skinned) meshes.
//!
//! # Features
//!
//! - Rigid and skinned mesh snapshots (skinned meshes bake once per frame)
//! - Möller-Trumbore intersection with NaN-safe rejection
//! - Conservative stroke culling from the previous pointer position
//! - Serial or data-parallel (rayon) execution
//! - One in-flight raycast per pointer, with down-before-up continuations
//!
//! # Architecture
//!
//! ```text
//!  input layer
//!      │  request_raycast(target, query, callback)
//!      ▼
//! ┌──────────────────────── RaycastController ───────────────────────┐
//! │  targets: MeshProvider (Rigid | Skinned) ──refresh(frame)──┐     │
//! │                                                            ▼     │
//! │  in-flight: (target, pointer) ─► RaycastRequest ◄── MeshGeometry │
//! │                                     │                            │
//! │                      Serial ◄───────┴───────► Parallel (JobSystem)│
//! └─────────────────────────────────────┬────────────────────────────┘
//!                                       ▼
//!                          RaycastData (triangle, barycentric, uv)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use void_paint_raycast::prelude::*;
//!
//! let mut raycasts = RaycastController::new(RaycastConfig::default())?;
//! let canvas = raycasts.register_target(MeshDescriptor::quad("canvas", 1.0), 0, 0)?;
//!
//! let ray = Ray::new(Vec3::new(0.5, 0.5, -1.0), Vec3::Z);
//! let handle = raycasts.request_raycast(canvas, RaycastQuery::new(ray))?;
//! if let Some(hit) = raycasts.try_get_raycast(&handle) {
//!     let texel = hit.pixel_position((1024, 1024));
//! }
//! ```

pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod ids;
pub mod jobs;
pub mod kernel;
pub mod mesh;
pub mod request;
pub mod triangle;

pub mod prelude {
    //! Common imports for paint raycasting
    pub use crate::config::{RaycastConfig, RaycastStrategy};
    pub use crate::controller::{ControllerStats, RaycastController, RaycastQuery, RaycastStatus};
    pub use crate::data::RaycastData;
    pub use crate::error::{RaycastError, Result};
    pub use crate::ids::{PointerId, RequestHandle, RequestId, TargetId};
    pub use crate::kernel::{CullVolume, RaycastHit};
    pub use crate::mesh::{BakedMesh, MeshDeformer, MeshDescriptor, MeshKind, TransformHandle};
    pub use crate::triangle::{Triangle, TriangleSnapshot};
    pub use void_paint_math::prelude::*;
}

pub use config::{RaycastConfig, RaycastStrategy};
pub use controller::RaycastController;
pub use error::{RaycastError, Result};
