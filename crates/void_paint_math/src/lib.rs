//! # void_paint_math - Geometry for Surface Painting
//!
//! Small, allocation-free primitives shared by the paint raycasting engine:
//!
//! - [`Ray`] for camera/pointer rays
//! - [`Bounds`] axis-aligned boxes for world-bounds rejection
//! - [`Plane`] half-spaces used by stroke culling
//! - [`Barycentric`] weights and interpolation
//! - Screen projection helpers ([`ScreenProjector`], [`uv_to_pixel`])
//!
//! Vector and matrix types come from `glam` and are re-exported here so
//! downstream crates agree on a single math backend.

pub mod barycentric;
pub mod bounds;
pub mod plane;
pub mod projection;
pub mod ray;

pub use barycentric::*;
pub use bounds::*;
pub use plane::*;
pub use projection::*;
pub use ray::*;

pub use glam::{Mat4, Vec2, Vec3, Vec4};

/// Common tolerances
pub mod consts {
    /// Tolerance used when checking that weights lie inside `[0, 1]`
    pub const WEIGHT_EPSILON: f32 = 1e-5;
    /// Minimum squared length for a direction to be considered usable
    pub const MIN_DIRECTION_SQ: f32 = 1e-12;
}

pub mod prelude {
    pub use crate::barycentric::Barycentric;
    pub use crate::bounds::Bounds;
    pub use crate::plane::Plane;
    pub use crate::projection::{screen_to_ray, uv_to_pixel, ScreenProjector, ScreenToRay};
    pub use crate::ray::Ray;
    pub use glam::{Mat4, Vec2, Vec3};
}
