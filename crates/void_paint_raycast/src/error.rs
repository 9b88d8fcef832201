//! Error types for the raycasting engine
//!
//! Only structural problems are errors. Geometric edge cases (parallel rays,
//! degenerate triangles, NaN input) and late polls on disposed requests
//! resolve to a miss instead.

use thiserror::Error;

use crate::ids::TargetId;

/// Raycasting engine errors
#[derive(Debug, Error)]
pub enum RaycastError {
    /// Target lacks a usable UV channel or index buffer
    #[error("Mesh '{mesh}' is missing data: {reason}")]
    MissingMeshData { mesh: String, reason: String },

    /// Skinned target registered without a deformer to bake it
    #[error("Skinned mesh '{0}' has no deformer")]
    DeformerUnavailable(String),

    /// Target id not registered (or already unregistered)
    #[error("Raycast target not found: {0:?}")]
    UnknownTarget(TargetId),

    /// Invalid configuration
    #[error("Invalid raycast configuration: {0}")]
    InvalidConfig(String),

    /// Worker pool could not be started
    #[error("Failed to start raycast workers: {0}")]
    JobSystem(String),
}

impl RaycastError {
    pub(crate) fn missing(mesh: &str, reason: impl Into<String>) -> Self {
        Self::MissingMeshData {
            mesh: mesh.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result type for raycast operations
pub type Result<T> = std::result::Result<T, RaycastError>;
