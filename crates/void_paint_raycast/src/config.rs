//! Raycast engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{RaycastError, Result};

/// How a request's triangles are tested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RaycastStrategy {
    /// Test every triangle on the calling thread; results are immediate
    #[default]
    Serial,
    /// Copy the triangles and test them on the worker pool
    Parallel,
}

/// Raycast controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaycastConfig {
    /// Strategy used for new requests
    pub strategy: RaycastStrategy,

    /// Worker threads for the parallel strategy (0 = one per core)
    pub worker_threads: usize,

    /// Meshes with fewer triangles than this run serially even when the
    /// parallel strategy is selected
    pub parallel_min_triangles: usize,

    /// Determinants with magnitude at or below this are treated as a ray
    /// parallel to the triangle plane
    pub determinant_epsilon: f32,

    /// Hits closer than this along the ray are rejected
    pub distance_epsilon: f32,

    /// Slack added to the stroke culling planes, in world units
    ///
    /// Converted to mesh-local units with the largest stretch of the
    /// inverse target transform, so scaled targets keep at least this much
    /// slack along every axis.
    pub cull_margin: f32,

    /// Build culling planes from the stroke segment when possible
    pub enable_culling: bool,

    /// Reject triangles facing away from the ray
    pub cull_backfaces: bool,

    /// Skip meshes whose world bounds the ray misses
    pub bounds_early_out: bool,

    /// Skip re-baking skinned meshes whose deformer reports an unchanged pose
    pub skip_unchanged_pose: bool,
}

impl Default for RaycastConfig {
    fn default() -> Self {
        Self {
            strategy: RaycastStrategy::Serial,
            worker_threads: 0,
            parallel_min_triangles: 0,
            determinant_epsilon: 1e-7,
            distance_epsilon: 1e-6,
            cull_margin: 0.01,
            enable_culling: true,
            cull_backfaces: false,
            bounds_early_out: true,
            skip_unchanged_pose: false,
        }
    }
}

impl RaycastConfig {
    /// Configuration for deterministic, single-threaded raycasts
    pub fn serial() -> Self {
        Self::default()
    }

    /// Configuration for large meshes on multi-core targets
    pub fn parallel() -> Self {
        Self {
            strategy: RaycastStrategy::Parallel,
            parallel_min_triangles: 1024,
            ..Default::default()
        }
    }

    /// Set the strategy
    pub fn with_strategy(mut self, strategy: RaycastStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the worker thread count
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the serial fallback threshold
    pub fn with_parallel_min_triangles(mut self, triangles: usize) -> Self {
        self.parallel_min_triangles = triangles;
        self
    }

    /// Enable or disable stroke culling
    pub fn with_culling(mut self, enabled: bool) -> Self {
        self.enable_culling = enabled;
        self
    }

    /// Enable or disable the world-bounds early-out
    pub fn with_bounds_early_out(mut self, enabled: bool) -> Self {
        self.bounds_early_out = enabled;
        self
    }

    /// Strategy to use for a mesh with `triangle_count` triangles
    pub fn strategy_for(&self, triangle_count: usize) -> RaycastStrategy {
        match self.strategy {
            RaycastStrategy::Parallel if triangle_count >= self.parallel_min_triangles => {
                RaycastStrategy::Parallel
            }
            _ => RaycastStrategy::Serial,
        }
    }

    /// Check that tolerances are usable
    pub fn validate(&self) -> Result<()> {
        if !(self.determinant_epsilon >= 0.0 && self.determinant_epsilon.is_finite()) {
            return Err(RaycastError::InvalidConfig(format!(
                "determinant_epsilon must be finite and non-negative, got {}",
                self.determinant_epsilon
            )));
        }
        if !(self.distance_epsilon >= 0.0 && self.distance_epsilon.is_finite()) {
            return Err(RaycastError::InvalidConfig(format!(
                "distance_epsilon must be finite and non-negative, got {}",
                self.distance_epsilon
            )));
        }
        if !(self.cull_margin >= 0.0 && self.cull_margin.is_finite()) {
            return Err(RaycastError::InvalidConfig(format!(
                "cull_margin must be finite and non-negative, got {}",
                self.cull_margin
            )));
        }
        Ok(())
    }
}
