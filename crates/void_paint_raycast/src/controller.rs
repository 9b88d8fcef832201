//! Raycast controller
//!
//! The controller is the frame-loop facing side of the engine. It owns the
//! registered paint targets and at most one raycast per `(target, pointer)`
//! pair.
//!
//! ## Frame loop
//!
//! ```ignore
//! let mut raycasts = RaycastController::new(RaycastConfig::parallel())?;
//! let canvas = raycasts.register_target(descriptor, 0, 0)?;
//!
//! // every frame
//! raycasts.advance_frame();
//! let handle = raycasts.request_raycast_with(canvas, query, |data| { /* paint */ })?;
//! raycasts.update();
//! ```
//!
//! ## Ordering
//!
//! Callbacks for a request always run before any continuation registered
//! for the same pointer with [`RaycastController::add_continuation`]. This
//! keeps a pointer-up effect behind the pointer-down hit even when the
//! down raycast is still running on the worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Vec2};
use serde::{Deserialize, Serialize};
use void_paint_math::{Ray, ScreenToRay};

use crate::config::{RaycastConfig, RaycastStrategy};
use crate::data::RaycastData;
use crate::error::{RaycastError, Result};
use crate::ids::{PointerId, RequestHandle, RequestId, TargetId};
use crate::jobs::JobSystem;
use crate::kernel::{CullVolume, KernelSettings};
use crate::mesh::{build_provider, MeshDescriptor, MeshProvider, TransformHandle};
use crate::request::{RaycastOutcome, RaycastRequest};
use crate::triangle::MeshGeometry;

/// Completion callback of a raycast; `None` means a miss
pub type RaycastCallback = Box<dyn FnOnce(Option<RaycastData>) + Send>;

/// Deferred work waiting on a pointer's raycast
pub type Continuation = Box<dyn FnOnce() + Send>;

type RequestKey = (TargetId, PointerId);

/// Pointer ray plus the stroke segment it belongs to
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaycastQuery {
    /// World-space ray under the pointer
    pub ray: Ray,
    pub pointer: PointerId,
    /// Previous and current screen positions of the pointer
    pub stroke: Option<(Vec2, Vec2)>,
}

impl RaycastQuery {
    /// Query for the mouse with no stroke information
    pub fn new(ray: Ray) -> Self {
        Self {
            ray,
            pointer: PointerId::MOUSE,
            stroke: None,
        }
    }

    pub fn with_pointer(mut self, pointer: PointerId) -> Self {
        self.pointer = pointer;
        self
    }

    /// Attach the screen-space stroke segment used for culling
    pub fn with_stroke(mut self, previous: Vec2, current: Vec2) -> Self {
        self.stroke = Some((previous, current));
        self
    }
}

/// Result of polling a handle
#[derive(Debug, Clone)]
pub enum RaycastStatus {
    Pending,
    Hit(RaycastData),
    Miss,
    /// Handle was superseded, released, cancelled, or delivered in an
    /// earlier frame
    Stale,
}

impl RaycastStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn into_data(self) -> Option<RaycastData> {
        match self {
            Self::Hit(data) => Some(data),
            _ => None,
        }
    }
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub frame: u64,
    pub targets: usize,
    /// Requests still waiting on the worker pool
    pub pending: usize,
    pub submitted: u64,
    pub serial: u64,
    pub parallel: u64,
    /// Requests resolved as a miss without testing triangles
    pub early_outs: u64,
    pub superseded: u64,
    pub cancelled: u64,
    pub hits: u64,
    pub misses: u64,
}

struct PaintTarget {
    name: String,
    provider: Box<dyn MeshProvider>,
}

struct InFlight {
    request: RaycastRequest,
    callback: Option<RaycastCallback>,
    transform: TransformHandle,
    delivered: bool,
}

impl InFlight {
    fn data(&self, outcome: &RaycastOutcome) -> Option<RaycastData> {
        let hit = outcome.hit()?;
        RaycastData::from_hit(
            self.request.handle(),
            hit,
            self.request.geometry().clone(),
            self.transform.clone(),
        )
    }
}

/// Owns paint targets and schedules their raycasts
pub struct RaycastController {
    config: RaycastConfig,
    settings: KernelSettings,
    targets: HashMap<TargetId, PaintTarget>,
    in_flight: HashMap<RequestKey, InFlight>,
    continuations: HashMap<RequestKey, Vec<Continuation>>,
    jobs: Option<Arc<JobSystem>>,
    ray_source: Option<Box<dyn ScreenToRay + Send>>,
    frame: u64,
    next_target: u32,
    next_request: u64,
    stats: ControllerStats,
}

impl RaycastController {
    /// Create a controller; the worker pool is started for the parallel
    /// strategy only
    pub fn new(config: RaycastConfig) -> Result<Self> {
        config.validate()?;

        let jobs = match config.strategy {
            RaycastStrategy::Parallel => Some(Arc::new(JobSystem::new(config.worker_threads)?)),
            RaycastStrategy::Serial => None,
        };
        Ok(Self::from_parts(config, jobs))
    }

    /// Create a controller that schedules parallel raycasts on a shared
    /// pool; `worker_threads` is ignored
    pub fn with_job_system(config: RaycastConfig, jobs: Arc<JobSystem>) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, Some(jobs)))
    }

    fn from_parts(config: RaycastConfig, jobs: Option<Arc<JobSystem>>) -> Self {
        log::info!("Raycast controller created ({:?})", config.strategy);

        Self {
            settings: KernelSettings::from(&config),
            config,
            targets: HashMap::new(),
            in_flight: HashMap::new(),
            continuations: HashMap::new(),
            jobs,
            ray_source: None,
            frame: 0,
            next_target: 0,
            next_request: 0,
            stats: ControllerStats::default(),
        }
    }

    pub fn config(&self) -> &RaycastConfig {
        &self.config
    }

    /// Camera used to turn the previous stroke position into a ray
    pub fn set_ray_source(&mut self, source: impl ScreenToRay + Send + 'static) {
        self.ray_source = Some(Box::new(source));
    }

    pub fn clear_ray_source(&mut self) {
        self.ray_source = None;
    }

    /// Current frame counter
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Start a new frame; skinned targets re-bake on their next query
    ///
    /// Requests delivered during the previous frame are dropped, so their
    /// handles turn stale. Pending requests are kept.
    pub fn advance_frame(&mut self) -> u64 {
        let tracked = self.in_flight.len();
        self.in_flight.retain(|_, entry| !entry.delivered);
        let evicted = tracked - self.in_flight.len();
        if evicted > 0 {
            log::trace!("Evicted {} delivered raycasts", evicted);
        }

        self.frame += 1;
        self.frame
    }

    // ===== Targets =====

    /// Register a mesh for painting
    ///
    /// Fails when the sub-mesh or UV channel is unusable, or when a skinned
    /// mesh has no deformer; the mesh is not registered in that case.
    pub fn register_target(
        &mut self,
        descriptor: MeshDescriptor,
        uv_channel: usize,
        sub_mesh: usize,
    ) -> Result<TargetId> {
        let name = descriptor.name.clone();
        let provider = build_provider(descriptor, uv_channel, sub_mesh, &self.config).map_err(|e| {
            log::warn!("Paint target '{}' rejected: {}", name, e);
            e
        })?;

        let id = TargetId(self.next_target);
        self.next_target += 1;

        log::debug!(
            "Registered paint target '{}' as {:?} ({:?}, {} triangles)",
            name,
            id,
            provider.kind(),
            provider.geometry().triangle_count()
        );
        self.targets.insert(id, PaintTarget { name, provider });
        Ok(id)
    }

    /// Remove a target, cancelling everything still tied to it
    pub fn unregister_target(&mut self, target: TargetId) -> Result<()> {
        if !self.targets.contains_key(&target) {
            return Err(RaycastError::UnknownTarget(target));
        }
        self.cancel_all(target);
        if let Some(removed) = self.targets.remove(&target) {
            log::debug!("Unregistered paint target '{}' ({:?})", removed.name, target);
        }
        Ok(())
    }

    pub fn contains_target(&self, target: TargetId) -> bool {
        self.targets.contains_key(&target)
    }

    /// Latest mesh snapshot of a target
    pub fn target_geometry(&self, target: TargetId) -> Result<Arc<MeshGeometry>> {
        self.targets
            .get(&target)
            .map(|t| t.provider.geometry().clone())
            .ok_or(RaycastError::UnknownTarget(target))
    }

    // ===== Requests =====

    /// Submit a raycast without a callback; poll it with
    /// [`try_get_raycast`](Self::try_get_raycast)
    pub fn request_raycast(&mut self, target: TargetId, query: RaycastQuery) -> Result<RequestHandle> {
        self.submit(target, query, None)
    }

    /// Submit a raycast and run `on_complete` once it resolves
    ///
    /// A still-pending request for the same pointer and target is disposed
    /// and its callback dropped. Serial requests resolve, and run the
    /// callback, before this returns.
    pub fn request_raycast_with<F>(
        &mut self,
        target: TargetId,
        query: RaycastQuery,
        on_complete: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(Option<RaycastData>) + Send + 'static,
    {
        self.submit(target, query, Some(Box::new(on_complete)))
    }

    fn submit(
        &mut self,
        target_id: TargetId,
        query: RaycastQuery,
        callback: Option<RaycastCallback>,
    ) -> Result<RequestHandle> {
        if !self.targets.contains_key(&target_id) {
            return Err(RaycastError::UnknownTarget(target_id));
        }
        let key = (target_id, query.pointer);

        // One request per pointer: finish off or supersede the previous one
        if let Some(RaycastOutcome::Pending) = self.resolve(key) {
            if let Some(mut previous) = self.in_flight.remove(&key) {
                log::debug!(
                    "{:?} superseded for {:?} on {:?}",
                    previous.request.id(),
                    query.pointer,
                    target_id
                );
                previous.request.dispose();
                self.stats.superseded += 1;
            }
            // Nothing waits on a disposed request
            self.run_continuations(key);
        }

        let handle = RequestHandle {
            id: RequestId(self.next_request),
            target: target_id,
            pointer: query.pointer,
        };
        self.next_request += 1;

        let frame = self.frame;
        let target = self
            .targets
            .get_mut(&target_id)
            .ok_or(RaycastError::UnknownTarget(target_id))?;
        // Rebuild strictly before the snapshot is handed to the request
        if target.provider.refresh(frame) {
            log::trace!("Paint target '{}' rebuilt for frame {}", target.name, frame);
        }
        let geometry = target.provider.geometry().clone();
        let transform = target.provider.transform().clone();
        let world_bounds = target.provider.world_bounds();

        let reaches_mesh = query.ray.is_valid()
            && (!self.config.bounds_early_out || world_bounds.intersect_ray(&query.ray).is_some());

        let request = match local_space(&transform.get(), &query.ray) {
            Some((to_local, local_ray)) if reaches_mesh => {
                let cull = self.cull_volume(&query, &to_local, &local_ray);
                self.execute(handle, geometry, local_ray, cull)
            }
            _ => {
                self.stats.early_outs += 1;
                RaycastRequest::resolved_miss(handle, geometry)
            }
        };

        self.stats.submitted += 1;
        match request.strategy() {
            RaycastStrategy::Serial => self.stats.serial += 1,
            RaycastStrategy::Parallel => self.stats.parallel += 1,
        }

        self.in_flight.insert(
            key,
            InFlight {
                request,
                callback,
                transform,
                delivered: false,
            },
        );
        self.resolve(key);
        Ok(handle)
    }

    fn execute(
        &self,
        handle: RequestHandle,
        geometry: Arc<MeshGeometry>,
        ray: Ray,
        cull: CullVolume,
    ) -> RaycastRequest {
        match (self.config.strategy_for(geometry.triangle_count()), self.jobs.as_deref()) {
            (RaycastStrategy::Parallel, Some(jobs)) => {
                RaycastRequest::submit_parallel(handle, geometry, ray, cull, self.settings, jobs)
            }
            _ => RaycastRequest::submit_serial(handle, geometry, ray, cull, self.settings),
        }
    }

    fn cull_volume(&self, query: &RaycastQuery, to_local: &Mat4, local_ray: &Ray) -> CullVolume {
        if !self.config.enable_culling {
            return CullVolume::SKIP;
        }
        let (Some((previous, current)), Some(source)) = (query.stroke, self.ray_source.as_ref()) else {
            return CullVolume::SKIP;
        };
        if previous == current {
            return CullVolume::SKIP;
        }
        let previous_ray = source.screen_to_ray(previous).transform(to_local);
        let margin = local_margin(to_local, self.config.cull_margin);
        CullVolume::from_stroke(&previous_ray, local_ray, margin)
    }

    /// Poll the request under `key` and, the first time it resolves, run its
    /// callback followed by the pointer's continuations
    fn resolve(&mut self, key: RequestKey) -> Option<RaycastOutcome> {
        let entry = self.in_flight.get_mut(&key)?;
        let outcome = entry.request.poll();
        if outcome.is_pending() || entry.delivered {
            return Some(outcome);
        }

        entry.delivered = true;
        let data = entry.data(&outcome);
        let callback = entry.callback.take();

        if data.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        if let Some(callback) = callback {
            callback(data);
        }
        self.run_continuations(key);
        Some(outcome)
    }

    fn run_continuations(&mut self, key: RequestKey) {
        if let Some(continuations) = self.continuations.remove(&key) {
            for continuation in continuations {
                continuation();
            }
        }
    }

    fn is_current(&self, handle: &RequestHandle) -> bool {
        self.in_flight
            .get(&handle.key())
            .map_or(false, |entry| entry.request.id() == handle.id)
    }

    /// Non-blocking poll of a handle
    pub fn poll_raycast(&mut self, handle: &RequestHandle) -> RaycastStatus {
        if !self.is_current(handle) {
            return RaycastStatus::Stale;
        }
        let key = handle.key();
        match self.resolve(key) {
            None => RaycastStatus::Stale,
            Some(RaycastOutcome::Pending) => RaycastStatus::Pending,
            Some(outcome) => match self.in_flight.get(&key).and_then(|entry| entry.data(&outcome)) {
                Some(data) => RaycastStatus::Hit(data),
                None => RaycastStatus::Miss,
            },
        }
    }

    /// Hit data once the raycast has resolved; `None` while pending, on a
    /// miss, or for a stale handle
    pub fn try_get_raycast(&mut self, handle: &RequestHandle) -> Option<RaycastData> {
        self.poll_raycast(handle).into_data()
    }

    /// Run `continuation` once the pointer's current raycast has resolved
    ///
    /// Runs immediately when nothing is pending for the pointer.
    pub fn add_continuation<F>(&mut self, target: TargetId, pointer: PointerId, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let key = (target, pointer);
        match self.resolve(key) {
            Some(RaycastOutcome::Pending) => {
                self.continuations
                    .entry(key)
                    .or_default()
                    .push(Box::new(continuation));
            }
            _ => continuation(),
        }
    }

    /// Alias of [`add_continuation`](Self::add_continuation)
    pub fn add_callback<F>(&mut self, target: TargetId, pointer: PointerId, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_continuation(target, pointer, callback);
    }

    /// Dispose one request; its callback is dropped and waiting
    /// continuations run
    ///
    /// Returns `false` for a stale handle.
    pub fn release(&mut self, handle: &RequestHandle) -> bool {
        if !self.is_current(handle) {
            return false;
        }
        let key = handle.key();
        if let Some(mut entry) = self.in_flight.remove(&key) {
            if !entry.delivered {
                self.stats.cancelled += 1;
            }
            entry.request.dispose();
        }
        self.run_continuations(key);
        true
    }

    /// Dispose every request tied to a target, completed or not
    ///
    /// Callbacks and continuations for the target are dropped. Returns the
    /// number of requests disposed.
    pub fn cancel_all(&mut self, target: TargetId) -> usize {
        let keys: Vec<RequestKey> = self
            .in_flight
            .keys()
            .filter(|(owner, _)| *owner == target)
            .copied()
            .collect();

        for key in &keys {
            if let Some(mut entry) = self.in_flight.remove(key) {
                if !entry.delivered {
                    self.stats.cancelled += 1;
                }
                entry.request.dispose();
            }
        }
        self.continuations.retain(|(owner, _), _| *owner != target);

        if !keys.is_empty() {
            log::debug!("Cancelled {} raycasts for {:?}", keys.len(), target);
        }
        keys.len()
    }

    /// Poll every request, delivering callbacks and continuations of the
    /// ones that finished
    ///
    /// Returns the number of requests still pending.
    pub fn update(&mut self) -> usize {
        let keys: Vec<RequestKey> = self.in_flight.keys().copied().collect();
        keys.into_iter()
            .filter(|key| matches!(self.resolve(*key), Some(RaycastOutcome::Pending)))
            .count()
    }

    /// Requests held by the controller, pending or delivered this frame
    pub fn request_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Requests that have not resolved yet
    pub fn pending_count(&self) -> usize {
        self.in_flight.values().filter(|entry| !entry.delivered).count()
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            frame: self.frame,
            targets: self.targets.len(),
            pending: self.pending_count(),
            ..self.stats
        }
    }
}

impl Drop for RaycastController {
    fn drop(&mut self) {
        let targets: Vec<TargetId> = self.targets.keys().copied().collect();
        for target in targets {
            self.cancel_all(target);
        }
    }
}

/// Inverse transform and mesh-local ray, if the transform is invertible
fn local_space(local_to_world: &Mat4, ray: &Ray) -> Option<(Mat4, Ray)> {
    let det = local_to_world.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let to_local = local_to_world.inverse();
    let local_ray = ray.transform(&to_local);
    local_ray.is_valid().then_some((to_local, local_ray))
}

/// World-space culling slack expressed in mesh-local units
///
/// Uses the largest axis stretch of `to_local`, so the slab is never
/// thinner than `margin` in world space.
fn local_margin(to_local: &Mat4, margin: f32) -> f32 {
    let stretch = to_local
        .x_axis
        .truncate()
        .length()
        .max(to_local.y_axis.truncate().length())
        .max(to_local.z_axis.truncate().length());
    margin * stretch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::CompletionToken;
    use glam::Vec3;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn controller() -> (RaycastController, TargetId) {
        let mut controller = RaycastController::new(RaycastConfig::default()).unwrap();
        let target = controller
            .register_target(MeshDescriptor::quad("canvas", 1.0), 0, 0)
            .unwrap();
        (controller, target)
    }

    fn query(x: f32, y: f32) -> RaycastQuery {
        RaycastQuery::new(Ray::new(Vec3::new(x, y, -1.0), Vec3::Z))
    }

    /// Park the pool's only worker until the returned gate completes
    fn hold_worker(jobs: &JobSystem) -> CompletionToken {
        let gate = CompletionToken::new();
        let running = CompletionToken::new();
        let (job_gate, job_running) = (gate.clone(), running.clone());
        jobs.schedule(CompletionToken::new(), move |_| {
            job_running.complete();
            job_gate.wait();
        });
        running.wait();
        gate
    }

    #[test]
    fn test_serial_callback_runs_on_submit() {
        let (mut controller, target) = controller();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let handle = controller
            .request_raycast_with(target, query(0.25, 0.75), move |data| {
                assert!(data.is_some());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let data = controller.try_get_raycast(&handle).unwrap();
        assert_eq!(data.triangle_id(), 1);
        // Delivered once only
        controller.update();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_target() {
        let (mut controller, _) = controller();
        let err = controller.request_raycast(TargetId(99), query(0.5, 0.5)).unwrap_err();
        assert!(matches!(err, RaycastError::UnknownTarget(TargetId(99))));
        assert!(controller.unregister_target(TargetId(99)).is_err());
    }

    #[test]
    fn test_rejected_registration() {
        let mut controller = RaycastController::new(RaycastConfig::default()).unwrap();
        assert!(controller
            .register_target(MeshDescriptor::quad("canvas", 1.0), 3, 0)
            .is_err());
        assert_eq!(controller.stats().targets, 0);
    }

    #[test]
    fn test_newer_request_makes_old_handle_stale() {
        let (mut controller, target) = controller();
        let first = controller.request_raycast(target, query(0.25, 0.75)).unwrap();
        let second = controller.request_raycast(target, query(0.75, 0.25)).unwrap();

        assert!(matches!(controller.poll_raycast(&first), RaycastStatus::Stale));
        assert!(controller.try_get_raycast(&first).is_none());
        assert_eq!(controller.try_get_raycast(&second).unwrap().triangle_id(), 0);
    }

    #[test]
    fn test_pointers_are_independent() {
        let (mut controller, target) = controller();
        let mouse = controller.request_raycast(target, query(0.25, 0.75)).unwrap();
        let finger = controller
            .request_raycast(target, query(0.75, 0.25).with_pointer(PointerId(1)))
            .unwrap();

        assert_eq!(controller.try_get_raycast(&mouse).unwrap().triangle_id(), 1);
        assert_eq!(controller.try_get_raycast(&finger).unwrap().triangle_id(), 0);
    }

    #[test]
    fn test_bounds_early_out_counts_as_miss() {
        let (mut controller, target) = controller();
        let handle = controller.request_raycast(target, query(5.0, 5.0)).unwrap();

        assert!(matches!(controller.poll_raycast(&handle), RaycastStatus::Miss));
        let stats = controller.stats();
        assert_eq!(stats.early_outs, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.serial, 1);
    }

    #[test]
    fn test_moved_target_is_hit_in_local_space() {
        let mut controller = RaycastController::new(RaycastConfig::default()).unwrap();
        let transform = TransformHandle::new(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        let target = controller
            .register_target(
                MeshDescriptor::quad("moved", 1.0).with_transform(transform.clone()),
                0,
                0,
            )
            .unwrap();

        let handle = controller.request_raycast(target, query(10.25, 0.75)).unwrap();
        let data = controller.try_get_raycast(&handle).unwrap();
        assert!((data.local_point() - Vec3::new(0.25, 0.75, 0.0)).length() < 1e-5);
        assert!((data.world_point() - Vec3::new(10.25, 0.75, 0.0)).length() < 1e-5);

        // The original position no longer hits
        let handle = controller.request_raycast(target, query(0.25, 0.75)).unwrap();
        assert!(controller.try_get_raycast(&handle).is_none());
    }

    #[test]
    fn test_continuation_runs_immediately_when_idle() {
        let (mut controller, target) = controller();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sink = log.clone();
        controller.add_continuation(target, PointerId::MOUSE, move || sink.lock().push("up"));
        assert_eq!(*log.lock(), vec!["up"]);
    }

    #[test]
    fn test_release_and_cancel() {
        let (mut controller, target) = controller();
        let handle = controller.request_raycast(target, query(0.5, 0.5)).unwrap();

        assert!(controller.release(&handle));
        assert!(!controller.release(&handle));
        assert!(matches!(controller.poll_raycast(&handle), RaycastStatus::Stale));

        controller.request_raycast(target, query(0.5, 0.5)).unwrap();
        controller
            .request_raycast(target, query(0.5, 0.5).with_pointer(PointerId(3)))
            .unwrap();
        assert_eq!(controller.cancel_all(target), 2);

        controller.unregister_target(target).unwrap();
        assert!(!controller.contains_target(target));
    }

    #[test]
    fn test_stationary_stroke_still_hits() {
        let (mut controller, target) = controller();
        controller.set_ray_source(void_paint_math::ScreenProjector::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Vec2::new(100.0, 100.0),
        ));
        let pointer = Vec2::new(50.0, 50.0);
        let handle = controller
            .request_raycast(target, query(0.25, 0.75).with_stroke(pointer, pointer))
            .unwrap();
        assert!(controller.try_get_raycast(&handle).is_some());
    }

    #[test]
    fn test_query_serialization() {
        let query = query(0.25, 0.5)
            .with_pointer(PointerId(2))
            .with_stroke(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        let json = serde_json::to_string(&query).unwrap();
        let restored: RaycastQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, query);
    }

    #[test]
    fn test_delivered_requests_evicted_on_next_frame() {
        let (mut controller, target) = controller();
        let handles: Vec<RequestHandle> = (0..4)
            .map(|i| {
                controller
                    .request_raycast(target, query(0.25, 0.75).with_pointer(PointerId(i)))
                    .unwrap()
            })
            .collect();
        assert_eq!(controller.request_count(), 4);

        // Only the reduced outcome is kept once delivered
        let entry = &controller.in_flight[&handles[0].key()];
        assert!(entry.delivered);
        assert!(entry.request.input().is_none());
        assert!(entry.request.output().is_none());
        assert!(controller.try_get_raycast(&handles[0]).is_some());

        controller.advance_frame();
        assert_eq!(controller.request_count(), 0);
        for handle in &handles {
            assert!(matches!(controller.poll_raycast(handle), RaycastStatus::Stale));
        }
    }

    #[test]
    fn test_pending_request_survives_frame_advance() {
        let jobs = Arc::new(JobSystem::new(1).unwrap());
        let gate = hold_worker(&jobs);
        let config = RaycastConfig::parallel().with_parallel_min_triangles(0);
        let mut controller = RaycastController::with_job_system(config, jobs).unwrap();
        let target = controller
            .register_target(MeshDescriptor::quad("canvas", 1.0), 0, 0)
            .unwrap();

        let handle = controller.request_raycast(target, query(0.25, 0.75)).unwrap();
        assert!(controller.poll_raycast(&handle).is_pending());
        controller.advance_frame();
        assert_eq!(controller.request_count(), 1);
        assert_eq!(controller.pending_count(), 1);

        gate.complete();
        let deadline = Instant::now() + Duration::from_secs(10);
        while controller.update() > 0 {
            assert!(Instant::now() < deadline, "raycast never resolved");
            std::thread::yield_now();
        }
        assert_eq!(controller.try_get_raycast(&handle).unwrap().triangle_id(), 1);
    }

    #[test]
    fn test_cull_margin_is_world_sized() {
        assert_eq!(local_margin(&Mat4::IDENTITY, 0.01), 0.01);

        let translated = Mat4::from_translation(Vec3::new(5.0, -3.0, 2.0)).inverse();
        assert!((local_margin(&translated, 0.01) - 0.01).abs() < 1e-6);

        // Shrunk along x in world space, so local slack must grow
        let to_local = Mat4::from_scale(Vec3::new(0.5, 2.0, 1.0)).inverse();
        assert!((local_margin(&to_local, 0.01) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_scaled_target_stroke_still_hits() {
        let mut controller = RaycastController::new(RaycastConfig::default()).unwrap();
        let transform = TransformHandle::new(Mat4::from_scale(Vec3::splat(10.0)));
        let target = controller
            .register_target(
                MeshDescriptor::quad("scaled", 1.0).with_transform(transform),
                0,
                0,
            )
            .unwrap();
        controller.set_ray_source(void_paint_math::ScreenProjector::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Vec2::new(100.0, 100.0),
        ));

        let handle = controller
            .request_raycast(
                target,
                query(2.5, 7.5).with_stroke(Vec2::new(40.0, 50.0), Vec2::new(60.0, 50.0)),
            )
            .unwrap();
        let data = controller.try_get_raycast(&handle).unwrap();
        assert!((data.local_point() - Vec3::new(0.25, 0.75, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_frame_counter() {
        let (mut controller, _) = controller();
        assert_eq!(controller.frame(), 0);
        assert_eq!(controller.advance_frame(), 1);
        assert_eq!(controller.stats().frame, 1);
    }
}
