//! One in-flight raycast
//!
//! A request copies the triangle snapshots of its mesh at submission time
//! and then runs either on the calling thread or as a job on the
//! [`JobSystem`]. The lifecycle is
//!
//! ```text
//! Submitted -> Running -> Completed -> Disposed
//!                    \________________/
//! ```
//!
//! The input and output buffers live until the outcome is first read;
//! after that only the reduced outcome is kept. Disposal cancels the job
//! and waits for it only if a worker already picked it up. There is no way
//! back out of `Disposed`.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use rayon::prelude::*;
use void_paint_math::Ray;

use crate::config::RaycastStrategy;
use crate::ids::{PointerId, RequestHandle, RequestId, TargetId};
use crate::jobs::{CompletionToken, JobSystem};
use crate::kernel::{self, CullVolume, KernelSettings, RaycastHit};
use crate::triangle::{MeshGeometry, TriangleSnapshot};

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Submitted,
    Running,
    Completed,
    Disposed,
}

/// Result of polling a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RaycastOutcome {
    /// Still running on the worker pool
    Pending,
    Hit(RaycastHit),
    Miss,
}

impl RaycastOutcome {
    fn from_nearest(nearest: Option<RaycastHit>) -> Self {
        nearest.map_or(Self::Miss, Self::Hit)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn hit(&self) -> Option<&RaycastHit> {
        match self {
            Self::Hit(hit) => Some(hit),
            _ => None,
        }
    }
}

enum Execution {
    /// Ran to completion during submission
    Inline,
    Job {
        token: CompletionToken,
        results: Receiver<Vec<RaycastHit>>,
    },
}

/// A raycast against one mesh snapshot for one pointer
pub struct RaycastRequest {
    handle: RequestHandle,
    strategy: RaycastStrategy,
    state: RequestState,
    geometry: Arc<MeshGeometry>,
    input: Option<Arc<[TriangleSnapshot]>>,
    output: Option<Vec<RaycastHit>>,
    execution: Execution,
    outcome: Option<RaycastOutcome>,
}

impl RaycastRequest {
    fn new(handle: RequestHandle, strategy: RaycastStrategy, geometry: Arc<MeshGeometry>) -> Self {
        Self {
            handle,
            strategy,
            state: RequestState::Submitted,
            geometry,
            input: None,
            output: None,
            execution: Execution::Inline,
            outcome: None,
        }
    }

    /// A request that is already known to miss (e.g. the ray missed the
    /// mesh bounds)
    pub fn resolved_miss(handle: RequestHandle, geometry: Arc<MeshGeometry>) -> Self {
        let mut request = Self::new(handle, RaycastStrategy::Serial, geometry);
        request.outcome = Some(RaycastOutcome::Miss);
        request.state = RequestState::Completed;
        request
    }

    /// Test every triangle on the calling thread
    ///
    /// The request is `Completed` when this returns.
    pub fn submit_serial(
        handle: RequestHandle,
        geometry: Arc<MeshGeometry>,
        ray: Ray,
        cull: CullVolume,
        settings: KernelSettings,
    ) -> Self {
        let mut request = Self::new(handle, RaycastStrategy::Serial, geometry);
        let input: Arc<[TriangleSnapshot]> = Arc::from(request.geometry.triangles());

        request.state = RequestState::Running;
        let mut output = Vec::new();
        let nearest = kernel::run_serial(&ray, &input, &cull, &settings, &mut output);

        request.input = Some(input);
        request.output = Some(output);
        request.outcome = Some(RaycastOutcome::from_nearest(nearest));
        request.state = RequestState::Completed;
        request
    }

    /// Schedule one job that tests every triangle on the worker pool
    pub fn submit_parallel(
        handle: RequestHandle,
        geometry: Arc<MeshGeometry>,
        ray: Ray,
        cull: CullVolume,
        settings: KernelSettings,
        jobs: &JobSystem,
    ) -> Self {
        let mut request = Self::new(handle, RaycastStrategy::Parallel, geometry);
        let input: Arc<[TriangleSnapshot]> = Arc::from(request.geometry.triangles());

        let token = CompletionToken::new();
        let (tx, rx) = bounded(1);
        let job_input = input.clone();

        jobs.schedule(token.clone(), move |token| {
            if token.is_cancelled() {
                return;
            }
            let hits: Vec<RaycastHit> = job_input
                .par_iter()
                .map(|tri| {
                    if token.is_cancelled() {
                        RaycastHit::MISS
                    } else {
                        kernel::raycast_triangle(&ray, tri, &cull, &settings)
                    }
                })
                .collect();
            if token.is_cancelled() {
                return;
            }
            // The owner may already be gone
            let _ = tx.send(hits);
        });

        request.input = Some(input);
        request.execution = Execution::Job { token, results: rx };
        request.state = RequestState::Running;
        request
    }

    #[inline]
    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    #[inline]
    pub fn id(&self) -> RequestId {
        self.handle.id
    }

    #[inline]
    pub fn target(&self) -> TargetId {
        self.handle.target
    }

    #[inline]
    pub fn pointer(&self) -> PointerId {
        self.handle.pointer
    }

    #[inline]
    pub fn strategy(&self) -> RaycastStrategy {
        self.strategy
    }

    #[inline]
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Mesh snapshot the request was submitted against
    pub fn geometry(&self) -> &Arc<MeshGeometry> {
        &self.geometry
    }

    /// Triangles copied at submission; `None` once the outcome has been
    /// read or the request disposed
    pub fn input(&self) -> Option<&[TriangleSnapshot]> {
        self.input.as_deref()
    }

    /// Per-triangle results of a serial run, until the outcome is read
    pub fn output(&self) -> Option<&[RaycastHit]> {
        self.output.as_deref()
    }

    fn release_buffers(&mut self) {
        self.input = None;
        self.output = None;
    }

    /// Whether polling would return a final outcome
    pub fn is_ready(&self) -> bool {
        match (&self.state, &self.execution) {
            (RequestState::Running, Execution::Job { token, .. }) => token.is_complete(),
            _ => true,
        }
    }

    /// Non-blocking poll
    ///
    /// The per-triangle buffer is reduced to the nearest hit on the first
    /// poll after completion and both buffers are released; later polls
    /// return the cached outcome. Disposed requests report a miss.
    pub fn poll(&mut self) -> RaycastOutcome {
        match self.state {
            RequestState::Disposed => return RaycastOutcome::Miss,
            RequestState::Completed => {
                self.release_buffers();
                return self.outcome.unwrap_or(RaycastOutcome::Miss);
            }
            RequestState::Submitted | RequestState::Running => {}
        }

        let outcome = match &self.execution {
            Execution::Job { token, results } => {
                if !token.is_complete() {
                    return RaycastOutcome::Pending;
                }
                match results.try_recv() {
                    Ok(hits) => RaycastOutcome::from_nearest(kernel::nearest_hit(&hits)),
                    Err(_) => {
                        log::debug!("{:?} finished without results", self.handle.id);
                        RaycastOutcome::Miss
                    }
                }
            }
            Execution::Inline => self.outcome.unwrap_or(RaycastOutcome::Miss),
        };

        self.execution = Execution::Inline;
        self.release_buffers();
        self.outcome = Some(outcome);
        self.state = RequestState::Completed;
        outcome
    }

    /// Block until the job finishes, then poll
    ///
    /// Meant for shutdown paths and tests; frame code should use [`poll`].
    ///
    /// [`poll`]: RaycastRequest::poll
    pub fn wait_and_get(&mut self) -> RaycastOutcome {
        if let (RequestState::Running, Execution::Job { token, .. }) = (&self.state, &self.execution) {
            token.wait();
        }
        self.poll()
    }

    /// Cancel the job and release the buffers
    ///
    /// Blocks only while a worker is still inside the job; a job still
    /// queued is skipped by the pool. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.state == RequestState::Disposed {
            return;
        }
        if let Execution::Job { token, .. } = &self.execution {
            if !token.is_complete() {
                token.cancel();
                if token.has_started() {
                    token.wait();
                }
            }
        }
        self.execution = Execution::Inline;
        self.release_buffers();
        self.state = RequestState::Disposed;
        log::trace!("{:?} disposed", self.handle.id);
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.state == RequestState::Disposed
    }
}

impl Drop for RaycastRequest {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for RaycastRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaycastRequest")
            .field("id", &self.handle.id)
            .field("target", &self.handle.target)
            .field("pointer", &self.handle.pointer)
            .field("strategy", &self.strategy)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish()
    }
}
