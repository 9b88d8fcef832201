//! Worker pool for parallel raycasts
//!
//! [`JobSystem`] wraps a dedicated rayon pool so paint raycasts never
//! compete with the global pool. Each scheduled job owns a
//! [`CompletionToken`] that the main thread can poll without blocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{RaycastError, Result};

/// Dedicated thread pool for raycast jobs
pub struct JobSystem {
    pool: rayon::ThreadPool,
}

impl JobSystem {
    /// Start a pool with `threads` workers (0 = one per core)
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("paint-raycast-{}", index))
            .build()
            .map_err(|e| RaycastError::JobSystem(e.to_string()))?;

        log::info!("Raycast job system started with {} workers", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `job` on the pool
    ///
    /// The token is completed when the job returns, including when it
    /// unwinds, so waiters are always released. A job cancelled before a
    /// worker picks it up is skipped.
    pub fn schedule<F>(&self, token: CompletionToken, job: F)
    where
        F: FnOnce(&CompletionToken) + Send + 'static,
    {
        self.pool.spawn(move || {
            let guard = CompleteOnDrop(token);
            if guard.0.begin() {
                job(&guard.0);
            }
        });
    }
}

impl std::fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSystem")
            .field("threads", &self.threads())
            .finish()
    }
}

#[derive(Default)]
struct TokenState {
    done: AtomicBool,
    started: AtomicBool,
    cancelled: AtomicBool,
    lock: Mutex<()>,
    signal: Condvar,
}

/// Completion and cancellation flags shared between a job and its owner
#[derive(Clone, Default)]
pub struct CompletionToken {
    state: Arc<TokenState>,
}

impl CompletionToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking completion check
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    /// Mark the job finished and wake waiters
    pub fn complete(&self) {
        {
            let _guard = self.state.lock.lock();
            self.state.done.store(true, Ordering::Release);
        }
        self.state.signal.notify_all();
    }

    /// Ask the job to stop early; it still completes the token
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Whether a worker has picked the job up
    ///
    /// Checked after [`cancel`](Self::cancel): `false` means the job body
    /// will never run.
    #[inline]
    pub fn has_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Called by the worker before running the job body; `false` if the
    /// job was cancelled first
    fn begin(&self) -> bool {
        // Pairs with cancel() + has_started(): both sides store then load
        self.state.started.store(true, Ordering::SeqCst);
        !self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Block until the job has completed
    pub fn wait(&self) {
        let mut guard = self.state.lock.lock();
        while !self.state.done.load(Ordering::Acquire) {
            self.state.signal.wait(&mut guard);
        }
    }
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken")
            .field("started", &self.has_started())
            .field("complete", &self.is_complete())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct CompleteOnDrop(CompletionToken);

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        self.0.complete();
    }
}
