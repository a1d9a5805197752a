use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tokio::sync::watch;

/// Snapshot of upload activity consumed by overlays and unload guards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UploadActivity {
    pub active_jobs: usize,
    /// Mean progress over active jobs; 0 when idle.
    pub progress: f64,
    pub blocking: bool,
}

/// Hook asserting "work in progress" while any upload is active.
///
/// `install` runs when the first job starts and `remove` when the last one
/// ends; jobs starting and ending in between never toggle it.
pub trait UnloadGuard: Send + Sync {
    fn install(&self);
    fn remove(&self);
}

/// Unload guard for headless hosts: records the window in the log.
pub struct TracingUnloadGuard;

impl UnloadGuard for TracingUnloadGuard {
    fn install(&self) {
        tracing::info!("⏳ Uploads in progress, holding shutdown");
    }

    fn remove(&self) {
        tracing::info!("✅ All uploads settled");
    }
}

struct CoordinatorInner {
    jobs: Mutex<HashMap<u64, f64>>,
    next_id: AtomicU64,
    state: watch::Sender<UploadActivity>,
    guard: Option<Arc<dyn UnloadGuard>>,
    /// Whether the guard is currently installed. Held while a hook runs.
    guard_installed: Mutex<bool>,
    /// Set whenever the job count may have crossed zero.
    guard_dirty: AtomicBool,
}

impl CoordinatorInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<u64, f64>> {
        // Poisoning cannot leave the map inconsistent: every critical section
        // is a single insert, update or remove.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, jobs: &HashMap<u64, f64>) {
        let active_jobs = jobs.len();
        let progress = if active_jobs == 0 {
            0.0
        } else {
            jobs.values().sum::<f64>() / active_jobs as f64
        };
        self.state.send_replace(UploadActivity {
            active_jobs,
            progress,
            blocking: active_jobs > 0,
        });
    }

    fn report(&self, id: u64, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let mut jobs = self.lock_jobs();
        if let Some(current) = jobs.get_mut(&id) {
            *current = current.max(fraction.clamp(0.0, 1.0));
            self.publish(&jobs);
        }
    }

    fn finish(&self, id: u64) {
        let mut jobs = self.lock_jobs();
        if jobs.remove(&id).is_none() {
            return;
        }
        let idle = jobs.is_empty();
        self.publish(&jobs);
        drop(jobs);
        if idle {
            self.sync_guard();
        }
    }

    /// Brings the unload guard in line with the job count.
    ///
    /// Hooks run without the jobs lock, so a hook may itself begin or end
    /// jobs. Only one thread runs hooks at a time; a caller that finds the
    /// hook lock taken leaves `guard_dirty` set and the holder re-checks.
    fn sync_guard(&self) {
        let Some(guard) = &self.guard else {
            return;
        };
        self.guard_dirty.store(true, Ordering::SeqCst);
        while self.guard_dirty.load(Ordering::SeqCst) {
            let mut installed = match self.guard_installed.try_lock() {
                Ok(installed) => installed,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            self.guard_dirty.store(false, Ordering::SeqCst);
            let busy = !self.lock_jobs().is_empty();
            if *installed != busy {
                *installed = busy;
                if busy {
                    guard.install();
                } else {
                    guard.remove();
                }
            }
        }
    }
}

/// Process-wide view of in-flight uploads.
///
/// Cloning shares the same state; create a fresh instance per test or per
/// host application.
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl Default for UploadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadCoordinator {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_unload_guard(guard: Arc<dyn UnloadGuard>) -> Self {
        Self::build(Some(guard))
    }

    fn build(guard: Option<Arc<dyn UnloadGuard>>) -> Self {
        let (state, _) = watch::channel(UploadActivity::default());
        Self {
            inner: Arc::new(CoordinatorInner {
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                state,
                guard,
                guard_installed: Mutex::new(false),
                guard_dirty: AtomicBool::new(false),
            }),
        }
    }

    pub fn begin_job(&self) -> JobHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut jobs = self.inner.lock_jobs();
        jobs.insert(id, 0.0);
        let active = jobs.len();
        self.inner.publish(&jobs);
        drop(jobs);
        if active == 1 {
            self.inner.sync_guard();
        }
        tracing::debug!("Upload job {} started ({} active)", id, active);

        JobHandle {
            id,
            inner: self.inner.clone(),
            ended: false,
        }
    }

    pub fn report_progress(&self, handle: &JobHandle, fraction: f64) {
        handle.report(fraction);
    }

    pub fn end_job(&self, handle: JobHandle) {
        handle.finish();
    }

    pub fn snapshot(&self) -> UploadActivity {
        *self.inner.state.borrow()
    }

    pub fn is_blocking(&self) -> bool {
        self.snapshot().blocking
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadActivity> {
        self.inner.state.subscribe()
    }

    /// Resolves once no job is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|activity| activity.active_jobs == 0).await;
    }
}

/// One registered upload job. Ends itself when dropped, so failures, early
/// returns and detached callers all leave the counters balanced.
pub struct JobHandle {
    id: u64,
    inner: Arc<CoordinatorInner>,
    ended: bool,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Progress for this job; values below the last report are ignored.
    pub fn report(&self, fraction: f64) {
        self.inner.report(self.id, fraction);
    }

    pub fn finish(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            self.inner.finish(self.id);
            tracing::debug!("Upload job {} ended", self.id);
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.end();
    }
}
