//! Worker pools behind the executor.
//!
//! The executor only needs a narrow contract from a pool: accept an indexed
//! unit, hand back completed units (in any order), and shut down either
//! gracefully ([`WorkerPool::close`]) or immediately ([`WorkerPool::terminate`]).
//! Ordering is restored by the executor, never assumed from the pool.
//!
//! Two implementations are provided:
//! - [`RecyclingPool`]: dedicated OS threads fed through crossbeam channels. A
//!   worker retires after `max_tasks` units and hands its place to a fresh
//!   thread, which bounds whatever a long-lived worker would otherwise
//!   accumulate (thread-locals, allocator arenas, leaked caches).
//! - [`RayonPool`] (feature `rayon-pool`): a private rayon pool; workers live for
//!   the whole call.

use crate::error::ApplyError;
use crate::settings::PoolKind;
use anyhow::{Result, anyhow};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Shared, type-erased unit function.
pub type UnitFn<T, R> = Arc<dyn Fn(T) -> Result<R> + Send + Sync>;

/// Result-or-error envelope for one unit.
#[derive(Debug)]
pub enum Outcome<R> {
    Done(R),
    Failed(anyhow::Error),
    Panicked(String),
}

impl<R> Outcome<R> {
    /// Turn the envelope back into a `Result`, attributing panics to `index`.
    pub fn into_result(self, index: usize) -> Result<R> {
        match self {
            Outcome::Done(r) => Ok(r),
            Outcome::Failed(e) => Err(e),
            Outcome::Panicked(message) => Err(ApplyError::WorkerPanicked { index, message }.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

/// A finished unit tagged with its input position.
#[derive(Debug)]
pub struct Completed<R> {
    pub index: usize,
    pub outcome: Outcome<R>,
}

/// Run one unit, converting a panic into [`Outcome::Panicked`].
pub fn run_unit<T, R>(f: &(dyn Fn(T) -> Result<R> + Send + Sync), unit: T) -> Outcome<R> {
    match catch_unwind(AssertUnwindSafe(|| f(unit))) {
        Ok(Ok(r)) => Outcome::Done(r),
        Ok(Err(e)) => Outcome::Failed(e),
        Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Minimal pool contract used by the executor.
pub trait WorkerPool<T, R> {
    /// Number of workers the pool was sized to.
    fn workers(&self) -> usize;

    /// Queue `unit` for processing under input position `index`.
    fn submit(&mut self, index: usize, unit: T) -> Result<()>;

    /// Wait up to `timeout` for any completed unit.
    ///
    /// `Ok(None)` means nothing finished in time. An error means the pool can no
    /// longer make progress.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Completed<R>>>;

    /// Stop immediately: queued units are dropped and no worker is awaited.
    fn terminate(&mut self);

    /// Release the pool after all submitted work has been collected.
    fn close(&mut self);
}

/// Build the pool selected by `kind`.
pub fn spawn_pool<T, R>(
    kind: PoolKind,
    workers: usize,
    max_tasks: usize,
    func: UnitFn<T, R>,
) -> Result<Box<dyn WorkerPool<T, R>>>
where
    T: Send + 'static,
    R: Send + 'static,
{
    match kind {
        PoolKind::Threads => Ok(Box::new(RecyclingPool::new(workers, max_tasks, func)?)),
        #[cfg(feature = "rayon-pool")]
        PoolKind::Rayon => Ok(Box::new(RayonPool::new(workers, func)?)),
        #[cfg(not(feature = "rayon-pool"))]
        PoolKind::Rayon => {
            tracing::warn!("rayon pool requested but the `rayon-pool` feature is off; using threads");
            Ok(Box::new(RecyclingPool::new(workers, max_tasks, func)?))
        }
    }
}

/* ---------------- recycling thread pool ---------------- */

struct Shared<T, R> {
    jobs: Receiver<(usize, T)>,
    results: Sender<Completed<R>>,
    func: UnitFn<T, R>,
    max_tasks: usize,
    terminated: AtomicBool,
    alive: AtomicUsize,
    recycled: AtomicUsize,
    spawned: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Thread pool whose workers retire after a fixed number of units.
pub struct RecyclingPool<T, R> {
    jobs: Option<Sender<(usize, T)>>,
    results: Receiver<Completed<R>>,
    shared: Arc<Shared<T, R>>,
    workers: usize,
    closed: bool,
}

impl<T, R> RecyclingPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new(workers: usize, max_tasks: usize, func: UnitFn<T, R>) -> Result<Self> {
        let workers = workers.max(1);
        let (jobs_tx, jobs_rx) = channel::unbounded();
        let (results_tx, results_rx) = channel::unbounded();
        let shared = Arc::new(Shared {
            jobs: jobs_rx,
            results: results_tx,
            func,
            max_tasks: max_tasks.max(1),
            terminated: AtomicBool::new(false),
            alive: AtomicUsize::new(0),
            recycled: AtomicUsize::new(0),
            spawned: AtomicUsize::new(0),
            handles: Mutex::new(Vec::with_capacity(workers)),
        });

        tracing::debug!("Starting worker pool with {workers} workers (max {max_tasks} units each)");
        for _ in 0..workers {
            spawn_worker(&shared)?;
        }

        Ok(Self { jobs: Some(jobs_tx), results: results_rx, shared, workers, closed: false })
    }

    /// Workers that retired after reaching the per-worker unit bound.
    pub fn recycled(&self) -> usize {
        self.shared.recycled.load(Ordering::Relaxed)
    }
}

fn spawn_worker<T, R>(shared: &Arc<Shared<T, R>>) -> Result<()>
where
    T: Send + 'static,
    R: Send + 'static,
{
    let id = shared.spawned.fetch_add(1, Ordering::Relaxed);
    shared.alive.fetch_add(1, Ordering::SeqCst);
    let worker_shared = Arc::clone(shared);
    let spawned = std::thread::Builder::new()
        .name(format!("parapply-worker-{id}"))
        .spawn(move || worker_loop(worker_shared, id));
    match spawned {
        Ok(handle) => {
            shared.handles.lock().unwrap_or_else(|p| p.into_inner()).push(handle);
            Ok(())
        }
        Err(e) => {
            shared.alive.fetch_sub(1, Ordering::SeqCst);
            Err(anyhow!("failed to spawn worker thread: {e}"))
        }
    }
}

fn worker_loop<T, R>(shared: Arc<Shared<T, R>>, id: usize)
where
    T: Send + 'static,
    R: Send + 'static,
{
    let mut done = 0usize;
    while done < shared.max_tasks {
        let Ok((index, unit)) = shared.jobs.recv() else { break };
        if shared.terminated.load(Ordering::SeqCst) {
            break;
        }
        tracing::trace!(worker = id, index, "processing unit");
        let outcome = run_unit(shared.func.as_ref(), unit);
        if shared.results.send(Completed { index, outcome }).is_err() {
            break; // collector gone
        }
        done += 1;
    }

    // rolling restart: hand the slot to a fresh thread before leaving
    if done == shared.max_tasks && !shared.terminated.load(Ordering::SeqCst) {
        shared.recycled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(worker = id, "recycling worker after {done} units");
        if let Err(e) = spawn_worker(&shared) {
            tracing::warn!("{e:#}");
        }
    }
    shared.alive.fetch_sub(1, Ordering::SeqCst);
}

impl<T, R> WorkerPool<T, R> for RecyclingPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn workers(&self) -> usize {
        self.workers
    }

    fn submit(&mut self, index: usize, unit: T) -> Result<()> {
        let tx = self.jobs.as_ref().ok_or_else(|| anyhow!("worker pool already shut down"))?;
        tx.send((index, unit)).map_err(|_| anyhow!("worker pool job queue closed"))
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Completed<R>>> {
        match self.results.recv_timeout(timeout) {
            Ok(c) => Ok(Some(c)),
            Err(RecvTimeoutError::Timeout) => {
                if self.shared.alive.load(Ordering::SeqCst) == 0 && self.results.is_empty() {
                    return Err(anyhow!("worker pool has no live workers left"));
                }
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("worker pool disconnected")),
        }
    }

    fn terminate(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!("Terminating worker pool");
        self.shared.terminated.store(true, Ordering::SeqCst);
        self.jobs = None;
        // drop queued units now instead of when the last worker exits
        while self.shared.jobs.try_recv().is_ok() {}
        // running units cannot be interrupted; detach their threads
        self.shared.handles.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.closed = true;
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!("Releasing worker pool");
        self.jobs = None;
        loop {
            let next = self.shared.handles.lock().unwrap_or_else(|p| p.into_inner()).pop();
            let Some(handle) = next else { break };
            if handle.join().is_err() {
                tracing::warn!("worker thread exited abnormally");
            }
        }
        self.closed = true;
    }
}

impl<T, R> Drop for RecyclingPool<T, R> {
    fn drop(&mut self) {
        if !self.closed {
            self.shared.terminated.store(true, Ordering::SeqCst);
            self.jobs = None;
        }
    }
}

/* ---------------- rayon pool ---------------- */

/// Private rayon pool; units are spawned as independent jobs.
#[cfg(feature = "rayon-pool")]
pub struct RayonPool<T, R> {
    pool: Option<rayon::ThreadPool>,
    func: UnitFn<T, R>,
    results_tx: Sender<Completed<R>>,
    results_rx: Receiver<Completed<R>>,
    terminated: Arc<AtomicBool>,
    workers: usize,
}

#[cfg(feature = "rayon-pool")]
impl<T, R> RayonPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new(workers: usize, func: UnitFn<T, R>) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("parapply-rayon-{i}"))
            .build()?;
        let (results_tx, results_rx) = channel::unbounded();
        tracing::debug!("Starting rayon pool with {workers} workers");
        Ok(Self {
            pool: Some(pool),
            func,
            results_tx,
            results_rx,
            terminated: Arc::new(AtomicBool::new(false)),
            workers,
        })
    }
}

#[cfg(feature = "rayon-pool")]
impl<T, R> WorkerPool<T, R> for RayonPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn workers(&self) -> usize {
        self.workers
    }

    fn submit(&mut self, index: usize, unit: T) -> Result<()> {
        let pool = self.pool.as_ref().ok_or_else(|| anyhow!("worker pool already shut down"))?;
        let func = Arc::clone(&self.func);
        let tx = self.results_tx.clone();
        let terminated = Arc::clone(&self.terminated);
        pool.spawn(move || {
            if terminated.load(Ordering::SeqCst) {
                return;
            }
            let outcome = run_unit(func.as_ref(), unit);
            let _ = tx.send(Completed { index, outcome });
        });
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Completed<R>>> {
        match self.results_rx.recv_timeout(timeout) {
            Ok(c) => Ok(Some(c)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("worker pool disconnected")),
        }
    }

    fn terminate(&mut self) {
        if self.pool.is_some() {
            tracing::debug!("Terminating rayon pool");
        }
        self.terminated.store(true, Ordering::SeqCst);
        // dropping a rayon pool does not block; queued jobs see the flag and return
        self.pool = None;
    }

    fn close(&mut self) {
        if self.pool.take().is_some() {
            tracing::debug!("Releasing rayon pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn drain<R>(pool: &mut dyn WorkerPool<usize, R>, n: usize) -> BTreeMap<usize, Outcome<R>> {
        let mut out = BTreeMap::new();
        while out.len() < n {
            if let Some(c) = pool.recv_timeout(Duration::from_millis(50)).unwrap() {
                out.insert(c.index, c.outcome);
            }
        }
        out
    }

    #[test]
    fn recycling_pool_replaces_retired_workers() {
        let func: UnitFn<usize, usize> = Arc::new(|x| Ok(x * 2));
        let mut pool = RecyclingPool::new(2, 3, func).unwrap();
        for i in 0..20 {
            pool.submit(i, i).unwrap();
        }
        let out = drain(&mut pool, 20);
        pool.close();
        for (i, o) in out {
            assert_eq!(o.into_result(i).unwrap(), i * 2);
        }
        // 20 units with 3 per worker force at least 20 / 3 - 2 retirements
        assert!(pool.recycled() >= 4);
    }

    #[test]
    fn panics_are_captured_in_the_envelope() {
        let func: UnitFn<usize, usize> = Arc::new(|x| {
            if x == 1 {
                panic!("boom at one");
            }
            Ok(x)
        });
        let mut pool = RecyclingPool::new(2, 10, func).unwrap();
        pool.submit(0, 0).unwrap();
        pool.submit(1, 1).unwrap();
        let mut out = drain(&mut pool, 2);
        pool.close();
        let err = out.remove(&1).unwrap().into_result(1).unwrap_err();
        match err.downcast_ref::<ApplyError>() {
            Some(ApplyError::WorkerPanicked { index, message }) => {
                assert_eq!(*index, 1);
                assert!(message.contains("boom at one"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn terminate_drops_queued_units() {
        let func: UnitFn<usize, usize> = Arc::new(|x| {
            std::thread::sleep(Duration::from_millis(5));
            Ok(x)
        });
        let mut pool = RecyclingPool::new(1, 1000, func).unwrap();
        for i in 0..100 {
            pool.submit(i, i).unwrap();
        }
        pool.terminate();
        assert!(pool.submit(100, 100).is_err());
    }

    #[cfg(feature = "rayon-pool")]
    #[test]
    fn rayon_pool_completes_every_unit() {
        let func: UnitFn<usize, usize> = Arc::new(|x| Ok(x + 1));
        let mut pool = RayonPool::new(3, func).unwrap();
        for i in 0..30 {
            pool.submit(i, i).unwrap();
        }
        let out = drain(&mut pool, 30);
        pool.close();
        assert_eq!(out.len(), 30);
        assert!(out.into_iter().all(|(i, o)| o.into_result(i).unwrap() == i + 1));
    }
}
