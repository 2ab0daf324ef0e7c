//! Ordered, fail-fast parallel executor.
//!
//! [`Executor::imap`] applies a function to every unit of an input sequence on a
//! worker pool and yields the results **in input order**, whatever order the
//! workers finish in. [`Executor::run`] is the eager form used by the adapters.
//!
//! # Execution modes
//! - One resolved worker: units run inline on the calling thread, lazily, and
//!   no pool is created.
//! - Several workers: units are fed from the calling thread with a bounded
//!   number in flight, results come back in [`Outcome`] envelopes and are put
//!   back in order through a position-keyed buffer.
//!
//! # Failure
//! The first failing unit (in input order) terminates the pool; the iterator
//! yields that error and then ends. Errors returned by the user function are
//! passed through unchanged, so `downcast_ref` on the concrete error type keeps
//! working. Panics surface as [`ApplyError::WorkerPanicked`].
//!
//! # Cancellation
//! [`CancelHandle::cancel`] makes the iterator terminate the pool and yield
//! [`ApplyError::Cancelled`]. The flag is shared by every clone of the handle
//! and of the executor, and stays set until [`CancelHandle::reset`]: until then
//! every new call on that executor fails with [`ApplyError::Cancelled`].
//!
//! There are no timeouts: a unit that never returns blocks the call.
//!
//! # Example
//! ```
//! use parapply::{Executor, Settings, Workers};
//!
//! let exec = Executor::new(Settings::default().with_workers(Workers::Fixed(4)).with_progress(false));
//! let squares = exec.run(|x: u64| Ok(x * x), 0..100u64).unwrap();
//! assert_eq!(squares, (0..100u64).map(|x| x * x).collect::<Vec<_>>());
//! ```

use crate::capacity::Capacity;
use crate::error::ApplyError;
use crate::pool::{Outcome, UnitFn, WorkerPool, run_unit, spawn_pool};
use crate::progress::Progress;
use crate::settings::Settings;
use anyhow::Result;
use std::collections::BTreeMap;
use std::iter::Fuse;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long the collector waits on the pool before re-checking cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Units kept in flight per worker.
const INFLIGHT_PER_WORKER: usize = 2;

/// Cloneable cancellation flag shared with an [`Executor`].
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the next call runs normally.
    ///
    /// Streams that already observed the cancellation stay finished.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Exact length of an iterator if it advertises one.
///
/// Only an exact `size_hint` counts; anything else is treated as unsized.
pub fn known_len<I: Iterator>(iter: &I) -> Option<usize> {
    match iter.size_hint() {
        (lower, Some(upper)) if lower == upper => Some(lower),
        _ => None,
    }
}

/// Ordered parallel executor.
#[derive(Clone, Debug)]
pub struct Executor {
    settings: Settings,
    capacity: Capacity,
    cancel: CancelHandle,
}

impl Executor {
    pub fn new(settings: Settings) -> Self {
        Self { settings, capacity: Capacity::detect(), cancel: CancelHandle::new() }
    }

    /// Executor driven by the process-wide settings.
    pub fn from_global() -> Self {
        Self::new(crate::settings::current())
    }

    /// Replace the CPU budget used to resolve the worker count.
    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Share an existing cancellation flag.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Worker count this executor would use for `units` units.
    pub fn resolve_workers(&self, units: Option<usize>) -> usize {
        self.capacity.choose_workers(units, self.settings.workers)
    }

    /// Lazily apply `f` to each unit, yielding results in input order.
    pub fn imap<I, T, R, F>(&self, f: F, units: I) -> Result<Results<I::IntoIter, T, R>>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
    {
        let input = units.into_iter();
        let total = known_len(&input);
        if self.capacity.is_oversubscribed(self.settings.workers) {
            tracing::warn!(
                "Using more workers ({}) than is sensible ({}). For CPU-bound operations, \
                 consider lowering the worker count to avoid bottlenecks on the physical CPUs",
                i64::from(self.settings.workers),
                self.capacity.cpus()
            );
        }
        let workers = self.resolve_workers(total);
        let func: UnitFn<T, R> = Arc::new(f);
        tracing::debug!(workers, units = ?total, "dispatching units");

        let stage = if workers <= 1 {
            Stage::Inline { func, index: 0 }
        } else {
            let pool = spawn_pool(
                self.settings.pool,
                workers,
                self.settings.max_tasks_per_worker,
                func,
            )?;
            Stage::Pooled(Dispatch {
                pool,
                submitted: 0,
                next: 0,
                pending: BTreeMap::new(),
                max_inflight: workers * INFLIGHT_PER_WORKER,
                exhausted: false,
                failed_at: None,
                released: false,
            })
        };

        Ok(Results {
            input: input.fuse(),
            stage,
            progress: Progress::new(self.settings.show_progress, total),
            cancel: self.cancel.clone(),
            finished: false,
        })
    }

    /// Apply `f` to every unit and collect the ordered results.
    ///
    /// Partial results are discarded on failure.
    pub fn run<I, T, R, F>(&self, f: F, units: I) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
    {
        self.imap(f, units)?.collect()
    }
}

enum Stage<T, R> {
    Inline { func: UnitFn<T, R>, index: usize },
    Pooled(Dispatch<T, R>),
}

struct Dispatch<T, R> {
    pool: Box<dyn WorkerPool<T, R>>,
    submitted: usize,
    next: usize,
    pending: BTreeMap<usize, Outcome<R>>,
    max_inflight: usize,
    exhausted: bool,
    failed_at: Option<usize>,
    released: bool,
}

impl<T, R> Dispatch<T, R> {
    /// Keep the pool busy without running ahead of the collector.
    fn top_up<I: Iterator<Item = T>>(&mut self, input: &mut I) -> Result<()> {
        while !self.exhausted
            && self.failed_at.is_none()
            && self.submitted - self.next < self.max_inflight
        {
            match input.next() {
                Some(unit) => {
                    self.pool.submit(self.submitted, unit)?;
                    self.submitted += 1;
                }
                None => self.exhausted = true,
            }
        }
        Ok(())
    }

    fn terminate(&mut self) {
        if !self.released {
            self.pool.terminate();
            self.released = true;
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.pool.close();
            self.released = true;
        }
    }
}

/// Ordered result stream returned by [`Executor::imap`].
pub struct Results<I, T, R>
where
    I: Iterator<Item = T>,
{
    input: Fuse<I>,
    stage: Stage<T, R>,
    progress: Progress,
    cancel: CancelHandle,
    finished: bool,
}

impl<I, T, R> Results<I, T, R>
where
    I: Iterator<Item = T>,
{
    /// True when units are dispatched to a worker pool.
    pub fn is_pooled(&self) -> bool {
        matches!(self.stage, Stage::Pooled(_))
    }

    /// Workers processing this stream (1 when inline).
    pub fn workers(&self) -> usize {
        match &self.stage {
            Stage::Inline { .. } => 1,
            Stage::Pooled(d) => d.pool.workers(),
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> Option<Result<R>> {
        if let Stage::Pooled(d) = &mut self.stage {
            d.terminate();
        }
        self.progress.abandon();
        self.finished = true;
        Some(Err(err))
    }

    fn complete(&mut self) -> Option<Result<R>> {
        if let Stage::Pooled(d) = &mut self.stage {
            d.release();
        }
        self.progress.finish();
        self.finished = true;
        None
    }

    fn yield_outcome(&mut self, index: usize, outcome: Outcome<R>) -> Option<Result<R>> {
        match outcome.into_result(index) {
            Ok(r) => {
                self.progress.tick();
                Some(Ok(r))
            }
            Err(e) => self.fail(e),
        }
    }

    fn next_pooled(&mut self) -> Option<Result<R>> {
        loop {
            let Stage::Pooled(d) = &mut self.stage else { return None };
            if let Err(e) = d.top_up(&mut self.input) {
                return self.fail(e);
            }
            if d.exhausted && d.next == d.submitted {
                return self.complete();
            }
            if let Some(outcome) = d.pending.remove(&d.next) {
                let index = d.next;
                d.next += 1;
                return self.yield_outcome(index, outcome);
            }
            if self.cancel.is_cancelled() {
                return self.fail(ApplyError::Cancelled.into());
            }
            match d.pool.recv_timeout(POLL_INTERVAL) {
                Ok(Some(done)) => {
                    if !done.outcome.is_ok() {
                        // stop feeding; only earlier units are still awaited
                        let first = d.failed_at.map_or(done.index, |f| f.min(done.index));
                        d.failed_at = Some(first);
                    }
                    d.pending.insert(done.index, done.outcome);
                }
                Ok(None) => {}
                Err(e) => return self.fail(e),
            }
        }
    }
}

impl<I, T, R> Iterator for Results<I, T, R>
where
    I: Iterator<Item = T>,
{
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            return self.fail(ApplyError::Cancelled.into());
        }
        match &mut self.stage {
            Stage::Inline { func, index } => match self.input.next() {
                Some(unit) => {
                    let i = *index;
                    *index += 1;
                    let outcome = run_unit(func.as_ref(), unit);
                    self.yield_outcome(i, outcome)
                }
                None => self.complete(),
            },
            Stage::Pooled(_) => self.next_pooled(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let (_, hi) = self.input.size_hint();
        let in_flight = match &self.stage {
            Stage::Inline { .. } => 0,
            Stage::Pooled(d) => d.submitted - d.next,
        };
        // an error may cut the stream short
        (0, hi.map(|h| h + in_flight))
    }
}

impl<I, T, R> Drop for Results<I, T, R>
where
    I: Iterator<Item = T>,
{
    fn drop(&mut self) {
        if let Stage::Pooled(d) = &mut self.stage {
            // abandoned mid-stream: nothing will collect the outstanding units
            if !d.released {
                d.terminate();
            }
        }
    }
}
