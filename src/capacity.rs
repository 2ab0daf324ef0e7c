//! Worker and partition sizing.
//!
//! The estimator answers two questions for every call: how many units should
//! the input be split into, and how many workers should process them. Both
//! decisions are derived from the length of the split axis and the active
//! [`Settings`]; nothing here is persisted between calls apart from the CPU
//! counts, which are detected once per process.

use crate::settings::{Settings, Workers};
use anyhow::Result;
use std::sync::LazyLock;

/// `min(physical + 1, logical)`, detected once.
static USABLE_CPUS: LazyLock<usize> =
    LazyLock::new(|| usable_cpus_from(num_cpus::get_physical(), num_cpus::get()));

/// Usable CPUs for this process.
///
/// One more than the physical core count so workers keep the machine busy while
/// the OS and the collecting thread take their share, but never more than the
/// logical core count.
pub fn usable_cpus() -> usize {
    *USABLE_CPUS
}

#[inline]
fn usable_cpus_from(physical: usize, logical: usize) -> usize {
    (physical + 1).min(logical).max(1)
}

/// Outcome of [`Capacity::plan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityPlan {
    /// Workers to spawn; never more than `units`.
    pub workers: usize,
    /// Units to split the input into; at least 1.
    pub units: usize,
}

impl CapacityPlan {
    /// True when the plan runs everything in-process.
    pub fn is_sequential(&self) -> bool {
        self.workers <= 1
    }
}

/// Capacity estimator bound to a CPU count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capacity {
    cpus: usize,
}

impl Capacity {
    /// Estimator for this machine.
    pub fn detect() -> Self {
        Self { cpus: usable_cpus() }
    }

    /// Estimator for a fixed CPU count (tests, containers with known quotas).
    pub fn with_cpus(cpus: usize) -> Self {
        Self { cpus: cpus.max(1) }
    }

    pub fn cpus(&self) -> usize {
        self.cpus
    }

    /// Resolve the requested worker count against the CPU budget and, when known,
    /// the number of units to process.
    ///
    /// Requests above the CPU budget are honoured. The executor logs them once
    /// per call (see [`is_oversubscribed`](Self::is_oversubscribed)).
    pub fn choose_workers(&self, units: Option<usize>, requested: Workers) -> usize {
        let mut workers = match requested {
            Workers::Auto => self.cpus,
            Workers::Fixed(n) => n,
        };
        // idle workers are pointless
        if let Some(units) = units {
            workers = workers.min(units);
        }
        workers.max(1)
    }

    /// Whether `requested` asks for more workers than there are usable CPUs.
    pub fn is_oversubscribed(&self, requested: Workers) -> bool {
        matches!(requested, Workers::Fixed(n) if n > self.cpus)
    }

    /// Number of units to split an axis of `axis_len` elements into.
    pub fn choose_units(&self, axis_len: usize, settings: &Settings) -> Result<usize> {
        settings.validate()?;
        let workers = match settings.workers {
            Workers::Auto => self.cpus,
            Workers::Fixed(n) => n,
        };

        // too little data per unit is not worth a worker
        let mut units = axis_len / settings.unit_min_size;
        if settings.max_units_per_worker > 0 {
            units = units.min(settings.max_units_per_worker.saturating_mul(workers));
        }
        if units < 1 || workers == 1 || self.cpus == 1 {
            units = 1;
        }
        Ok(units)
    }

    /// Full plan for splitting an axis of `axis_len` elements.
    pub fn plan(&self, axis_len: usize, settings: &Settings) -> Result<CapacityPlan> {
        let units = self.choose_units(axis_len, settings)?;
        let workers = self.choose_workers(Some(units), settings.workers);
        tracing::trace!(axis_len, units, workers, "capacity plan");
        Ok(CapacityPlan { workers, units })
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::detect()
    }
}
