//! Process-wide configuration for parallel apply.
//!
//! [`Settings`] carries every knob the engine reads: the requested worker count,
//! the minimum unit size, the per-worker unit ceiling, progress display, the
//! rolling-restart bound and the pool implementation. Values come from three
//! layers, later ones winning:
//!
//! 1. [`Settings::default`]
//! 2. `PARAPPLY_*` environment variables ([`Settings::from_env`])
//! 3. an explicit value installed with [`init`] (last write wins)
//!
//! Every entry point also accepts a `&Settings` directly; the global slot only
//! exists so applications can configure the engine once at start-up.
//!
//! # Example
//!
//! ```
//! use parapply::settings::{self, Settings, Workers};
//!
//! settings::init(Settings {
//!     workers: Workers::Fixed(2),
//!     unit_min_size: 10,
//!     show_progress: false,
//!     ..Settings::default()
//! });
//! assert_eq!(settings::current().unit_min_size, 10);
//! ```

use crate::error::ApplyError;
use anyhow::Result;
use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use std::sync::{LazyLock, RwLock};

/// Minimum number of rows/columns per unit before it is worth going multi-core.
pub const DEFAULT_UNIT_MIN_SIZE: usize = 100;
/// Upper bound on units handed to each worker.
pub const DEFAULT_MAX_UNITS_PER_WORKER: usize = 8;
/// Units a pooled worker processes before it is replaced.
pub const DEFAULT_MAX_TASKS_PER_WORKER: usize = 4;
/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PARAPPLY_";

/// Requested worker count.
///
/// Serialized as a plain integer where any value `< 1` means [`Workers::Auto`],
/// so `PARAPPLY_WORKERS=-1` and `PARAPPLY_WORKERS=8` both parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Workers {
    /// Use every usable CPU.
    #[default]
    Auto,
    /// Use exactly this many workers (may still be lowered to the unit count).
    Fixed(usize),
}

impl Workers {
    /// Map a signed request onto [`Workers`]; non-positive values mean auto.
    pub fn from_requested(n: i64) -> Self {
        if n < 1 { Workers::Auto } else { Workers::Fixed(n as usize) }
    }
}

impl From<i64> for Workers {
    fn from(n: i64) -> Self {
        Workers::from_requested(n)
    }
}

impl From<Workers> for i64 {
    fn from(w: Workers) -> Self {
        match w {
            Workers::Auto => -1,
            Workers::Fixed(n) => n as i64,
        }
    }
}

/// Which worker-pool implementation backs multi-worker runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Dedicated OS threads, recycled after `max_tasks_per_worker` units.
    #[default]
    Threads,
    /// A private rayon thread pool. Workers are not recycled.
    Rayon,
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum workers to spawn; lowered to the number of units when fewer.
    pub workers: Workers,
    /// Minimum rows/columns per unit. `1` lets `max_units_per_worker` decide.
    pub unit_min_size: usize,
    /// Ceiling on units per worker; `0` disables the ceiling.
    pub max_units_per_worker: usize,
    /// Render a progress bar while results are collected.
    pub show_progress: bool,
    /// Rolling-restart bound for pooled workers.
    pub max_tasks_per_worker: usize,
    /// Pool implementation for multi-worker runs.
    pub pool: PoolKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: Workers::Auto,
            unit_min_size: DEFAULT_UNIT_MIN_SIZE,
            max_units_per_worker: DEFAULT_MAX_UNITS_PER_WORKER,
            show_progress: true,
            max_tasks_per_worker: DEFAULT_MAX_TASKS_PER_WORKER,
            pool: PoolKind::Threads,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `PARAPPLY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that cannot drive a capacity plan or a pool.
    pub fn validate(&self) -> Result<()> {
        if self.unit_min_size == 0 {
            return Err(ApplyError::InvalidSettings("unit_min_size must be at least 1".into()).into());
        }
        if self.max_tasks_per_worker == 0 {
            return Err(
                ApplyError::InvalidSettings("max_tasks_per_worker must be at least 1".into()).into(),
            );
        }
        Ok(())
    }

    /// Same settings with an explicit worker count.
    pub fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    /// Same settings with progress display switched on or off.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

static GLOBAL: LazyLock<RwLock<Option<Settings>>> = LazyLock::new(|| RwLock::new(None));

/// Install process-wide settings. Subsequent calls overwrite earlier ones.
pub fn init(settings: Settings) {
    let mut slot = GLOBAL.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(settings);
}

/// Current process-wide settings.
///
/// Falls back to [`Settings::from_env`] (and then to defaults, with a warning,
/// if the environment is malformed) until [`init`] is called.
pub fn current() -> Settings {
    if let Some(s) = GLOBAL.read().unwrap_or_else(|poisoned| poisoned.into_inner()).as_ref() {
        return s.clone();
    }
    let seeded = Settings::from_env().unwrap_or_else(|e| {
        tracing::warn!("ignoring malformed {ENV_PREFIX}* environment: {e:#}");
        Settings::default()
    });
    let mut slot = GLOBAL.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    slot.get_or_insert(seeded).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_roundtrip_through_signed_ints() {
        assert_eq!(Workers::from_requested(-1), Workers::Auto);
        assert_eq!(Workers::from_requested(0), Workers::Auto);
        assert_eq!(Workers::from_requested(3), Workers::Fixed(3));
        assert_eq!(i64::from(Workers::Auto), -1);
    }

    #[test]
    fn env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PARAPPLY_WORKERS", 3);
            jail.set_env("PARAPPLY_MAX_TASKS_PER_WORKER", 16);
            jail.set_env("PARAPPLY_POOL", "rayon");
            jail.set_env("PARAPPLY_SHOW_PROGRESS", "false");
            let s = Settings::from_env().map_err(|e| e.to_string())?;
            assert_eq!(s.workers, Workers::Fixed(3));
            assert_eq!(s.max_tasks_per_worker, 16);
            assert_eq!(s.pool, PoolKind::Rayon);
            assert!(!s.show_progress);
            assert_eq!(s.unit_min_size, DEFAULT_UNIT_MIN_SIZE);
            Ok(())
        });
    }

    #[test]
    fn zero_unit_size_is_rejected() {
        let s = Settings { unit_min_size: 0, ..Settings::default() };
        let err = s.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<ApplyError>(), Some(ApplyError::InvalidSettings(_))));
    }
}
