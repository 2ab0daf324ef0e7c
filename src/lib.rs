//! # Parapply
//!
//! A **parallel apply engine** for Rust. Parapply takes a function and a
//! collection of work units, fans the units out over a pool of worker threads
//! and gives the results back **in input order**, identical to what a plain
//! sequential loop would have produced.
//!
//! ## Key Features
//!
//! - **Order-preserving** - results come back in input order regardless of completion order
//! - **Fail-fast** - the first failing unit stops the work and its error is returned unchanged
//! - **Capacity planning** - worker and chunk counts derived from the input size and the machine
//! - **Sequential fallback** - small inputs run inline with no pool at all
//! - **Adapters** - chunked row/column apply, group-wise apply and grouped windows
//! - **Configurable** - defaults, `PARAPPLY_*` environment variables, or an explicit [`Settings`]
//!
//! ## Quick Start
//!
//! ```
//! use parapply::{Executor, Settings, Workers};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let exec = Executor::new(Settings::default().with_workers(Workers::Fixed(4)).with_progress(false));
//!
//! // Any iterator of units works, sized or not.
//! let lens = exec.run(|s: String| Ok(s.len()), vec!["a".to_string(), "bcd".to_string()])?;
//! assert_eq!(lens, vec![1, 3]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Executor
//!
//! [`Executor`] is the ordered, fail-fast map. [`Executor::imap`] yields lazily;
//! [`Executor::run`] collects. A [`CancelHandle`] stops an in-progress run.
//!
//! ### Capacity
//!
//! [`Capacity`] turns "how many units, how many workers requested" into a
//! [`CapacityPlan`]. Over-subscribing the machine is allowed but logged.
//!
//! ### Adapters
//!
//! - [`apply_chunked`] splits anything implementing [`Partitioned`] into
//!   contiguous chunks and concatenates the partial results.
//! - [`apply_groupwise`] runs one unit per group and reports whether any group
//!   changed its row labels.
//! - [`WindowGroupBy`] runs one rolling/expanding window computation per group.
//!
//! The [`frame`] module provides `Series`/`Frame` types wired up to all three.
//!
//! ```
//! use parapply::frame::{Applied, Frame};
//! use parapply::{Axis, Executor, Settings};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let frame = Frame::from_columns(vec![("a", vec![1.0, 2.0]), ("b", vec![3.0, 4.0])])?;
//! let exec = Executor::new(Settings::default().with_progress(false));
//! let sums = frame.par_apply(Axis::Columns, &exec, |row| Ok(Applied::Scalar(row.sum())))?;
//! assert_eq!(sums.into_series()?.values, vec![4.0, 6.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `progress` - progress bars through `indicatif` (default)
//! - `rayon-pool` - [`PoolKind::Rayon`] backed by a dedicated rayon thread pool (default)
//!
//! ## Module Overview
//!
//! - [`settings`] - configuration and the process-wide settings slot
//! - [`capacity`] - CPU detection, worker and unit count planning
//! - [`executor`] - the ordered parallel map
//! - [`pool`] - worker pools the executor drives
//! - [`partition`] - axis splitting and reassembly
//! - [`groupby`] - group-wise dispatch
//! - [`window_groupby`] - grouped window dispatch
//! - [`frame`] - labelled series and tables
//! - [`error`] - the error taxonomy

pub mod capacity;
pub mod error;
pub mod executor;
pub mod frame;
pub mod groupby;
pub mod partition;
pub mod pool;
pub mod progress;
pub mod settings;
pub mod window_groupby;

// General re-exports
pub use capacity::{Capacity, CapacityPlan, usable_cpus};
pub use error::ApplyError;
pub use executor::{CancelHandle, Executor, Results};
pub use groupby::{Group, Grouping, IndexLike, apply_groupwise};
pub use partition::{Axis, Partitioned, Reassemble, Shaped, apply_chunked, split_ranges};
pub use settings::{PoolKind, Settings, Workers};
pub use window_groupby::WindowGroupBy;
