//! A small labelled-table model the engine is driven against.
//!
//! [`Series`] and [`Frame`] implement the partitioning traits, so they can be
//! handed to [`apply_chunked`](crate::partition::apply_chunked); [`GroupBy`]
//! and [`WindowGroupBy`](crate::window_groupby::WindowGroupBy) dispatch one
//! unit per group. Every parallel method has a single-threaded counterpart
//! producing the same result.

mod grouper;
mod label;
mod output;
mod series;
mod table;
pub mod window;

pub use grouper::{GroupBy, KeyGrouper};
pub use label::Label;
pub use output::{Applied, Output};
pub use series::Series;
pub use table::Frame;
pub use window::WindowSpec;

/// Element-wise equality where `NaN == NaN`.
pub(crate) fn values_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
}
