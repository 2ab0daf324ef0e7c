//! Splitting a structured input into units and stitching results back.
//!
//! The adapter is written against three small traits so any tabular type can
//! plug in:
//! - [`Shaped`]: number of dimensions and length along an [`Axis`].
//! - [`Partitioned`]: contiguous slicing and row selection.
//! - [`Reassemble`]: axis-aware concatenation of partial results.
//!
//! [`apply_chunked`] is the whole pipeline: validate the axis, plan capacity,
//! split along the axis the function does *not* apply over, run every chunk on
//! the [`Executor`], and concatenate.
//!
//! # Choosing the concatenation axis
//! The decision looks at the partial results only, never at the function:
//! two-dimensional results whose lengths along the split axis add up to the
//! input's length along that axis preserved the split, so they are stitched back
//! along it; everything else (reductions, one-dimensional results) is stacked
//! along [`Axis::Index`].

use crate::capacity::CapacityPlan;
use crate::error::ApplyError;
use crate::executor::Executor;
use anyhow::Result;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Dimension of a table: rows ([`Axis::Index`], `0`) or columns ([`Axis::Columns`], `1`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Index,
    Columns,
}

impl Axis {
    /// The other axis.
    #[inline]
    pub fn other(self) -> Axis {
        match self {
            Axis::Index => Axis::Columns,
            Axis::Columns => Axis::Index,
        }
    }

    #[inline]
    pub fn number(self) -> usize {
        match self {
            Axis::Index => 0,
            Axis::Columns => 1,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Index => f.write_str("index"),
            Axis::Columns => f.write_str("columns"),
        }
    }
}

impl TryFrom<i64> for Axis {
    type Error = ApplyError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        match n {
            0 => Ok(Axis::Index),
            1 => Ok(Axis::Columns),
            other => Err(ApplyError::InvalidAxis(other.to_string())),
        }
    }
}

impl FromStr for Axis {
    type Err = ApplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" | "rows" | "0" => Ok(Axis::Index),
            "columns" | "1" => Ok(Axis::Columns),
            other => Err(ApplyError::InvalidAxis(other.to_string())),
        }
    }
}

/// Anything with a shape.
pub trait Shaped {
    /// `1` for a labelled sequence, `2` for a table.
    fn ndim(&self) -> usize;

    /// Number of elements along `axis`. One-dimensional values report `1`
    /// along [`Axis::Columns`].
    fn len_along(&self, axis: Axis) -> usize;
}

/// The partition primitive: contiguous, order-preserving slicing.
pub trait Partitioned: Shaped + Sized {
    /// Owned copy of the elements in `range` along `axis`.
    fn slice(&self, axis: Axis, range: Range<usize>) -> Self;

    /// Owned copy of the rows at `positions`, in that order.
    fn take(&self, positions: &[usize]) -> Self;

    /// Split into `n` contiguous pieces along `axis` (see [`split_ranges`]).
    fn split(&self, axis: Axis, n: usize) -> Vec<Self> {
        split_ranges(self.len_along(axis), n)
            .into_iter()
            .map(|r| self.slice(axis, r))
            .collect()
    }
}

/// The concatenation primitive.
pub trait Reassemble: Shaped + Sized {
    /// Concatenate `parts` (non-empty, in order) along `axis`.
    fn concat(parts: Vec<Self>, axis: Axis) -> Result<Self>;
}

/// `n` contiguous, non-overlapping ranges covering `0..len`.
///
/// The first `len % n` ranges are one element longer than the rest, so sizes
/// never differ by more than one. `n` is clamped to at least 1; ranges may be
/// empty when `n > len`.
pub fn split_ranges(len: usize, n: usize) -> Vec<Range<usize>> {
    let n = n.max(1);
    let base = len / n;
    let extra = len % n;
    let mut out = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        out.push(start..start + size);
        start += size;
    }
    out
}

/// Axis the input is split along when applying over `axis`.
///
/// Reject column-wise application on one-dimensional inputs before anything is
/// dispatched.
pub fn split_axis<D: Shaped>(data: &D, axis: Axis) -> Result<Axis> {
    if data.ndim() == 1 {
        if axis == Axis::Columns {
            return Err(ApplyError::SeriesAxis.into());
        }
        return Ok(Axis::Index);
    }
    Ok(axis.other())
}

/// Concatenation axis for `results` computed from `data` split along `split`.
pub fn concat_axis<D: Shaped, O: Shaped>(data: &D, split: Axis, results: &[O]) -> Axis {
    if data.ndim() < 2 || results.is_empty() || results.iter().any(|r| r.ndim() < 2) {
        return Axis::Index;
    }
    let covered: usize = results.iter().map(|r| r.len_along(split)).sum();
    if covered == data.len_along(split) { split } else { Axis::Index }
}

/// Split `data`, run `f` on every chunk with the executor, and reassemble.
///
/// `f` receives an owned chunk and the axis the caller asked to apply over.
pub fn apply_chunked<D, O, F>(data: &D, axis: Axis, executor: &Executor, f: F) -> Result<O>
where
    D: Partitioned + Send + 'static,
    O: Reassemble + Send + 'static,
    F: Fn(D, Axis) -> Result<O> + Send + Sync + 'static,
{
    let split = split_axis(data, axis)?;
    let plan = plan_for(data, split, executor)?;
    tracing::debug!(
        units = plan.units,
        workers = plan.workers,
        "applying over {axis} in chunks split along {split}"
    );

    let chunks = data.split(split, plan.units);
    let results = executor.run(move |chunk| f(chunk, axis), chunks)?;

    let along = concat_axis(data, split, &results);
    O::concat(results, along)
}

/// Capacity plan for splitting `data` along `split`.
pub fn plan_for<D: Shaped>(data: &D, split: Axis, executor: &Executor) -> Result<CapacityPlan> {
    executor.capacity().plan(data.len_along(split), executor.settings())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_input_and_differ_by_at_most_one() {
        let r = split_ranges(10, 3);
        assert_eq!(r, vec![0..4, 4..7, 7..10]);
        let r = split_ranges(201, 2);
        assert_eq!(r, vec![0..101, 101..201]);
        assert_eq!(split_ranges(5, 1), vec![0..5]);
        assert_eq!(split_ranges(0, 0), vec![0..0]);
    }

    #[test]
    fn more_pieces_than_elements_yields_empty_tails() {
        let r = split_ranges(2, 4);
        assert_eq!(r, vec![0..1, 1..2, 2..2, 2..2]);
    }

    #[test]
    fn axis_parsing() {
        assert_eq!("columns".parse::<Axis>().unwrap(), Axis::Columns);
        assert_eq!(Axis::try_from(0i64).unwrap(), Axis::Index);
        assert!(matches!(Axis::try_from(2i64), Err(ApplyError::InvalidAxis(_))));
        assert!("diagonal".parse::<Axis>().is_err());
    }
}
