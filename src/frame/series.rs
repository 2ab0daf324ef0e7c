use super::label::Label;
use super::values_eq;
use crate::error::ApplyError;
use crate::executor::Executor;
use crate::partition::{Axis, Partitioned, Reassemble, Shaped, apply_chunked};
use anyhow::{Result, bail};
use std::ops::Range;
use std::sync::Arc;

/// A labelled, one-dimensional sequence of `f64` values.
#[derive(Clone, Debug)]
pub struct Series {
    pub index: Vec<Label>,
    pub values: Vec<f64>,
    pub name: Option<Label>,
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.name == other.name && values_eq(&self.values, &other.values)
    }
}

impl Series {
    /// Build a series; `index` and `values` must have the same length.
    pub fn new(index: Vec<Label>, values: Vec<f64>, name: Option<Label>) -> Result<Self> {
        if index.len() != values.len() {
            bail!(ApplyError::Shape(format!(
                "index has {} labels but there are {} values",
                index.len(),
                values.len()
            )));
        }
        Ok(Self { index, values, name })
    }

    /// Series indexed `0..values.len()`.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { index: Label::range(values.len()), values, name: None }
    }

    pub fn with_name(mut self, name: impl Into<Label>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Arithmetic mean, `NaN` when empty.
    pub fn mean(&self) -> f64 {
        if self.is_empty() { f64::NAN } else { self.sum() / self.len() as f64 }
    }

    /// Sample variance (`ddof = 1`), `NaN` below two values.
    pub fn var(&self) -> f64 {
        let n = self.len();
        if n < 2 {
            return f64::NAN;
        }
        let mean = self.mean();
        self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    }

    /// Value at `label`, if present.
    pub fn get(&self, label: &Label) -> Option<f64> {
        self.index.iter().position(|l| l == label).map(|i| self.values[i])
    }

    /// Apply `f` to every element on the calling thread.
    pub fn apply<F>(&self, f: F) -> Result<Series>
    where
        F: Fn(f64) -> Result<f64>,
    {
        let values = self.values.iter().map(|&v| f(v)).collect::<Result<Vec<_>>>()?;
        Ok(Series { index: self.index.clone(), values, name: self.name.clone() })
    }

    /// Element-wise apply split into chunks and run on the executor.
    pub fn par_apply<F>(&self, executor: &Executor, f: F) -> Result<Series>
    where
        F: Fn(f64) -> Result<f64> + Send + Sync + 'static,
    {
        self.par_apply_axis(Axis::Index, executor, f)
    }

    /// Like [`par_apply`](Self::par_apply) with an explicit axis. Only
    /// [`Axis::Index`] is valid for a series; anything else fails before dispatch.
    pub fn par_apply_axis<F>(&self, axis: Axis, executor: &Executor, f: F) -> Result<Series>
    where
        F: Fn(f64) -> Result<f64> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        apply_chunked(self, axis, executor, move |chunk: Series, _| chunk.apply(|v| f(v)))
    }
}

impl Shaped for Series {
    fn ndim(&self) -> usize {
        1
    }

    fn len_along(&self, axis: Axis) -> usize {
        match axis {
            Axis::Index => self.len(),
            Axis::Columns => 1,
        }
    }
}

impl Partitioned for Series {
    fn slice(&self, _axis: Axis, range: Range<usize>) -> Self {
        Series {
            index: self.index[range.clone()].to_vec(),
            values: self.values[range].to_vec(),
            name: self.name.clone(),
        }
    }

    fn take(&self, positions: &[usize]) -> Self {
        Series {
            index: positions.iter().map(|&p| self.index[p].clone()).collect(),
            values: positions.iter().map(|&p| self.values[p]).collect(),
            name: self.name.clone(),
        }
    }
}

impl Reassemble for Series {
    fn concat(parts: Vec<Self>, axis: Axis) -> Result<Self> {
        if axis == Axis::Columns {
            bail!(ApplyError::Shape("series can only be concatenated along the index".into()));
        }
        let Some(first) = parts.first() else {
            bail!(ApplyError::Shape("nothing to concatenate".into()));
        };
        let name = first.name.clone();
        let total = parts.iter().map(Series::len).sum();
        let mut out = Series { index: Vec::with_capacity(total), values: Vec::with_capacity(total), name };
        for p in parts {
            if p.name != out.name {
                out.name = None;
            }
            out.index.extend(p.index);
            out.values.extend(p.values);
        }
        Ok(out)
    }
}
