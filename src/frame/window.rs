//! Single-threaded rolling and expanding window evaluation.

use super::series::Series;
use super::table::Frame;
use crate::error::ApplyError;
use anyhow::{Result, bail};
use std::ops::Range;

/// Window shape applied around every row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSpec {
    /// Fixed-size window of `window` rows ending at (or, with `center`, centred on)
    /// the current row. `min_periods` defaults to `window`.
    Rolling { window: usize, min_periods: Option<usize>, center: bool },
    /// Every row from the start up to the current one.
    Expanding { min_periods: usize },
}

impl WindowSpec {
    pub fn rolling(window: usize) -> Self {
        WindowSpec::Rolling { window, min_periods: None, center: false }
    }

    pub fn expanding() -> Self {
        WindowSpec::Expanding { min_periods: 1 }
    }

    pub fn with_min_periods(self, min: usize) -> Self {
        match self {
            WindowSpec::Rolling { window, center, .. } => {
                WindowSpec::Rolling { window, min_periods: Some(min), center }
            }
            WindowSpec::Expanding { .. } => WindowSpec::Expanding { min_periods: min },
        }
    }

    pub fn centered(self) -> Self {
        match self {
            WindowSpec::Rolling { window, min_periods, .. } => {
                WindowSpec::Rolling { window, min_periods, center: true }
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let WindowSpec::Rolling { window: 0, .. } = self {
            bail!(ApplyError::InvalidSettings("rolling window must be at least 1".into()));
        }
        Ok(())
    }

    fn min_periods(&self) -> usize {
        match *self {
            WindowSpec::Rolling { window, min_periods, .. } => min_periods.unwrap_or(window),
            WindowSpec::Expanding { min_periods } => min_periods,
        }
    }

    /// Rows covered by the window at position `i` of `len`.
    fn bounds(&self, i: usize, len: usize) -> Range<usize> {
        match *self {
            WindowSpec::Rolling { window, center, .. } => {
                let end = if center { i + 1 + (window - 1) / 2 } else { i + 1 };
                let start = end.saturating_sub(window);
                start..end.min(len)
            }
            WindowSpec::Expanding { .. } => 0..i + 1,
        }
    }
}

/// Apply `f` over every window of `values`; windows with fewer than
/// `min_periods` non-NaN observations yield `NaN`.
pub fn window_values<F>(values: &[f64], spec: &WindowSpec, f: &F) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> Result<f64> + ?Sized,
{
    spec.validate()?;
    let min = spec.min_periods();
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let w = &values[spec.bounds(i, values.len())];
        let observed = w.iter().filter(|v| !v.is_nan()).count();
        out.push(if observed >= min.max(1) { f(w)? } else { f64::NAN });
    }
    Ok(out)
}

impl Series {
    pub fn window_apply<F>(&self, spec: &WindowSpec, f: &F) -> Result<Series>
    where
        F: Fn(&[f64]) -> Result<f64> + ?Sized,
    {
        Ok(Series {
            index: self.index.clone(),
            values: window_values(&self.values, spec, f)?,
            name: self.name.clone(),
        })
    }
}

impl Frame {
    /// Window every column independently.
    pub fn window_apply<F>(&self, spec: &WindowSpec, f: &F) -> Result<Frame>
    where
        F: Fn(&[f64]) -> Result<f64> + ?Sized,
    {
        let data = (0..self.ncols())
            .map(|j| window_values(self.column_values(j), spec, f))
            .collect::<Result<Vec<_>>>()?;
        let mut out = Frame::new(self.index.clone(), self.columns.clone(), data)?;
        out.index_names = self.index_names.clone();
        Ok(out)
    }
}
