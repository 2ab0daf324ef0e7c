use super::label::Label;
use super::series::Series;
use super::table::Frame;
use crate::error::ApplyError;
use crate::groupby::IndexLike;
use crate::partition::{Axis, Reassemble, Shaped};
use anyhow::{Result, bail};

/// What a user function returns for one row, column or group.
#[derive(Clone, Debug, PartialEq)]
pub enum Applied {
    Scalar(f64),
    Series(Series),
    Frame(Frame),
}

impl From<f64> for Applied {
    fn from(v: f64) -> Self {
        Applied::Scalar(v)
    }
}

impl From<Series> for Applied {
    fn from(s: Series) -> Self {
        Applied::Series(s)
    }
}

impl From<Frame> for Applied {
    fn from(f: Frame) -> Self {
        Applied::Frame(f)
    }
}

impl IndexLike<Frame> for Applied {
    fn is_indexed_like(&self, input: &Frame) -> bool {
        match self {
            // a reduction never lines up with a two-dimensional group
            Applied::Scalar(_) | Applied::Series(_) => false,
            Applied::Frame(f) => f.index == input.index,
        }
    }
}

/// Result of applying a function over a whole table: a reduction ([`Output::Series`])
/// or a same-shaped transform ([`Output::Frame`]).
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Series(Series),
    Frame(Frame),
}

impl Output {
    pub fn as_series(&self) -> Option<&Series> {
        match self {
            Output::Series(s) => Some(s),
            Output::Frame(_) => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Output::Frame(f) => Some(f),
            Output::Series(_) => None,
        }
    }

    pub fn into_series(self) -> Result<Series> {
        match self {
            Output::Series(s) => Ok(s),
            Output::Frame(_) => bail!(ApplyError::Shape("expected a series, got a frame".into())),
        }
    }

    pub fn into_frame(self) -> Result<Frame> {
        match self {
            Output::Frame(f) => Ok(f),
            Output::Series(_) => bail!(ApplyError::Shape("expected a frame, got a series".into())),
        }
    }

    /// Row labels of the result.
    pub fn index(&self) -> &[Label] {
        match self {
            Output::Series(s) => &s.index,
            Output::Frame(f) => &f.index,
        }
    }
}

impl Shaped for Output {
    fn ndim(&self) -> usize {
        match self {
            Output::Series(s) => s.ndim(),
            Output::Frame(f) => f.ndim(),
        }
    }

    fn len_along(&self, axis: Axis) -> usize {
        match self {
            Output::Series(s) => s.len_along(axis),
            Output::Frame(f) => f.len_along(axis),
        }
    }
}

impl Reassemble for Output {
    fn concat(parts: Vec<Self>, axis: Axis) -> Result<Self> {
        if parts.iter().all(|p| matches!(p, Output::Series(_))) {
            let series: Vec<Series> = parts.into_iter().filter_map(|p| p.into_series().ok()).collect();
            return match axis {
                Axis::Index => Ok(Output::Series(Series::concat(series, Axis::Index)?)),
                Axis::Columns => Ok(Output::Frame(Frame::from_series_columns(series)?)),
            };
        }
        if parts.iter().all(|p| matches!(p, Output::Frame(_))) {
            let frames: Vec<Frame> = parts.into_iter().filter_map(|p| p.into_frame().ok()).collect();
            return Ok(Output::Frame(Frame::concat(frames, axis)?));
        }
        bail!(ApplyError::Shape("cannot concatenate series and frames together".into()))
    }
}
