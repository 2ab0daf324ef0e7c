//! Grouped rolling/expanding windows, one unit per group.
//!
//! Each group's rows are selected only when the executor pulls the next unit,
//! so at most the in-flight groups are materialized at any time. The window is
//! rebuilt around the group's slice inside the worker and the per-group
//! results are stacked under a `(group key, row label)` index.
//!
//! # Example
//! ```
//! use parapply::frame::{Frame, Label, WindowSpec};
//! use parapply::window_groupby::WindowGroupBy;
//! use parapply::{Executor, Settings, Workers};
//!
//! let frame = Frame::from_columns(vec![
//!     ("g", vec![0.0, 0.0, 1.0, 1.0]),
//!     ("x", vec![1.0, 2.0, 3.0, 4.0]),
//! ])
//! .unwrap();
//! let rolled = WindowGroupBy::new(&frame, "g", WindowSpec::rolling(2)).unwrap();
//! let exec = Executor::new(Settings::default().with_workers(Workers::Fixed(2)).with_progress(false));
//! let out = rolled.par_apply(&exec, |w| Ok(w.iter().sum())).unwrap();
//! assert_eq!(out, rolled.apply(|w| Ok(w.iter().sum())).unwrap());
//! assert_eq!(out.index[1], Label::Tuple(vec![Label::Int(0), Label::Int(1)]));
//! ```

use crate::error::ApplyError;
use crate::executor::Executor;
use crate::frame::{Frame, KeyGrouper, Label, WindowSpec};
use crate::groupby::Grouping;
use crate::partition::{Axis, Partitioned, Reassemble};
use anyhow::{Result, bail};
use std::sync::Arc;

/// A frame grouped by one column with a window bound to every group.
#[derive(Clone, Debug)]
pub struct WindowGroupBy {
    frame: Frame,
    grouper: KeyGrouper,
    spec: WindowSpec,
    as_index: bool,
}

impl WindowGroupBy {
    /// Group `frame` by column `by` (excluded from the windowed values).
    pub fn new(frame: &Frame, by: impl Into<Label>, spec: WindowSpec) -> Result<Self> {
        spec.validate()?;
        let by = by.into();
        let grouper = KeyGrouper::by_column(frame, &by)?;
        Ok(Self { frame: frame.drop_column(&by)?, grouper, spec, as_index: true })
    }

    /// Window an already grouped frame.
    pub fn with_grouper(frame: Frame, grouper: KeyGrouper, spec: WindowSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { frame, grouper, spec, as_index: true })
    }

    /// Keep the group key as the outer index level (`true`, the default) or move
    /// it into leading columns named after the grouping levels.
    pub fn as_index(mut self, as_index: bool) -> Self {
        self.as_index = as_index;
        self
    }

    /// The window every group is rolled with.
    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Single-threaded reference implementation.
    pub fn apply<F>(&self, f: F) -> Result<Frame>
    where
        F: Fn(&[f64]) -> Result<f64>,
    {
        if self.grouper.is_empty() {
            return self.empty_result();
        }
        let mut parts = Vec::with_capacity(self.grouper.ngroups());
        for i in 0..self.grouper.ngroups() {
            let slice = self.frame.take(self.grouper.positions(i));
            parts.push((self.grouper.key(i).clone(), slice.window_apply(&self.spec, &f)?));
        }
        self.stack(parts)
    }

    /// Window every group on the executor and stack the results.
    ///
    /// An empty grouping is delegated to [`apply`](Self::apply), which already
    /// produces the right empty shape.
    pub fn par_apply<F>(&self, executor: &Executor, f: F) -> Result<Frame>
    where
        F: Fn(&[f64]) -> Result<f64> + Send + Sync + 'static,
    {
        if self.grouper.is_empty() {
            tracing::debug!("no groups; windowing on the calling thread");
            return self.apply(f);
        }

        let f = Arc::new(f);
        let spec = self.spec;
        let units = (0..self.grouper.ngroups())
            .map(|i| (self.grouper.key(i).clone(), self.frame.take(self.grouper.positions(i))));

        let parts = executor.run(
            move |(key, slice): (Label, Frame)| {
                let windowed = slice.window_apply(&spec, f.as_ref())?;
                Ok((key, windowed))
            },
            units,
        )?;
        self.stack(parts)
    }

    fn empty_result(&self) -> Result<Frame> {
        let empty = self.frame.take(&[]);
        if self.as_index {
            let mut empty = empty;
            empty.index_names = self.index_names();
            return Ok(empty);
        }
        let keys = self.key_frame(&[], &empty)?;
        Frame::concat(vec![keys, empty], Axis::Columns)
    }

    fn index_names(&self) -> Vec<Option<String>> {
        self.grouper
            .names()
            .iter()
            .cloned()
            .map(Some)
            .chain(self.frame.index_names.iter().cloned())
            .collect()
    }

    /// One column per grouping level, named after the level, holding `levels`
    /// on every row of `part`.
    fn key_frame(&self, levels: &[Label], part: &Frame) -> Result<Frame> {
        let names = self.grouper.names();
        if !levels.is_empty() && levels.len() != names.len() {
            bail!(ApplyError::Shape(format!(
                "group key has {} levels for {} grouping names",
                levels.len(),
                names.len()
            )));
        }
        let mut data = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let value = match levels.get(i) {
                Some(level) => level.as_value().ok_or_else(|| {
                    ApplyError::Shape(format!("group key {level} of {name} is not numeric"))
                })?,
                None => f64::NAN,
            };
            data.push(vec![value; part.nrows()]);
        }
        let columns = names.iter().map(|n| Label::from(n.as_str())).collect();
        let mut keys = Frame::new(part.index.clone(), columns, data)?;
        keys.index_names = part.index_names.clone();
        Ok(keys)
    }

    /// Concatenate per-group frames. Rows are labelled `(key…, row)`, or the
    /// key levels become leading columns when `as_index` is off.
    fn stack(&self, parts: Vec<(Label, Frame)>) -> Result<Frame> {
        let frames = parts
            .into_iter()
            .map(|(key, mut part)| {
                if self.as_index {
                    part.index = part.index.iter().map(|row| Label::join(&key, row)).collect();
                    part.index_names = self.index_names();
                    return Ok(part);
                }
                let keys = self.key_frame(&key.levels(), &part)?;
                Frame::concat(vec![keys, part], Axis::Columns)
            })
            .collect::<Result<Vec<_>>>()?;
        Frame::concat(frames, Axis::Index)
    }
}
