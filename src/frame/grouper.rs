use super::label::Label;
use super::output::{Applied, Output};
use super::series::Series;
use super::table::Frame;
use crate::error::ApplyError;
use crate::executor::Executor;
use crate::groupby::{Group, Grouping, apply_groupwise};
use crate::partition::{Axis, Partitioned, Reassemble};
use anyhow::{Result, bail};
use std::collections::BTreeMap;

/// Groups rows by a per-row key, keys sorted ascending.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyGrouper {
    keys: Vec<Label>,
    positions: Vec<Vec<usize>>,
    names: Vec<String>,
}

impl KeyGrouper {
    /// Group rows by `row_keys[i]`, one entry per row.
    pub fn from_keys(row_keys: &[Label], names: Vec<String>) -> Self {
        let mut groups: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
        for (pos, key) in row_keys.iter().enumerate() {
            groups.entry(key.clone()).or_default().push(pos);
        }
        let (keys, positions) = groups.into_iter().unzip();
        Self { keys, positions, names }
    }

    /// Group the rows of `frame` by the values of `column`.
    pub fn by_column(frame: &Frame, column: &Label) -> Result<Self> {
        let Some(col) = frame.position_of(column) else {
            bail!(ApplyError::Shape(format!("no column {column} to group by")));
        };
        let keys: Vec<Label> = frame.column_values(col).iter().map(|&v| Label::from_value(v)).collect();
        Ok(Self::from_keys(&keys, vec![column.to_string()]))
    }

    pub fn keys(&self) -> &[Label] {
        &self.keys
    }
}

impl Grouping for KeyGrouper {
    type Key = Label;

    fn ngroups(&self) -> usize {
        self.keys.len()
    }

    fn key(&self, i: usize) -> &Label {
        &self.keys[i]
    }

    fn positions(&self, i: usize) -> &[usize] {
        &self.positions[i]
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

/// A frame grouped by one of its columns.
///
/// The grouping column itself is not part of the rows handed to the function.
#[derive(Clone, Debug)]
pub struct GroupBy {
    frame: Frame,
    grouper: KeyGrouper,
}

impl GroupBy {
    pub fn new(frame: &Frame, by: impl Into<Label>) -> Result<Self> {
        let by = by.into();
        let grouper = KeyGrouper::by_column(frame, &by)?;
        Ok(Self { frame: frame.drop_column(&by)?, grouper })
    }

    /// Group `frame` with an existing grouper (row keys supplied externally).
    pub fn with_grouper(frame: Frame, grouper: KeyGrouper) -> Self {
        Self { frame, grouper }
    }

    pub fn grouper(&self) -> &KeyGrouper {
        &self.grouper
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Single-threaded reference implementation.
    pub fn apply<F>(&self, f: F) -> Result<Output>
    where
        F: Fn(&Group<Label, Frame>) -> Result<Applied>,
    {
        if self.grouper.is_empty() {
            f(&Group::unnamed(self.frame.take(&[])))?;
            return self.combine(Vec::new(), false);
        }
        let mut results = Vec::with_capacity(self.grouper.ngroups());
        let mut mutated = false;
        for i in 0..self.grouper.ngroups() {
            let group = Group::new(self.grouper.key(i).clone(), self.frame.take(self.grouper.positions(i)));
            let res = f(&group)?;
            if !crate::groupby::IndexLike::is_indexed_like(&res, group.data()) {
                mutated = true;
            }
            results.push(res);
        }
        self.combine(results, mutated)
    }

    /// Group-wise apply with one unit per group, run on the executor.
    pub fn par_apply<F>(&self, executor: &Executor, f: F) -> Result<Output>
    where
        F: Fn(&Group<Label, Frame>) -> Result<Applied> + Send + Sync + 'static,
    {
        let (results, mutated) = apply_groupwise(&self.frame, &self.grouper, executor, f)?;
        self.combine(results, mutated)
    }

    /// Combine per-group results:
    /// scalars become a series keyed by group, series become one row per group,
    /// frames are stacked under `(key, row)` labels when any group was mutated
    /// and put back in original row order otherwise.
    fn combine(&self, results: Vec<Applied>, mutated: bool) -> Result<Output> {
        let keys = self.grouper.keys().to_vec();
        if results.is_empty() {
            let empty = Frame::new(Vec::new(), self.frame.columns.clone(), vec![Vec::new(); self.frame.ncols()])?;
            return Ok(Output::Frame(empty));
        }

        if results.iter().all(|r| matches!(r, Applied::Scalar(_))) {
            let values = results
                .into_iter()
                .map(|r| if let Applied::Scalar(v) = r { v } else { f64::NAN })
                .collect();
            return Ok(Output::Series(Series::new(keys, values, None)?));
        }

        if results.iter().all(|r| matches!(r, Applied::Series(_))) {
            let series: Vec<Series> = results
                .into_iter()
                .filter_map(|r| if let Applied::Series(s) = r { Some(s) } else { None })
                .collect();
            let columns = series[0].index.clone();
            if series.iter().any(|s| s.index != columns) {
                bail!(ApplyError::Shape("group results do not share an index".into()));
            }
            let rows = series.into_iter().map(|s| s.values).collect();
            let mut frame = Frame::from_rows(keys, columns, rows)?;
            frame.index_names = self.grouper.names().iter().cloned().map(Some).collect();
            return Ok(Output::Frame(frame));
        }

        if results.iter().all(|r| matches!(r, Applied::Frame(_))) {
            let frames: Vec<Frame> = results
                .into_iter()
                .filter_map(|r| if let Applied::Frame(f) = r { Some(f) } else { None })
                .collect();
            if mutated {
                let keyed = frames
                    .into_iter()
                    .zip(&keys)
                    .map(|(mut f, key)| {
                        f.index = f.index.iter().map(|row| Label::join(key, row)).collect();
                        let names = self.grouper.names().iter().cloned().map(Some);
                        f.index_names = names.chain(f.index_names).collect();
                        f
                    })
                    .collect();
                return Ok(Output::Frame(Frame::concat(keyed, Axis::Index)?));
            }
            let stacked = Frame::concat(frames, Axis::Index)?;
            // restore original row order
            let order: Vec<usize> = (0..self.grouper.ngroups())
                .flat_map(|i| self.grouper.positions(i).iter().copied())
                .collect();
            let mut back = vec![0usize; order.len()];
            for (stacked_pos, &orig) in order.iter().enumerate() {
                back[orig] = stacked_pos;
            }
            return Ok(Output::Frame(stacked.take(&back)));
        }

        bail!(ApplyError::Shape("group results mix scalars, series and frames".into()))
    }
}
