use super::label::Label;
use super::output::{Applied, Output};
use super::series::Series;
use super::values_eq;
use crate::error::ApplyError;
use crate::executor::Executor;
use crate::partition::{Axis, Partitioned, Reassemble, Shaped, apply_chunked};
use anyhow::{Result, bail};
use std::ops::Range;
use std::sync::Arc;

/// A labelled two-dimensional table of `f64` values, stored column by column.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: Vec<Label>,
    pub columns: Vec<Label>,
    /// One name per index level; `None` for unnamed levels.
    pub index_names: Vec<Option<String>>,
    data: Vec<Vec<f64>>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.columns == other.columns
            && self.index_names == other.index_names
            && self.data.len() == other.data.len()
            && self.data.iter().zip(&other.data).all(|(a, b)| values_eq(a, b))
    }
}

impl Frame {
    /// Build from column vectors; every column must have `index.len()` values.
    pub fn new(index: Vec<Label>, columns: Vec<Label>, data: Vec<Vec<f64>>) -> Result<Self> {
        if columns.len() != data.len() {
            bail!(ApplyError::Shape(format!(
                "{} column labels for {} columns",
                columns.len(),
                data.len()
            )));
        }
        if let Some(bad) = data.iter().position(|c| c.len() != index.len()) {
            bail!(ApplyError::Shape(format!(
                "column {} has {} values, index has {}",
                columns[bad],
                data[bad].len(),
                index.len()
            )));
        }
        Ok(Self { index, columns, index_names: vec![None], data })
    }

    /// Build from row vectors.
    pub fn from_rows(index: Vec<Label>, columns: Vec<Label>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            bail!(ApplyError::Shape(format!(
                "row {bad} has {} values for {} columns",
                rows[bad].len(),
                columns.len()
            )));
        }
        let data = (0..columns.len()).map(|j| rows.iter().map(|r| r[j]).collect()).collect();
        Self::new(index, columns, data)
    }

    /// Named columns over a default `0..n` index.
    pub fn from_columns<L: Into<Label>>(columns: Vec<(L, Vec<f64>)>) -> Result<Self> {
        let n = columns.first().map_or(0, |(_, v)| v.len());
        let (labels, data): (Vec<Label>, Vec<Vec<f64>>) =
            columns.into_iter().map(|(l, v)| (l.into(), v)).unzip();
        Self::new(Label::range(n), labels, data)
    }

    /// One column per series; all series must share an index.
    pub fn from_series_columns(series: Vec<Series>) -> Result<Self> {
        let index = series.first().map(|s| s.index.clone()).unwrap_or_default();
        if series.iter().any(|s| s.index != index) {
            bail!(ApplyError::Shape("series do not share an index".into()));
        }
        let columns = series
            .iter()
            .enumerate()
            .map(|(i, s)| s.name.clone().unwrap_or(Label::Int(i as i64)))
            .collect();
        let data = series.into_iter().map(|s| s.values).collect();
        Self::new(index, columns, data)
    }

    /// `(rows, columns)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.data[col][row]
    }

    pub fn column_values(&self, col: usize) -> &[f64] {
        &self.data[col]
    }

    /// Column `col` as a series named after its label.
    pub fn column(&self, col: usize) -> Series {
        Series {
            index: self.index.clone(),
            values: self.data[col].clone(),
            name: Some(self.columns[col].clone()),
        }
    }

    /// Row `row` as a series indexed by the column labels.
    pub fn row(&self, row: usize) -> Series {
        Series {
            index: self.columns.clone(),
            values: self.data.iter().map(|c| c[row]).collect(),
            name: Some(self.index[row].clone()),
        }
    }

    pub fn position_of(&self, column: &Label) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Frame without `column`.
    pub fn drop_column(&self, column: &Label) -> Result<Frame> {
        let Some(pos) = self.position_of(column) else {
            bail!(ApplyError::Shape(format!("no column {column}")));
        };
        let mut out = self.clone();
        out.columns.remove(pos);
        out.data.remove(pos);
        Ok(out)
    }

    /// Apply `f` to every column ([`Axis::Index`]) or row ([`Axis::Columns`]) on
    /// the calling thread.
    ///
    /// Scalar results form a series; series results form a frame whose other
    /// axis is the returned series' index.
    pub fn apply<F>(&self, axis: Axis, f: F) -> Result<Output>
    where
        F: Fn(&Series) -> Result<Applied>,
    {
        let (n, outer) = match axis {
            Axis::Index => (self.ncols(), &self.columns),
            Axis::Columns => (self.nrows(), &self.index),
        };
        let mut results = Vec::with_capacity(n);
        for i in 0..n {
            let s = match axis {
                Axis::Index => self.column(i),
                Axis::Columns => self.row(i),
            };
            results.push(f(&s)?);
        }

        if results.iter().all(|r| matches!(r, Applied::Scalar(_))) {
            let values = results
                .into_iter()
                .map(|r| match r {
                    Applied::Scalar(v) => v,
                    _ => f64::NAN,
                })
                .collect();
            return Ok(Output::Series(Series { index: outer.clone(), values, name: None }));
        }

        let mut series = Vec::with_capacity(n);
        for r in results {
            match r {
                Applied::Series(s) => series.push(s),
                Applied::Scalar(_) => {
                    bail!(ApplyError::Shape("function mixed scalar and series results".into()))
                }
                Applied::Frame(_) => {
                    bail!(ApplyError::Shape("row/column functions cannot return frames".into()))
                }
            }
        }
        let inner = series[0].index.clone();
        if series.iter().any(|s| s.index != inner) {
            bail!(ApplyError::Shape("returned series do not share an index".into()));
        }
        let frame = match axis {
            Axis::Index => Frame::new(inner, outer.clone(), series.into_iter().map(|s| s.values).collect())?,
            Axis::Columns => Frame::from_rows(
                outer.clone(),
                inner,
                series.into_iter().map(|s| s.values).collect(),
            )?,
        };
        Ok(Output::Frame(frame))
    }

    /// [`apply`](Self::apply) split into chunks and run on the executor.
    ///
    /// The result equals `self.apply(axis, f)` element for element.
    pub fn par_apply<F>(&self, axis: Axis, executor: &Executor, f: F) -> Result<Output>
    where
        F: Fn(&Series) -> Result<Applied> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        apply_chunked(self, axis, executor, move |chunk: Frame, axis| chunk.apply(axis, |s| f(s)))
    }

    fn check_index_names(parts: &[Frame]) -> Vec<Option<String>> {
        let first = parts[0].index_names.clone();
        if parts.iter().all(|p| p.index_names == first) { first } else { vec![None; first.len()] }
    }
}

impl Shaped for Frame {
    fn ndim(&self) -> usize {
        2
    }

    fn len_along(&self, axis: Axis) -> usize {
        match axis {
            Axis::Index => self.nrows(),
            Axis::Columns => self.ncols(),
        }
    }
}

impl Partitioned for Frame {
    fn slice(&self, axis: Axis, range: Range<usize>) -> Self {
        match axis {
            Axis::Index => Frame {
                index: self.index[range.clone()].to_vec(),
                columns: self.columns.clone(),
                index_names: self.index_names.clone(),
                data: self.data.iter().map(|c| c[range.clone()].to_vec()).collect(),
            },
            Axis::Columns => Frame {
                index: self.index.clone(),
                columns: self.columns[range.clone()].to_vec(),
                index_names: self.index_names.clone(),
                data: self.data[range].to_vec(),
            },
        }
    }

    fn take(&self, positions: &[usize]) -> Self {
        Frame {
            index: positions.iter().map(|&p| self.index[p].clone()).collect(),
            columns: self.columns.clone(),
            index_names: self.index_names.clone(),
            data: self.data.iter().map(|c| positions.iter().map(|&p| c[p]).collect()).collect(),
        }
    }
}

impl Reassemble for Frame {
    fn concat(parts: Vec<Self>, axis: Axis) -> Result<Self> {
        if parts.is_empty() {
            bail!(ApplyError::Shape("nothing to concatenate".into()));
        }
        let index_names = Frame::check_index_names(&parts);
        match axis {
            Axis::Index => {
                let columns = parts[0].columns.clone();
                if parts.iter().any(|p| p.columns != columns) {
                    bail!(ApplyError::Shape("frames do not share columns".into()));
                }
                let mut data = vec![Vec::new(); columns.len()];
                let mut index = Vec::new();
                for p in parts {
                    index.extend(p.index);
                    for (acc, col) in data.iter_mut().zip(p.data) {
                        acc.extend(col);
                    }
                }
                Ok(Frame { index, columns, index_names, data })
            }
            Axis::Columns => {
                let index = parts[0].index.clone();
                if parts.iter().any(|p| p.index != index) {
                    bail!(ApplyError::Shape("frames do not share an index".into()));
                }
                let mut columns = Vec::new();
                let mut data = Vec::new();
                for p in parts {
                    columns.extend(p.columns);
                    data.extend(p.data);
                }
                Ok(Frame { index, columns, index_names, data })
            }
        }
    }
}
