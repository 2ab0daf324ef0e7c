use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row, column or group label.
///
/// `Tuple` holds one entry per level of a multi-level key, e.g. `(group, row)`
/// after a grouped window apply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Tuple(Vec<Label>),
}

impl Label {
    /// Label for a cell value: integral floats become [`Label::Int`].
    pub fn from_value(v: f64) -> Self {
        if v.fract() == 0.0 && v.is_finite() && v.abs() < i64::MAX as f64 {
            Label::Int(v as i64)
        } else {
            Label::Float(OrderedFloat(v))
        }
    }

    /// Cell value for a numeric label; `None` for strings and tuples.
    pub fn as_value(&self) -> Option<f64> {
        match self {
            Label::Int(i) => Some(*i as f64),
            Label::Float(x) => Some(x.0),
            Label::Str(_) | Label::Tuple(_) => None,
        }
    }

    /// `0..n` as integer labels.
    pub fn range(n: usize) -> Vec<Label> {
        (0..n as i64).map(Label::Int).collect()
    }

    /// Levels of this label; a non-tuple label is a single level.
    pub fn levels(&self) -> Vec<Label> {
        match self {
            Label::Tuple(parts) => parts.clone(),
            other => vec![other.clone()],
        }
    }

    /// Combine `outer` and `inner` levels into one tuple label.
    pub fn join(outer: &Label, inner: &Label) -> Label {
        let mut levels = outer.levels();
        levels.extend(inner.levels());
        Label::Tuple(levels)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{i}"),
            Label::Float(x) => write!(f, "{}", x.0),
            Label::Str(s) => f.write_str(s),
            Label::Tuple(parts) => {
                f.write_str("(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<i64> for Label {
    fn from(i: i64) -> Self {
        Label::Int(i)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Str(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label::Str(s)
    }
}
