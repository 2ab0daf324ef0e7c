//! Group-wise dispatch.
//!
//! Runs one function call per group on the [`Executor`] and reports whether any
//! group's result broke alignment with that group's rows (the *mutation flag*),
//! which is what a caller needs to decide between aligning results back onto
//! the original rows and stacking them under their group keys.
//!
//! The adapter drives the iteration itself: group rows are materialized one unit
//! at a time as the executor asks for more work, and each unit carries its
//! group's label so the function can tell which group it is looking at.

use crate::executor::Executor;
use crate::partition::Partitioned;
use anyhow::Result;
use std::ops::Deref;
use std::sync::Arc;

/// The grouping primitive: ordered group keys and the rows behind each.
pub trait Grouping {
    type Key: Clone + Send + 'static;

    /// Number of groups.
    fn ngroups(&self) -> usize;

    /// Key of group `i`, in result order.
    fn key(&self, i: usize) -> &Self::Key;

    /// Row positions of group `i`, in original order.
    fn positions(&self, i: usize) -> &[usize];

    /// Names of the grouping levels.
    fn names(&self) -> &[String];

    fn is_empty(&self) -> bool {
        self.ngroups() == 0
    }
}

/// Does a group's result keep the group's row labels?
pub trait IndexLike<D> {
    fn is_indexed_like(&self, input: &D) -> bool;
}

/// One group's rows bound to its label.
///
/// Dereferences to the rows. `name` is `None` only for the single call made on
/// an empty grouping.
#[derive(Clone, Debug)]
pub struct Group<K, D> {
    name: Option<K>,
    data: D,
}

impl<K, D> Group<K, D> {
    pub fn new(name: K, data: D) -> Self {
        Self { name: Some(name), data }
    }

    pub(crate) fn unnamed(data: D) -> Self {
        Self { name: None, data }
    }

    /// Label of the group being processed.
    pub fn name(&self) -> Option<&K> {
        self.name.as_ref()
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn into_inner(self) -> D {
        self.data
    }
}

impl<K, D> Deref for Group<K, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.data
    }
}

/// Apply `f` once per group of `data` and return the ordered results with the
/// mutation flag.
///
/// With zero groups, `f` is still called once, synchronously, on an empty slice
/// of `data`; its result is discarded but its error is returned, so invalid
/// functions fail the same way with or without groups.
pub fn apply_groupwise<D, G, R, F>(
    data: &D,
    grouping: &G,
    executor: &Executor,
    f: F,
) -> Result<(Vec<R>, bool)>
where
    D: Partitioned + Send + 'static,
    G: Grouping,
    R: IndexLike<D> + Send + 'static,
    F: Fn(&Group<G::Key, D>) -> Result<R> + Send + Sync + 'static,
{
    if grouping.is_empty() {
        tracing::debug!("no groups; probing function on an empty slice");
        f(&Group::unnamed(data.take(&[])))?;
        return Ok((Vec::new(), false));
    }

    let f = Arc::new(f);
    let units = (0..grouping.ngroups())
        .map(|i| Group::new(grouping.key(i).clone(), data.take(grouping.positions(i))));

    let applied = executor.run(
        move |group: Group<G::Key, D>| {
            let res = f(&group)?;
            let aligned = res.is_indexed_like(group.data());
            Ok((res, aligned))
        },
        units,
    )?;

    let mut mutated = false;
    let mut results = Vec::with_capacity(applied.len());
    for (res, aligned) in applied {
        mutated |= !aligned;
        results.push(res);
    }
    Ok((results, mutated))
}
