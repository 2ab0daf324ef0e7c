use anyhow::{Result, bail};
use parapply::frame::{Applied, Frame, GroupBy, KeyGrouper, Label, Output, Series};
use parapply::{Axis, Executor, Group, Grouping, Partitioned, Settings, Workers, apply_groupwise};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, thiserror::Error)]
#[error("cannot aggregate column of this kind")]
struct InvalidDtype;

fn executor(workers: usize) -> Executor {
    Executor::new(Settings::default().with_workers(Workers::Fixed(workers)).with_progress(false))
}

/// `key` cycles through 0..groups, `x` is the row number.
fn keyed_frame(rows: usize, groups: usize) -> Frame {
    let keys = (0..rows).map(|i| ((i * 7) % groups) as f64).collect();
    let xs = (0..rows).map(|i| i as f64).collect();
    Frame::from_columns(vec![("key", keys), ("x", xs)]).unwrap()
}

#[test]
fn grouped_sum_matches_sequential() -> Result<()> {
    let frame = keyed_frame(300, 6);
    let grouped = GroupBy::new(&frame, "key")?;
    assert_eq!(grouped.grouper().ngroups(), 6);
    let sum = |g: &Group<Label, Frame>| -> Result<Applied> { Ok(Applied::Scalar(g.column(0).sum())) };

    let got = grouped.par_apply(&executor(4), sum)?;
    assert_eq!(got, grouped.apply(sum)?);

    let got = got.into_series()?;
    assert_eq!(got.index, Label::range(6));
    let total: f64 = got.values.iter().sum();
    assert_eq!(total, (0..300).map(f64::from).sum::<f64>());
    Ok(())
}

#[test]
fn group_name_is_visible_to_the_function() -> Result<()> {
    let frame = keyed_frame(60, 5);
    let grouped = GroupBy::new(&frame, "key")?;
    let got = grouped
        .par_apply(&executor(3), |g| match g.name() {
            Some(Label::Int(k)) => Ok(Applied::Scalar(*k as f64 * 10.0)),
            other => bail!("unexpected group name {other:?}"),
        })?
        .into_series()?;
    assert_eq!(got.values, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    Ok(())
}

#[test]
fn key_column_is_not_part_of_group_rows() -> Result<()> {
    let frame = keyed_frame(40, 4);
    let grouped = GroupBy::new(&frame, "key")?;
    let widths = grouped
        .par_apply(&executor(2), |g| Ok(Applied::Scalar(g.ncols() as f64)))?
        .into_series()?;
    assert!(widths.values.iter().all(|w| *w == 1.0));
    Ok(())
}

#[test]
fn mutation_flag_tracks_index_alignment() -> Result<()> {
    let frame = keyed_frame(90, 3).drop_column(&"key".into())?;
    let keys: Vec<Label> = (0..90).map(|i| Label::Int(i % 3)).collect();
    let grouper = KeyGrouper::from_keys(&keys, vec!["k".into()]);

    let (same, mutated) = apply_groupwise(&frame, &grouper, &executor(3), |g| {
        Ok(Applied::Frame(g.data().clone()))
    })?;
    assert_eq!(same.len(), 3);
    assert!(!mutated);

    // one group out of three drops a row; the flag sticks for the whole call
    let (_, mutated) = apply_groupwise(&frame, &grouper, &executor(3), |g| {
        let data = g.data();
        if g.name() == Some(&Label::Int(1)) {
            Ok(Applied::Frame(data.slice(Axis::Index, 1..data.nrows())))
        } else {
            Ok(Applied::Frame(data.clone()))
        }
    })?;
    assert!(mutated);

    // reductions never line up with the group's rows
    let (_, mutated) = apply_groupwise(&frame, &grouper, &executor(1), |g| {
        Ok(Applied::Scalar(g.column(0).mean()))
    })?;
    assert!(mutated);
    Ok(())
}

#[test]
fn aligned_transform_restores_row_order() -> Result<()> {
    let frame = keyed_frame(120, 4);
    let grouped = GroupBy::new(&frame, "key")?;
    let demean = |g: &Group<Label, Frame>| -> Result<Applied> {
        let col = g.column(0);
        let mean = col.mean();
        let centred = col.apply(|v| Ok(v - mean))?;
        Ok(Applied::Frame(Frame::from_series_columns(vec![centred])?))
    };

    let got = grouped.par_apply(&executor(4), demean)?;
    assert_eq!(got, grouped.apply(demean)?);
    let got = got.into_frame()?;
    assert_eq!(got.index, frame.index);
    assert_eq!(got.columns, vec![Label::from("x")]);
    Ok(())
}

#[test]
fn mutating_transform_is_keyed_by_group() -> Result<()> {
    let frame = keyed_frame(30, 3);
    let grouped = GroupBy::new(&frame, "key")?;
    let head = |g: &Group<Label, Frame>| -> Result<Applied> { Ok(Applied::Frame(g.data().take(&[0, 1]))) };

    let got = grouped.par_apply(&executor(3), head)?;
    assert_eq!(got, grouped.apply(head)?);
    assert!(got.as_series().is_none());
    assert_eq!(got.index().len(), 6);
    let got = got.as_frame().expect("frame result");
    // group 0 holds rows 0, 3, 6, ... (key = 7i % 3)
    assert_eq!(got.index[0], Label::Tuple(vec![Label::Int(0), Label::Int(0)]));
    assert_eq!(got.index[1], Label::Tuple(vec![Label::Int(0), Label::Int(3)]));
    assert_eq!(got.index_names, vec![Some("key".to_string()), None]);
    Ok(())
}

#[test]
fn mutating_transform_keeps_inner_index_names() -> Result<()> {
    let mut frame = keyed_frame(12, 2);
    frame.index_names = vec![Some("row".to_string())];
    let grouped = GroupBy::new(&frame, "key")?;
    let head = |g: &Group<Label, Frame>| -> Result<Applied> { Ok(Applied::Frame(g.data().take(&[0]))) };

    let got = grouped.par_apply(&executor(2), head)?.into_frame()?;
    assert_eq!(got.nrows(), 2);
    assert_eq!(got.index_names, vec![Some("key".to_string()), Some("row".to_string())]);
    Ok(())
}

#[test]
fn series_results_become_one_row_per_group() -> Result<()> {
    let frame = keyed_frame(50, 5);
    let grouped = GroupBy::new(&frame, "key")?;
    let describe = |g: &Group<Label, Frame>| -> Result<Applied> {
        let col = g.column(0);
        let stats = Series::new(vec!["min".into(), "mean".into()], vec![col.values[0], col.mean()], None)?;
        Ok(Applied::Series(stats))
    };

    let got = grouped.par_apply(&executor(2), describe)?;
    assert_eq!(got, grouped.apply(describe)?);
    let got = got.into_frame()?;
    assert_eq!(got.shape(), (5, 2));
    assert_eq!(got.index, Label::range(5));
    assert_eq!(got.index_names, vec![Some("key".to_string())]);
    Ok(())
}

#[test]
fn empty_grouping_raises_like_an_empty_slice() {
    let frame = Frame::from_columns(vec![("key", Vec::new()), ("x", Vec::new())]).unwrap();
    let grouped = GroupBy::new(&frame, "key").unwrap();
    assert!(grouped.grouper().is_empty());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let err = grouped
        .par_apply(&executor(4), move |g| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(g.name().is_none());
            assert_eq!(g.nrows(), 0);
            bail!(InvalidDtype)
        })
        .unwrap_err();
    assert!(err.downcast_ref::<InvalidDtype>().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let err = grouped.apply(|_| bail!(InvalidDtype)).unwrap_err();
    assert!(err.downcast_ref::<InvalidDtype>().is_some());
}

#[test]
fn empty_grouping_with_valid_function_is_empty() -> Result<()> {
    let frame = Frame::from_columns(vec![("key", Vec::new()), ("x", Vec::new())])?;
    let grouped = GroupBy::new(&frame, "key")?;
    let got = grouped.par_apply(&executor(4), |g| Ok(Applied::Scalar(g.column(0).sum())))?;
    match got {
        Output::Frame(f) => {
            assert_eq!(f.shape(), (0, 1));
            assert_eq!(f.columns, vec![Label::from("x")]);
        }
        other => panic!("expected an empty frame, got {other:?}"),
    }
    Ok(())
}

#[test]
fn group_errors_pass_through() {
    let frame = keyed_frame(100, 10);
    let grouped = GroupBy::new(&frame, "key").unwrap();
    let err = grouped
        .par_apply(&executor(4), |g| {
            if g.name() == Some(&Label::Int(6)) {
                bail!(InvalidDtype);
            }
            Ok(Applied::Scalar(0.0))
        })
        .unwrap_err();
    assert!(err.downcast_ref::<InvalidDtype>().is_some());
}
