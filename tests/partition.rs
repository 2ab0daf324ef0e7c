use anyhow::Result;
use parapply::frame::{Applied, Frame, Label, Output, Series};
use parapply::{ApplyError, Axis, Capacity, Executor, Partitioned, Reassemble, Settings, Workers};
use std::io;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic pseudo-random frame (64-bit LCG).
fn random_frame(rows: usize, cols: usize, seed: u64) -> Frame {
    let mut state = seed;
    let mut columns = Vec::with_capacity(cols);
    for j in 0..cols {
        let mut values = Vec::with_capacity(rows);
        for _ in 0..rows {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            values.push((state >> 11) as f64 / (1u64 << 53) as f64 * 100.0 - 50.0);
        }
        columns.push((format!("c{j}"), values));
    }
    Frame::from_columns(columns).unwrap()
}

fn executor(workers: usize, unit_min_size: usize) -> Executor {
    let settings = Settings {
        workers: Workers::Fixed(workers),
        unit_min_size,
        show_progress: false,
        ..Settings::default()
    };
    Executor::new(settings).with_capacity(Capacity::with_cpus(8))
}

fn square(s: &Series) -> Result<Applied> {
    Ok(Applied::Series(s.apply(|v| Ok(v * v))?))
}

#[test]
fn split_then_concat_is_identity() -> Result<()> {
    let frame = random_frame(37, 11, 7);
    for axis in [Axis::Index, Axis::Columns] {
        for n in [1, 2, 5, 11] {
            let pieces = frame.split(axis, n);
            assert_eq!(pieces.len(), n);
            assert_eq!(Frame::concat(pieces, axis)?, frame, "axis={axis} n={n}");
        }
    }

    let series = Series::from_values((0..25).map(f64::from).collect());
    for n in [1, 4] {
        assert_eq!(Series::concat(series.split(Axis::Index, n), Axis::Index)?, series);
    }
    Ok(())
}

#[test]
fn square_matches_on_both_axes() -> Result<()> {
    let frame = random_frame(2000, 4, 42);
    let exec = executor(8, 1);

    let by_column = frame.par_apply(Axis::Index, &exec, square)?;
    let by_row = frame.par_apply(Axis::Columns, &exec, square)?;
    let baseline = frame.apply(Axis::Index, square)?;

    let squared = Frame::from_columns(
        (0..frame.ncols())
            .map(|j| {
                let values = frame.column_values(j).iter().map(|v| v * v).collect();
                (frame.columns[j].clone(), values)
            })
            .collect(),
    )?;
    assert_eq!(baseline, Output::Frame(squared));
    assert_eq!(by_column, baseline);
    assert_eq!(by_row, baseline);
    Ok(())
}

#[test]
fn column_variance_with_uneven_chunks() -> Result<()> {
    let frame = random_frame(5, 201, 3);
    let exec = executor(2, 100);
    let var = |s: &Series| -> Result<Applied> { Ok(Applied::Scalar(s.var())) };

    let plan = parapply::partition::plan_for(&frame, Axis::Columns, &exec)?;
    assert_eq!((plan.workers, plan.units), (2, 2));

    let got = frame.par_apply(Axis::Index, &exec, var)?;
    let want = frame.apply(Axis::Index, var)?;
    assert_eq!(got, want);
    let got = got.into_series()?;
    assert_eq!(got.len(), 201);
    assert_eq!(got.index, frame.columns);
    Ok(())
}

#[test]
fn row_wise_sum_of_two_columns() -> Result<()> {
    let frame = random_frame(1000, 2, 11);
    let frame = Frame::new(
        frame.index.clone(),
        vec![Label::from("A"), Label::from("B")],
        vec![frame.column_values(0).to_vec(), frame.column_values(1).to_vec()],
    )?;
    let exec = executor(4, 100);
    let add = |row: &Series| -> Result<Applied> {
        let a = row.get(&"A".into()).unwrap_or(f64::NAN);
        let b = row.get(&"B".into()).unwrap_or(f64::NAN);
        Ok(Applied::Scalar(a + b))
    };

    let got = frame.par_apply(Axis::Columns, &exec, add)?.into_series()?;
    assert_eq!(got.index, frame.index);
    for (i, v) in got.values.iter().enumerate() {
        assert_eq!(*v, frame.value(i, 0) + frame.value(i, 1));
    }
    assert_eq!(Output::Series(got), frame.apply(Axis::Columns, add)?);
    Ok(())
}

#[test]
fn reshaping_function_on_a_single_row() -> Result<()> {
    // one row, 199 columns, every column expanded to ten rows: the partial
    // results carry a different index than the input but still cover every column
    let frame = random_frame(1, 199, 5);
    let exec = executor(4, 10);
    let expand = |s: &Series| -> Result<Applied> { Ok(Applied::Series(Series::from_values(vec![s.sum(); 10]))) };

    let got = frame.par_apply(Axis::Index, &exec, expand)?.into_frame()?;
    assert_eq!(got.shape(), (10, 199));
    assert_eq!(got.columns, frame.columns);
    assert_eq!(Output::Frame(got), frame.apply(Axis::Index, expand)?);
    Ok(())
}

#[test]
fn reducing_function_on_a_square_frame() -> Result<()> {
    // results are one-dimensional, so they stack along the index even though
    // their total length matches both input dimensions
    let frame = random_frame(100, 100, 9);
    let exec = executor(4, 10);
    let mean = |s: &Series| -> Result<Applied> { Ok(Applied::Scalar(s.mean())) };
    for axis in [Axis::Index, Axis::Columns] {
        let got = frame.par_apply(axis, &exec, mean)?;
        assert_eq!(got, frame.apply(axis, mean)?, "axis={axis}");
    }
    Ok(())
}

#[test]
fn single_unit_goes_through_reassembly() -> Result<()> {
    let frame = random_frame(20, 3, 1);
    let exec = executor(1, 100);
    assert_eq!(frame.par_apply(Axis::Index, &exec, square)?, frame.apply(Axis::Index, square)?);
    assert_eq!(frame.par_apply(Axis::Columns, &exec, square)?, frame.apply(Axis::Columns, square)?);
    Ok(())
}

#[test]
fn series_element_wise_apply() -> Result<()> {
    let series = Series::from_values((0..1000).map(f64::from).collect()).with_name("x");
    let exec = executor(4, 50);
    let got = series.par_apply(&exec, |v| Ok(v.sqrt()))?;
    assert_eq!(got, series.apply(|v| Ok(v.sqrt()))?);
    assert_eq!(got.name, Some(Label::from("x")));
    Ok(())
}

#[test]
fn series_rejects_column_axis_before_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let series = Series::from_values(vec![1.0, 2.0, 3.0]);
    let err = series
        .par_apply_axis(Axis::Columns, &executor(2, 1), move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(v)
        })
        .unwrap_err();
    assert_eq!(err.downcast_ref::<ApplyError>(), Some(&ApplyError::SeriesAxis));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn axis_values_parse() -> Result<()> {
    assert_eq!("index".parse::<Axis>()?, Axis::Index);
    assert_eq!("1".parse::<Axis>()?, Axis::Columns);
    assert_eq!(Axis::try_from(1i64)?, Axis::Columns);
    let err = "sideways".parse::<Axis>().unwrap_err();
    assert!(matches!(err, ApplyError::InvalidAxis(_)));
    assert!(err.is_configuration());
    Ok(())
}

#[test]
fn function_errors_pass_through_chunking() {
    #[derive(Debug, thiserror::Error)]
    #[error("row 250 is poisoned")]
    struct Poisoned;

    let frame = random_frame(500, 4, 13);
    let exec = executor(4, 10);
    let err = frame
        .par_apply(Axis::Columns, &exec, |row: &Series| {
            if row.name == Some(Label::Int(250)) {
                anyhow::bail!(Poisoned);
            }
            Ok(Applied::Scalar(row.sum()))
        })
        .unwrap_err();
    assert!(err.downcast_ref::<Poisoned>().is_some());
}

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn oversubscription_is_logged_once_per_call() -> Result<()> {
    let sink = Captured::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    let frame = random_frame(40, 30, 11);
    let exec = executor(6, 1).with_capacity(Capacity::with_cpus(2));
    let got = tracing::subscriber::with_default(subscriber, || frame.par_apply(Axis::Index, &exec, square))?;
    assert_eq!(got, frame.apply(Axis::Index, square)?);

    let logs = String::from_utf8(sink.0.lock().unwrap().clone())?;
    assert_eq!(logs.matches("more workers").count(), 1, "{logs}");
    Ok(())
}
