//! Completion counter shown while results are collected.
//!
//! Wraps an `indicatif` bar when the `progress` feature is on. Sized inputs get
//! a bar with ETA, unsized inputs only a spinner and a running count. Ticking
//! never touches the results themselves.

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporter for one executor call.
pub struct Progress {
    #[cfg(feature = "progress")]
    bar: Option<ProgressBar>,
}

impl Progress {
    /// A reporter that draws nothing.
    pub fn hidden() -> Self {
        Self {
            #[cfg(feature = "progress")]
            bar: None,
        }
    }

    /// Reporter for `total` units (`None` when the input size is unknown).
    #[cfg(feature = "progress")]
    pub fn new(enabled: bool, total: Option<usize>) -> Self {
        if !enabled {
            return Self::hidden();
        }
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                if let Ok(style) = ProgressStyle::with_template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} units ({eta})",
                ) {
                    bar.set_style(style);
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) =
                    ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} units")
                {
                    bar.set_style(style);
                }
                bar
            }
        };
        Self { bar: Some(bar) }
    }

    #[cfg(not(feature = "progress"))]
    pub fn new(_enabled: bool, _total: Option<usize>) -> Self {
        Self::hidden()
    }

    #[inline]
    pub fn tick(&self) {
        #[cfg(feature = "progress")]
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    /// Mark the run as complete.
    pub fn finish(&self) {
        #[cfg(feature = "progress")]
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }

    /// Leave the bar where it stopped (failure or cancellation).
    pub fn abandon(&self) {
        #[cfg(feature = "progress")]
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
    }

    pub fn is_visible(&self) -> bool {
        #[cfg(feature = "progress")]
        {
            self.bar.is_some()
        }
        #[cfg(not(feature = "progress"))]
        {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_progress_draws_nothing() {
        let p = Progress::new(false, Some(10));
        assert!(!p.is_visible());
        p.tick();
        p.finish();
    }

    #[cfg(feature = "progress")]
    #[test]
    fn unsized_progress_still_counts() {
        let p = Progress::new(true, None);
        assert!(p.is_visible());
        p.tick();
        p.abandon();
    }
}
