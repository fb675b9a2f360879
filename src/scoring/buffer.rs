/// Tolerance windows and event counting on 0/1 series.
///
/// Series come in several shapes (observed onsets as `bool`, predicted
/// flags as `Option<u8>` with `None` for missing forecasts, buffered
/// series as `u8`), so everything here works on any `EventFlag`.

use crate::error::{Result, SkillError};

/// A single cell of an event series: set, unset, or missing.
pub trait EventFlag: Copy {
    fn state(self) -> Option<bool>;
}

impl EventFlag for bool {
    fn state(self) -> Option<bool> {
        Some(self)
    }
}

impl EventFlag for u8 {
    fn state(self) -> Option<bool> {
        Some(self != 0)
    }
}

impl EventFlag for Option<u8> {
    fn state(self) -> Option<bool> {
        self.map(|v| v != 0)
    }
}

impl EventFlag for Option<bool> {
    fn state(self) -> Option<bool> {
        self
    }
}

/// Rolling window used to forgive small timing errors between forecast
/// and observation.
///
/// A centred window needs `window / 2 + 1` present cells (integer
/// division); a trailing window needs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferWindow {
    window: usize,
    center: bool,
}

impl BufferWindow {
    pub fn new(window: usize, center: bool) -> Result<Self> {
        if window == 0 {
            return Err(SkillError::config("window", "must be at least 1 timestep"));
        }
        Ok(Self { window, center })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn center(&self) -> bool {
        self.center
    }

    fn min_periods(&self) -> usize {
        if self.center { self.window / 2 + 1 } else { 1 }
    }

    /// Inclusive index range covered by the window at `i`, clipped to `len`.
    fn bounds(&self, i: usize, len: usize) -> (usize, usize) {
        let (lo, hi) = if self.center {
            let lo = i as isize - (self.window / 2) as isize;
            (lo, lo + self.window as isize - 1)
        } else {
            (i as isize - self.window as isize + 1, i as isize)
        };
        let lo = lo.max(0) as usize;
        let hi = (hi.max(0) as usize).min(len.saturating_sub(1));
        (lo, hi)
    }

    /// 1 where the window holds enough present cells and at least one set
    /// cell, else 0.
    pub fn apply<T: EventFlag>(&self, series: &[T]) -> Vec<u8> {
        let min_periods = self.min_periods();
        (0..series.len())
            .map(|i| {
                let (lo, hi) = self.bounds(i, series.len());
                let mut present = 0;
                let mut set = false;
                for cell in &series[lo..=hi] {
                    if let Some(v) = cell.state() {
                        present += 1;
                        set |= v;
                    }
                }
                u8::from(present >= min_periods && set)
            })
            .collect()
    }
}

/// Widens each positive into the surrounding window.
pub fn buffer_events<T: EventFlag>(series: &[T], center: bool, window: usize) -> Result<Vec<u8>> {
    Ok(BufferWindow::new(window, center)?.apply(series))
}

/// Number of rising edges. A set first cell counts; a set cell after a
/// missing one does not.
pub fn count_events<T: EventFlag>(series: &[T]) -> u64 {
    let mut count = 0;
    let mut prev: Option<Option<bool>> = None;
    for cell in series {
        let cur = cell.state();
        let onset = match prev {
            None => cur == Some(true),
            Some(p) => cur == Some(true) && p == Some(false),
        };
        if onset {
            count += 1;
        }
        prev = Some(cur);
    }
    count
}
