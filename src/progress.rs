//! Progress reporting and cancellation.
//!
//! A [`ProgressWindow`] maps one chunk's local `[0, 1]` progress into the
//! whole operation's `[0, 1]`. Windows are immutable values handed to each
//! chunk rather than state mutated around recursion, so sibling chunks never
//! see each other's window.

use std::sync::Arc;

use crate::error::{Result, WarpError};

/// Progress callback. Receives overall progress in `[0, 1]`; returning
/// `false` asks the warp to stop.
pub type ProgressFunc = Arc<dyn Fn(f64) -> bool>;

/// A progress callback that never cancels.
#[must_use]
pub fn no_progress() -> ProgressFunc {
    Arc::new(|_| true)
}

/// The `(base, scale)` slice of overall progress owned by one unit of work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    pub base: f64,
    pub scale: f64,
}

impl ProgressWindow {
    /// The whole `[0, 1]` range.
    pub const FULL: ProgressWindow = ProgressWindow {
        base: 0.0,
        scale: 1.0,
    };

    #[must_use]
    pub const fn new(base: f64, scale: f64) -> Self {
        Self { base, scale }
    }

    /// Halve this window into two adjacent windows.
    ///
    /// The halves cover exactly `[base, base + scale)` between them.
    #[must_use]
    pub fn split(&self) -> (ProgressWindow, ProgressWindow) {
        let half = self.scale * 0.5;
        (
            ProgressWindow::new(self.base, half),
            ProgressWindow::new(self.base + half, half),
        )
    }

    /// Map local progress in `[0, 1]` to overall progress.
    #[inline]
    #[must_use]
    pub fn map(&self, local: f64) -> f64 {
        self.base + local.clamp(0.0, 1.0) * self.scale
    }
}

impl Default for ProgressWindow {
    fn default() -> Self {
        Self::FULL
    }
}

/// A callback bound to one progress window.
#[derive(Clone)]
pub struct Progress {
    func: ProgressFunc,
    window: ProgressWindow,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Progress {
    #[must_use]
    pub fn new(func: ProgressFunc, window: ProgressWindow) -> Self {
        Self { func, window }
    }

    #[must_use]
    pub fn window(&self) -> ProgressWindow {
        self.window
    }

    /// Report local progress in `[0, 1]`.
    ///
    /// # Errors
    /// Returns [`WarpError::Cancelled`] if the callback asks to stop.
    pub fn report(&self, local: f64) -> Result<()> {
        if (self.func)(self.window.map(local)) {
            Ok(())
        } else {
            Err(WarpError::Cancelled)
        }
    }
}
