//! Progress reporting utilities using indicatif.
//!
//! Batch runs go through two phases, `reconcile` and `create`. Each phase
//! gets its own bar, labelled with the DevEUI being processed. With `--quiet`
//! nothing is drawn.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Phase name of the reconciliation pass.
pub const PHASE_RECONCILE: &str = "reconcile";
/// Phase name of the create pass.
pub const PHASE_CREATE: &str = "create";

/// Progress callback for batch phases.
///
/// Implement this trait to receive progress updates while a batch runs.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "reconcile", "create")
    /// * `total` - Total number of devices to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each device processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `item` - DevEUI being processed
    fn on_progress(&self, current: usize, item: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}
    fn on_progress(&self, _current: usize, _item: &str) {}
    fn on_phase_end(&self, _phase: &str) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use session_wrench::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total as u64);
        pb.set_style(Self::style());
        pb.set_message(match phase {
            PHASE_RECONCILE => "Reconciling".to_string(),
            PHASE_CREATE => "Creating".to_string(),
            other => other.to_string(),
        });
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(old) = bar.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn on_progress(&self, current: usize, item: &str) {
        if self.quiet {
            return;
        }

        if let Ok(bar) = self.bar.lock() {
            if let Some(ref pb) = *bar {
                pb.set_position(current as u64);
                pb.set_message(item.to_string());
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        if let Some(pb) = self.bar.lock().ok().and_then(|mut bar| bar.take()) {
            let done = match phase {
                PHASE_RECONCILE => "Reconcile complete",
                PHASE_CREATE => "Create complete",
                _ => "Done",
            };
            pb.finish_with_message(done);
        }
    }
}
