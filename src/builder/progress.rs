//! Progress reporting for concurrent bundle tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

/// Counts finished bundle tasks and drives an optional progress bar.
///
/// Clones share the counters, so each rayon worker can hold its own handle.
#[derive(Clone)]
pub struct TaskProgress {
    succeeded: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    total: usize,
    bar: Option<ProgressBar>,
}

impl TaskProgress {
    /// Create a tracker without a visible bar.
    pub fn new(total: usize) -> Self {
        TaskProgress {
            succeeded: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            total,
            bar: None,
        }
    }

    /// Create a tracker that draws a bar on stderr when there is more than
    /// one task to wait for.
    pub fn with_bar(total: usize) -> Self {
        let mut progress = TaskProgress::new(total);
        if total > 1 {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            progress.bar = Some(pb);
        }
        progress
    }

    /// Record a finished task.
    pub fn task_done(&self, name: &str, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(pb) = &self.bar {
            pb.set_message(name.to_string());
            pb.inc(1);
        }
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}
