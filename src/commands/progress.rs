//! Terminal progress reporting

use indicatif::{ProgressBar, ProgressStyle};
use rmiflash_core::flash::FlashProgress;
use std::time::Duration;

/// `FlashProgress` backed by indicatif bars
///
/// Erases show a spinner; block transfers show a bar that is replaced for
/// every new transfer.
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    /// Create a reporter with no bar shown yet
    pub fn new() -> Self {
        Self::default()
    }

    fn replace(&mut self, bar: ProgressBar) {
        if let Some(old) = self.bar.replace(bar) {
            old.finish_and_clear();
        }
    }
}

impl FlashProgress for BarProgress {
    fn erasing(&mut self, what: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Erasing {}...", what));
        pb.enable_steady_tick(Duration::from_millis(100));
        self.replace(pb);
    }

    fn transferring(&mut self, what: &str, total_blocks: usize) {
        let pb = ProgressBar::new(total_blocks as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(what.to_string());
        self.replace(pb);
    }

    fn block_progress(&mut self, blocks_done: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(blocks_done as u64);
        }
    }

    fn complete(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message("done");
        }
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}
