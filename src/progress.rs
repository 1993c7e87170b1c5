//! Progress over the run's target count.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress bar drawn to stderr, hidden when stderr is not a terminal or
/// when the caller asks for it to be.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(target: usize, visible: bool) -> Self {
        let draw_target = if visible && std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(10)
        } else {
            ProgressDrawTarget::hidden()
        };

        let bar = ProgressBar::with_draw_target(Some(target as u64), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }

    pub fn hidden(target: usize) -> Self {
        Self::new(target, false)
    }

    pub fn advance(&self) {
        self.bar.inc(1);
    }

    /// Note a replaced skip without moving the bar.
    pub fn note_requeue(&self, requeued: u64) {
        self.bar.set_message(format!("{requeued} replaced"));
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    /// Leave the bar where it stopped, e.g. after a fatal error.
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}
