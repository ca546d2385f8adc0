//! Spinners for slow git operations (clone, fetch, release gathering).
//!
//! Spinners only draw on an interactive stdout and are hidden under
//! `--quiet` and `--json`.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// How progress feedback is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Animated spinner on a TTY.
    Interactive,
    /// No spinner, final messages only.
    Quiet,
    /// Nothing but the machine-readable document.
    Silent,
}

impl ProgressMode {
    pub fn detect(quiet: bool, json: bool) -> Self {
        if json {
            Self::Silent
        } else if quiet || !std::io::stdout().is_terminal() {
            Self::Quiet
        } else {
            Self::Interactive
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// A spinner wrapping indicatif.
pub struct Progress {
    bar: ProgressBar,
    mode: ProgressMode,
}

impl Progress {
    pub fn spinner(message: &str, mode: ProgressMode) -> Self {
        let bar = if mode.is_interactive() {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(SPINNER_CHARS);
            pb.set_style(style);
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        } else {
            ProgressBar::hidden()
        };
        Self { bar, mode }
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn finish_clear(&self) {
        self.bar.finish_and_clear();
    }

    /// Clear the spinner and print `message`, unless in silent mode.
    pub fn finish_with_message(&self, message: &str) {
        if self.mode.is_interactive() {
            self.bar.finish_and_clear();
        }
        if self.mode != ProgressMode::Silent && !message.is_empty() {
            println!("{}", message);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.bar.elapsed()
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_detection() {
        assert_eq!(ProgressMode::detect(false, true), ProgressMode::Silent);
        assert_eq!(ProgressMode::detect(true, false), ProgressMode::Quiet);
        assert_eq!(ProgressMode::detect(true, true), ProgressMode::Silent);
    }

    #[test]
    fn test_hidden_spinner_finishes_quietly() {
        let progress = Progress::spinner("Cloning", ProgressMode::Quiet);
        progress.set_message("Checking out");
        progress.finish_clear();
        assert!(progress.elapsed() < Duration::from_secs(60));
    }
}
