//! Color mode detection for CLI output.
//!
//! Honors `NO_COLOR` (https://no-color.org/) and TTY detection.

use std::io::IsTerminal;
use std::str::FromStr;

/// Color output mode for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Colors even when stdout is not a TTY.
    Always,
    Never,
    /// Colors only on a TTY without `NO_COLOR`.
    #[default]
    Auto,
}

impl FromStr for ColorMode {
    type Err = String;

    /// Accepts `always`, `never` and `auto`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown color mode `{}`", other)),
        }
    }
}

impl ColorMode {
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
        }
    }
}

/// Terminal width, 80 when it cannot be determined.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}
