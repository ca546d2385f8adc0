//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggestion | Cyan |
//! | `[skip]` | Nothing to do | Dim |

use owo_colors::OwoColorize;

use super::color::ColorMode;

/// Message severity for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
    Skip,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
            Self::Skip => "[skip]",
        }
    }
}

/// Styling for every line the CLI prints.
#[derive(Debug, Clone)]
pub struct Style {
    color_mode: ColorMode,
}

impl Default for Style {
    fn default() -> Self {
        Self::new(ColorMode::Auto)
    }
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_mode.is_enabled()
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// `[ok] Done`, with the prefix colored when colors are on.
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        let prefix = msg_type.prefix();
        if !self.colors_enabled() {
            return format!("{} {}", prefix, text);
        }
        let colored = match msg_type {
            MessageType::Ok => prefix.green().to_string(),
            MessageType::Err => prefix.red().to_string(),
            MessageType::Warn => prefix.yellow().to_string(),
            MessageType::Info => prefix.blue().to_string(),
            MessageType::Hint => prefix.cyan().to_string(),
            MessageType::Skip => prefix.dimmed().to_string(),
        };
        format!("{} {}", colored, text)
    }

    /// Detail line under a message, indented past the prefix.
    pub fn message_detail(&self, label: &str, value: &str) -> String {
        format!("     {}: {}", label, value)
    }

    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    /// Error line followed by optional `Cause:` and `Hint:` lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        if let Some(cause) = cause {
            output.push_str(&format!("\n      Cause: {}", cause));
        }
        if let Some(hint) = hint {
            output.push_str(&format!("\n      Hint: {}", hint));
        }
        output
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors_enabled() {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    /// Version label: names in yellow, sentinels dimmed.
    pub fn version(&self, label: &str) -> String {
        if !self.colors_enabled() {
            return label.to_string();
        }
        if label.starts_with('[') {
            label.dimmed().to_string()
        } else {
            label.yellow().to_string()
        }
    }

    /// Tri-state flag: green `yes`, red `no`, dimmed `unknown`.
    ///
    /// `good` is the value rendered in green.
    pub fn flag(&self, value: Option<bool>, good: bool) -> String {
        let text = super::format::format_flag(value);
        if !self.colors_enabled() {
            return text.to_string();
        }
        match value {
            Some(v) if v == good => text.green().to_string(),
            Some(_) => text.red().to_string(),
            None => text.dimmed().to_string(),
        }
    }

    pub fn file_path(&self, path: &str) -> String {
        if self.colors_enabled() {
            path.cyan().to_string()
        } else {
            path.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_no_color() {
        let style = Style::new(ColorMode::Never);
        assert_eq!(style.message(MessageType::Ok, "Installed"), "[ok] Installed");
        assert_eq!(style.message(MessageType::Skip, "Nothing to do"), "[skip] Nothing to do");
    }

    #[test]
    fn test_error_with_context() {
        let style = Style::new(ColorMode::Never);
        let output = style.error_with_context(
            "Failed to load configuration",
            Some("Config invalid: bad yaml"),
            Some("Check ~/.alab/config.yaml"),
        );
        assert!(output.starts_with("[err] Failed to load configuration"));
        assert!(output.contains("Cause: Config invalid: bad yaml"));
        assert!(output.contains("Hint: Check ~/.alab/config.yaml"));
    }

    #[test]
    fn test_flag_and_version_no_color() {
        let style = Style::new(ColorMode::Never);
        assert_eq!(style.flag(Some(true), true), "yes");
        assert_eq!(style.flag(Some(false), true), "no");
        assert_eq!(style.flag(None, false), "unknown");
        assert_eq!(style.version("v1.0.0"), "v1.0.0");
        assert_eq!(style.key_value("Path", "/apps/demo"), "Path: /apps/demo");
    }
}
