//! # CLI UI Module
//!
//! Styling and formatting layer for `alab` output.
//!
//! Output stays readable without colors (`NO_COLOR`, `--color never`) and
//! every listing command that scripts care about has a `--json` form.
//!
//! - `color`: color mode and terminal detection
//! - `style`: message prefixes and value styling
//! - `format`: truncation and yes/no/unknown formatting
//! - `table`: app and release tables with comfy-table
//! - `progress`: spinners for git operations

pub mod color;
pub mod format;
pub mod progress;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use progress::{Progress, ProgressMode};
pub use style::{MessageType, Style};
