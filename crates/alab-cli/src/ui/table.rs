//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `alab list` | `render_apps_table()` |
//! | `alab search` | `render_apps_table()` |
//! | `alab info` | `render_versions_table()` |
//! | `alab releases` | `render_releases_table()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, ColumnConstraint, Table, Width};

use super::color::terminal_width;
use super::format::{format_flag, truncate_str};

/// One app in a listing.
#[derive(Debug, Clone)]
pub struct AppRow {
    pub id: String,
    /// Installed version in display form.
    pub installed: String,
    pub release_line: String,
    pub updates: Option<bool>,
    pub title: String,
}

/// One version of an app.
#[derive(Debug, Clone)]
pub struct VersionRow {
    pub version: String,
    pub compatible: Option<bool>,
    pub installed: bool,
}

/// One gathered release.
#[derive(Debug, Clone)]
pub struct ReleaseRow {
    pub version: String,
    pub url: String,
    pub requirements: usize,
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(headers.iter().map(Cell::new).collect::<Vec<_>>());
    table
}

/// Render apps for `alab list` / `alab search`.
///
/// ```text
/// APP            INSTALLED        LINE   UPDATES   TITLE
/// hello-world    v1.0.0           main   no        Hello world
/// ```
pub fn render_apps_table(apps: &[AppRow]) -> String {
    if apps.is_empty() {
        return String::new();
    }
    let mut table = new_table(&["APP", "INSTALLED", "LINE", "UPDATES", "TITLE"]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(12)),
        ColumnConstraint::LowerBoundary(Width::Fixed(10)),
        ColumnConstraint::LowerBoundary(Width::Fixed(6)),
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
    ]);

    let title_width = terminal_width().saturating_sub(60).max(20);
    for app in apps {
        table.add_row(vec![
            Cell::new(&app.id),
            Cell::new(&app.installed),
            Cell::new(&app.release_line),
            Cell::new(format_flag(app.updates)),
            Cell::new(truncate_str(&app.title, title_width)),
        ]);
    }
    table.to_string()
}

/// Render the versions of one app, marking the installed one with `*`.
pub fn render_versions_table(versions: &[VersionRow]) -> String {
    if versions.is_empty() {
        return String::new();
    }
    let mut table = new_table(&["", "VERSION", "COMPATIBLE"]);
    for row in versions {
        table.add_row(vec![
            Cell::new(if row.installed { "*" } else { "" }),
            Cell::new(&row.version),
            Cell::new(format_flag(row.compatible)),
        ]);
    }
    table.to_string()
}

/// Render releases gathered from a source URL.
pub fn render_releases_table(releases: &[ReleaseRow]) -> String {
    if releases.is_empty() {
        return String::new();
    }
    let mut table = new_table(&["VERSION", "REQUIREMENTS", "URL"]);
    for row in releases {
        table.add_row(vec![
            Cell::new(&row.version),
            Cell::new(row.requirements),
            Cell::new(&row.url),
        ]);
    }
    table.to_string()
}
