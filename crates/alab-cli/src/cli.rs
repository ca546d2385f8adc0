//! CLI definition and command dispatch for alab.
//!
//! ## Configuration Precedence
//!
//! 1. CLI flags (`--config`, `--verbose`)
//! 2. Environment variables (`ALAB_CONFIG`, `ALAB_VERBOSE`, `ALAB_<KEY>`)
//! 3. Config file (`~/.alab/config.yaml` or the `--config` path)
//! 4. Built-in defaults
//!
//! In develop mode (`develop: true` in the file) the file wins over the
//! environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use crate::ui::table::{self, AppRow, ReleaseRow, VersionRow};
use crate::ui::{format, ColorMode, MessageType, Progress, ProgressMode, Style};

use alab_core::registry::index::{build_api_v1, generate_apps_index, VersionedRelease};
use alab_core::registry::meta::{fetch_gitinfo, generate_apps_meta};
use alab_core::registry::releases::{
    gather_releases, AppData, AppTreeScanner, RegistryData, Release, ReleaseSpec,
};
use alab_core::{App, AppError, AppManager, AppVersion, RegistryEntry};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// File the registry builder writes next to the API catalog.
const APPS_META_FILE: &str = "apps_meta.json";

/// Install, update and inspect apps from a git-hosted app registry
#[derive(Parser, Debug)]
#[command(name = "alab")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "ALAB_VERBOSE")]
    pub verbose: bool,

    /// Suppress progress and informational messages
    #[arg(short, long, global = true, env = "ALAB_QUIET")]
    pub quiet: bool,

    /// Path to configuration file (default: ~/.alab/config.yaml)
    #[arg(long, global = true, env = "ALAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "ALAB_COLOR", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List installed apps
    #[command(after_help = r#"EXAMPLES:
    # Table of installed apps
    alab list

    # Machine-readable state of every installed app
    alab list --json
"#)]
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Search the registry for apps
    #[command(after_help = r#"EXAMPLES:
    # Every registered app
    alab search

    # Wildcards match app ids, case-insensitively
    alab search 'aiidalab-*'
"#)]
    Search {
        /// App id pattern with `*` and `?` wildcards
        #[arg(default_value = "*")]
        pattern: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show registry information and versions of an app
    #[command(after_help = r#"EXAMPLES:
    alab info hello-world
"#)]
    Info {
        /// App id
        app: String,

        /// List pre-release versions too
        #[arg(long)]
        pre: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the state of an app
    #[command(after_help = r#"EXAMPLES:
    # Human-readable state
    alab status hello-world

    # Pipe to jq for specific fields
    alab status hello-world --json | jq '.state.installed_version'
"#)]
    Status {
        /// App id
        app: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Install an app, or switch an installed app to another version
    #[command(after_help = r#"EXAMPLES:
    # Latest version of the app's release line
    alab install hello-world

    # A specific version, by name or in git: form
    alab install hello-world --version v1.0.0
    alab install hello-world --version git:refs/tags/v1.0.0

    # Latest version including pre-releases
    alab install hello-world --pre

    # Discard local modifications
    alab install hello-world --force
"#)]
    #[command(disable_version_flag = true)]
    Install {
        /// App id
        app: String,

        /// Version to install (default: latest)
        #[arg(long)]
        version: Option<String>,

        /// Consider pre-release versions
        #[arg(long)]
        pre: bool,

        /// Proceed even if the installation is detached
        #[arg(long)]
        force: bool,
    },

    /// Update an installed app to the latest version of its release line
    #[command(after_help = r#"EXAMPLES:
    alab update hello-world
"#)]
    Update {
        /// App id
        app: String,

        /// Proceed even if the installation is detached
        #[arg(long)]
        force: bool,
    },

    /// Remove an installed app
    #[command(after_help = r#"EXAMPLES:
    alab uninstall hello-world

    # Remove even with local modifications
    alab uninstall hello-world --force
"#)]
    Uninstall {
        /// App id
        app: String,

        /// Proceed even if the installation is detached
        #[arg(long)]
        force: bool,
    },

    /// Gather the releases offered by a source URL
    #[command(after_help = r#"EXAMPLES:
    # Every tag merged into main
    alab releases 'git+https://github.com/aiidalab/aiidalab-hello-world.git@main:'

    # Tags between two revisions of a local clone
    alab releases 'git+file:///path/to/app@main:v1.0.0..'

    # An archive or directory is one release and needs a version
    alab releases https://example.com/hello-world-1.0.tar.gz --version 1.0
"#)]
    #[command(disable_version_flag = true)]
    Releases {
        /// Release spec URL: `git+https://` or `git+file://` with an `@<line>`
        /// suffix, or a `file:`/`https:` archive or directory
        url: String,

        /// Version of a release outside git
        #[arg(long)]
        version: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Registry catalog operations
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Registry subcommands
#[derive(Subcommand, Debug)]
pub enum RegistryAction {
    /// Build the API catalog and apps_meta.json from a registry data file
    #[command(after_help = r#"EXAMPLES:
    alab registry build --data apps.yaml --out build/api/v1
"#)]
    Build {
        /// Registry data file (YAML) listing apps and their release specs
        #[arg(long)]
        data: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved configuration
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Entry point
// ============================================================================

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!("alab_core={},alab_cli={}", log_level, log_level);
    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let color_mode = cli.color.parse::<ColorMode>().unwrap_or_else(|e| {
        tracing::warn!("{}, using auto", e);
        ColorMode::Auto
    });
    let style = Style::new(color_mode);

    let manager = match &cli.config {
        Some(path) => AppManager::with_config(path),
        None => AppManager::with_defaults(),
    };
    let manager = match manager {
        Ok(manager) => manager,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check your config at ~/.alab/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context("Failed to load configuration", Some(&e.to_string()), Some(&hint))
            );
            return ExitCode::FAILURE;
        }
    };

    let quiet = cli.quiet;
    let result = match cli.command {
        Command::List { json } => handle_list(&style, &manager, json),
        Command::Search { pattern, json } => handle_search(&style, &manager, &pattern, json),
        Command::Info { app, pre, json } => handle_info(&style, &manager, &app, pre, json),
        Command::Status { app, json } => handle_status(&style, &manager, &app, json),
        Command::Install {
            app,
            version,
            pre,
            force,
        } => {
            handle_install(&style, &manager, &app, version.as_deref(), pre, force, quiet)
        }
        Command::Update { app, force } => handle_update(&style, &manager, &app, force, quiet),
        Command::Uninstall { app, force } => handle_uninstall(&style, &manager, &app, force),
        Command::Releases { url, version, json } => {
            handle_releases(&style, &url, version, json, quiet)
        }
        Command::Registry { action } => match action {
            RegistryAction::Build { data, out } => handle_registry_build(&style, &data, &out, quiet),
        },
        Command::Config { action } => match action {
            ConfigAction::Show { json } => handle_config_show(&style, &manager, json),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style.message(MessageType::Err, &e.to_string()));
            if matches!(e, AppError::Detached { .. }) {
                eprintln!(
                    "{}",
                    style.message(MessageType::Hint, "Run `alab status <app>` to inspect the installation")
                );
            }
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn app_title(entry: Option<&RegistryEntry>) -> String {
    entry
        .and_then(|e| e.metainfo.title.clone())
        .unwrap_or_default()
}

fn app_row(app: &App) -> AppRow {
    let state = app.recompute();
    AppRow {
        id: app.id().to_string(),
        installed: state.installed_version.short_display(),
        release_line: app.release_line().unwrap_or_else(|| "-".to_string()),
        updates: state.updates_available,
        title: app_title(app.entry()),
    }
}

/// Refuse to touch a detached installation unless forced.
fn ensure_attached(app: &App, force: bool) -> Result<(), AppError> {
    if app.detached() == Some(true) {
        if !force {
            return Err(AppError::Detached {
                app: app.id().to_string(),
            });
        }
        tracing::warn!("Proceeding with detached app '{}'", app.id());
    }
    Ok(())
}

/// `git:`-prefixed versions parse directly; anything else is looked up by
/// identifier among the available versions.
fn resolve_version(app: &App, requested: &str) -> Result<AppVersion, AppError> {
    if requested.starts_with(alab_core::constants::VERSION_PREFIX) {
        return Ok(app.normalize_version(requested.parse()?));
    }
    app.available_versions()
        .into_iter()
        .find(|v| v.identifier().as_deref() == Some(requested))
        .ok_or_else(|| AppError::InvalidVersion(requested.to_string()))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Command handlers
// ============================================================================

fn handle_list(style: &Style, manager: &AppManager, json: bool) -> Result<(), AppError> {
    let ids = manager.installed_apps()?;
    let apps: Vec<App> = ids.iter().map(|id| manager.app(id)).collect();

    if json {
        let states: BTreeMap<&str, _> = apps.iter().map(|a| (a.id(), a.recompute())).collect();
        return print_json(&states);
    }
    if apps.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!("No apps installed in {}", manager.config().apps.display())
            )
        );
        println!("{}", style.message(MessageType::Hint, "Run `alab search` to browse the registry"));
        return Ok(());
    }
    let rows: Vec<AppRow> = apps.iter().map(app_row).collect();
    println!("{}", table::render_apps_table(&rows));
    Ok(())
}

fn handle_search(style: &Style, manager: &AppManager, pattern: &str, json: bool) -> Result<(), AppError> {
    let registry = manager.fetch_registry()?;
    let ids = manager.search(pattern)?;

    if json {
        let hits: BTreeMap<&str, &RegistryEntry> = ids
            .iter()
            .filter_map(|id| registry.get(id).map(|e| (id.as_str(), e)))
            .collect();
        return print_json(&hits);
    }
    if ids.is_empty() {
        println!(
            "{}",
            style.message(MessageType::Info, &format!("No apps match `{}`", pattern))
        );
        return Ok(());
    }
    let rows: Vec<AppRow> = ids.iter().map(|id| app_row(&manager.app(id))).collect();
    println!("{}", table::render_apps_table(&rows));
    Ok(())
}

fn handle_info(
    style: &Style,
    manager: &AppManager,
    app_id: &str,
    pre: bool,
    json: bool,
) -> Result<(), AppError> {
    let registry = manager.fetch_registry()?;
    let entry = registry.get(app_id).ok_or_else(|| AppError::NotRegistered {
        app: app_id.to_string(),
    })?;
    let app = manager.app(app_id);
    let state = if pre {
        app.set_include_prereleases(true)
    } else {
        app.recompute()
    };

    if json {
        return print_json(&json!({
            "id": app_id,
            "entry": entry,
            "release_line": app.release_line(),
            "state": state,
        }));
    }

    let meta = &entry.metainfo;
    println!("{}", style.section(meta.title.as_deref().unwrap_or(app_id)));
    if let Some(description) = &meta.description {
        println!("  {}", description);
    }
    println!();
    println!("  {}", style.key_value("Id", app_id));
    println!("  {}", style.key_value("Source", entry.clone_url()));
    println!(
        "  {}",
        style.key_value("Release line", &app.release_line().unwrap_or_default())
    );
    if let Some(authors) = &meta.authors {
        println!("  {}", style.key_value("Authors", authors));
    }
    println!("  {}", style.key_value("Categories", &format::format_list(&entry.categories)));
    if let Some(url) = &meta.documentation_url {
        println!("  {}", style.key_value("Documentation", url));
    }

    println!();
    println!("{}", style.section("VERSIONS"));
    if state.available_versions.is_empty() {
        println!("{}", style.message(MessageType::Info, "No installable versions found"));
    }
    if state.has_prereleases && !state.include_prereleases {
        println!(
            "{}",
            style.message(MessageType::Hint, "Pre-releases are hidden; pass --pre to list them")
        );
    }
    if state.available_versions.is_empty() {
        return Ok(());
    }
    let rows: Vec<VersionRow> = state
        .available_versions
        .iter()
        .map(|v| VersionRow {
            version: v.short_display(),
            compatible: app.is_compatible(v),
            installed: *v == state.installed_version,
        })
        .collect();
    println!("{}", table::render_versions_table(&rows));
    Ok(())
}

fn handle_status(style: &Style, manager: &AppManager, app_id: &str, json: bool) -> Result<(), AppError> {
    let app = manager.app(app_id);
    let state = app.recompute();

    if json {
        return print_json(&json!({
            "id": app_id,
            "path": app.path(),
            "registered": app.entry().is_some(),
            "release_line": app.release_line(),
            "state": state,
        }));
    }

    println!("{}", style.section(app_id));
    println!("  {}", style.key_value("Path", &style.file_path(&app.path().display().to_string())));
    println!(
        "  {}",
        style.key_value("Release line", &app.release_line().unwrap_or_else(|| "-".to_string()))
    );
    println!(
        "  {}",
        style.key_value("Installed", &style.version(&state.installed_version.short_display()))
    );
    println!("  {}", style.key_value("Detached", &style.flag(state.detached, false)));
    println!("  {}", style.key_value("Compatible", &style.flag(state.compatible, true)));
    println!(
        "  {}",
        style.key_value("Updates available", &style.flag(state.updates_available, false))
    );
    let available: Vec<String> = state.available_versions.iter().map(AppVersion::short_display).collect();
    println!("  {}", style.key_value("Available", &format::format_list(&available)));

    if app.entry().is_none() {
        println!();
        println!("{}", style.message(MessageType::Warn, "App is not in the registry"));
    }
    if state.detached == Some(true) {
        println!();
        println!(
            "{}",
            style.message(
                MessageType::Hint,
                "Local modifications or a foreign commit; `install --force` restores a released version"
            )
        );
    }
    if state.compatible == Some(false) {
        let missing = app.missing_requirements(&state.installed_version);
        println!();
        println!(
            "{}",
            style.message(MessageType::Warn, "Installed version is not compatible with the environment")
        );
        for requirement in missing {
            println!("{}", style.message_detail("Missing", &requirement));
        }
    }
    Ok(())
}

fn handle_install(
    style: &Style,
    manager: &AppManager,
    app_id: &str,
    version: Option<&str>,
    pre: bool,
    force: bool,
    quiet: bool,
) -> Result<(), AppError> {
    let app = manager.app(app_id);
    if app.entry().is_none() {
        return Err(AppError::NotRegistered {
            app: app_id.to_string(),
        });
    }
    ensure_attached(&app, force)?;
    if pre {
        app.set_include_prereleases(true);
    }

    let target = version.map(|v| resolve_version(&app, v)).transpose()?;
    if let Some(target) = &target {
        if *target == app.installed_version() {
            println!(
                "{}",
                style.message(
                    MessageType::Skip,
                    &format!("{} {} is already installed", app_id, target.short_display())
                )
            );
            return Ok(());
        }
    }

    let progress = Progress::spinner(
        &format!("Installing {}...", app_id),
        ProgressMode::detect(quiet, false),
    );
    let state = match app.install(target) {
        Ok(state) => state,
        Err(e) => {
            progress.finish_clear();
            return Err(e);
        }
    };
    progress.finish_with_message(&style.message(
        MessageType::Ok,
        &format!(
            "Installed {} {} ({:.1}s)",
            app_id,
            style.version(&state.installed_version.short_display()),
            progress.elapsed().as_secs_f32()
        ),
    ));
    if state.compatible == Some(false) {
        println!(
            "{}",
            style.message(MessageType::Warn, "This version is not compatible with the environment")
        );
        for requirement in app.missing_requirements(&state.installed_version) {
            println!("{}", style.message_detail("Missing", &requirement));
        }
    }
    Ok(())
}

fn handle_update(
    style: &Style,
    manager: &AppManager,
    app_id: &str,
    force: bool,
    quiet: bool,
) -> Result<(), AppError> {
    let app = manager.app(app_id);
    if !app.is_installed() {
        return Err(AppError::NotInstalled {
            app: app_id.to_string(),
        });
    }
    ensure_attached(&app, force)?;

    let before = app.installed_version();
    let progress = Progress::spinner(&format!("Updating {}...", app_id), ProgressMode::detect(quiet, false));
    let state = match app.update() {
        Ok(state) => state,
        Err(e) => {
            progress.finish_clear();
            return Err(e);
        }
    };
    if state.installed_version == before {
        progress.finish_with_message(&style.message(
            MessageType::Skip,
            &format!("{} is up to date ({})", app_id, before.short_display()),
        ));
    } else {
        progress.finish_with_message(&style.message(
            MessageType::Ok,
            &format!(
                "Updated {} {} -> {}",
                app_id,
                before.short_display(),
                style.version(&state.installed_version.short_display())
            ),
        ));
    }
    Ok(())
}

fn handle_uninstall(style: &Style, manager: &AppManager, app_id: &str, force: bool) -> Result<(), AppError> {
    let app = manager.app(app_id);
    ensure_attached(&app, force)?;
    app.uninstall()?;
    println!(
        "{}",
        style.message(MessageType::Ok, &format!("Uninstalled {}", app_id))
    );
    Ok(())
}

fn handle_releases(
    style: &Style,
    url: &str,
    version: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<(), AppError> {
    let spec = match version {
        Some(version) => ReleaseSpec::Detailed {
            url: url.to_string(),
            version: Some(version),
            environment: None,
            metadata: None,
        },
        None => ReleaseSpec::Url(url.to_string()),
    };
    let app = AppData {
        releases: vec![spec],
        ..Default::default()
    };
    let progress = Progress::spinner(
        &format!("Gathering releases from {}...", url),
        ProgressMode::detect(quiet, json),
    );
    let releases = gather_releases(&app, &AppTreeScanner);
    progress.finish_clear();
    let releases = releases?;

    if json {
        let versioned: Vec<VersionedRelease> = releases
            .into_iter()
            .map(|(version, release)| VersionedRelease { version, release })
            .collect();
        return print_json(&versioned);
    }
    if releases.is_empty() {
        println!("{}", style.message(MessageType::Info, "No releases found"));
        return Ok(());
    }
    let rows: Vec<ReleaseRow> = releases
        .iter()
        .map(|(version, release)| ReleaseRow {
            version: version.clone(),
            url: release.url.clone(),
            requirements: release.environment.python_requirements.len(),
        })
        .collect();
    println!("{}", table::render_releases_table(&rows));
    Ok(())
}

fn handle_registry_build(
    style: &Style,
    data_path: &Path,
    out: &Path,
    quiet: bool,
) -> Result<(), AppError> {
    let data = RegistryData::from_yaml(&fs::read_to_string(data_path)?)?;
    let progress = Progress::spinner("Gathering releases...", ProgressMode::detect(quiet, false));

    let mut releases: BTreeMap<String, Vec<(String, Release)>> = BTreeMap::new();
    for (app_id, app) in &data.apps {
        progress.set_message(&format!("Gathering releases of {}...", app_id));
        match gather_releases(app, &AppTreeScanner) {
            Ok(gathered) => {
                releases.insert(app_id.clone(), gathered);
            }
            Err(e) => {
                tracing::warn!("Skipping releases of '{}': {}", app_id, e);
            }
        }
    }

    progress.set_message("Listing remote refs...");
    let apps_meta = generate_apps_meta(&data, fetch_gitinfo)?;
    let (index, documents) = generate_apps_index(&data.apps, &releases, &data.categories);
    let mut written = build_api_v1(out, &index, &documents)?;
    let meta_path = out.join(APPS_META_FILE);
    fs::write(&meta_path, serde_json::to_string_pretty(&apps_meta)?)?;
    written.push(meta_path);

    progress.finish_with_message(&style.message(
        MessageType::Ok,
        &format!(
            "Wrote {} files ({} apps) to {}",
            written.len(),
            documents.len(),
            style.file_path(&out.display().to_string())
        ),
    ));
    Ok(())
}

fn handle_config_show(style: &Style, manager: &AppManager, json: bool) -> Result<(), AppError> {
    let config = manager.config();
    if json {
        return print_json(config);
    }

    println!("{}", style.message(MessageType::Info, "Resolved configuration:"));
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    let warnings = config.validate()?;
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("{}", style.message(MessageType::Warn, &warning));
        }
    }
    Ok(())
}
