//! Background refresh of one app on filesystem changes.
//!
//! One thread per watched app. At every poll point it checks whether the app
//! directory exists, (re)starts or drops the filesystem watcher accordingly,
//! and refreshes the app when something changed. Stopping is explicit through
//! [`WatchHandle::stop`], which the loop observes at its next poll point.

use std::io;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};

use crate::app::App;
use crate::errors::AppError;

type FsEvent = notify::Result<Event>;

/// Watches one app and refreshes it on changes.
pub struct AppWatch;

impl AppWatch {
    /// Spawn the watch thread for `app`.
    pub fn start(app: App, poll_interval: Duration) -> Result<WatchHandle, AppError> {
        let (stop_tx, stop_rx) = bounded(1);
        let join = thread::Builder::new()
            .name(format!("alab-watch-{}", app.id()))
            .spawn(move || watch_loop(app, poll_interval, stop_rx))?;
        Ok(WatchHandle {
            stop_tx,
            join: Some(join),
        })
    }
}

/// Owner of a running watch thread. Dropping it stops the thread.
pub struct WatchHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Ask the thread to stop at its next poll point.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Stop and wait for the thread to finish.
    pub fn join(mut self) {
        self.stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("App watch thread panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(app: App, poll_interval: Duration, stop_rx: Receiver<()>) {
    let (event_tx, event_rx) = unbounded::<FsEvent>();
    let mut watcher: Option<Box<dyn Watcher>> = None;
    let mut existed: Option<bool> = None;
    let mut pending = true;

    tracing::debug!("Watching '{}' at {}", app.id(), app.path().display());
    loop {
        let exists = app.path().exists();
        if existed != Some(exists) {
            existed = Some(exists);
            pending = true;
            watcher = if exists {
                start_watcher(app.path(), poll_interval, &event_tx)
            } else {
                None
            };
        }
        if pending && app.refresh().is_some() {
            pending = false;
        }

        select! {
            recv(stop_rx) -> _ => break,
            recv(event_rx) -> event => match event {
                Ok(Ok(event)) if ignored(&event) => {}
                Ok(Ok(_)) => pending = true,
                Ok(Err(e)) => tracing::warn!("Watch error for '{}': {}", app.id(), e),
                Err(_) => break,
            },
            default(poll_interval) => {}
        }
    }
    drop(watcher);
    tracing::debug!("Stopped watching '{}'", app.id());
}

/// Native watcher on `path`, or a polling one when native watch resources
/// are exhausted.
fn start_watcher(
    path: &Path,
    poll_interval: Duration,
    events: &Sender<FsEvent>,
) -> Option<Box<dyn Watcher>> {
    let tx = events.clone();
    let native = notify::recommended_watcher(move |event: FsEvent| {
        let _ = tx.send(event);
    })
    .and_then(|mut w| w.watch(path, RecursiveMode::Recursive).map(|()| w));

    match native {
        Ok(w) => Some(Box::new(w)),
        Err(e) if exhausted(&e) => {
            tracing::warn!("Native file watching unavailable ({}), polling {}", e, path.display());
            let tx = events.clone();
            let config = notify::Config::default().with_poll_interval(poll_interval);
            PollWatcher::new(
                move |event: FsEvent| {
                    let _ = tx.send(event);
                },
                config,
            )
            .and_then(|mut w| w.watch(path, RecursiveMode::Recursive).map(|()| w))
            .map(|w| Box::new(w) as Box<dyn Watcher>)
            .map_err(|e| tracing::warn!("Cannot watch {}: {}", path.display(), e))
            .ok()
        }
        Err(e) => {
            tracing::warn!("Cannot watch {}: {}", path.display(), e);
            None
        }
    }
}

/// Access events and git's own index rewrites (e.g. from `git status`
/// during a refresh) do not change app state.
fn ignored(event: &Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return true;
    }
    !event.paths.is_empty()
        && event.paths.iter().all(|p| {
            let in_git_dir = p.components().any(|c| c.as_os_str() == ".git");
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            in_git_dir && (name == "index" || name == "index.lock")
        })
}

fn exhausted(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::MaxFilesWatch => true,
        notify::ErrorKind::Io(io) => {
            io.kind() == io::ErrorKind::ResourceBusy || io.raw_os_error() == Some(28)
        }
        _ => false,
    }
}
