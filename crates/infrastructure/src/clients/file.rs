use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use strata_core::{ChangeCallback, Client, ClientConfig, StrataError, StrataResult};

/// Local files.
///
/// Watching registers the file's parent directory with the platform
/// notifier, so editors that replace files through a rename are seen as
/// well. A burst of notifications for one file is collapsed into a
/// single re-read after the debounce interval.
pub struct FileClient {
    shared: Arc<WatchState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

#[derive(Default)]
struct WatchState {
    callbacks: Mutex<HashMap<PathBuf, ChangeCallback>>,
    directories: Mutex<HashSet<PathBuf>>,
}

impl FileClient {
    pub fn new(config: &ClientConfig) -> StrataResult<Self> {
        let shared = Arc::new(WatchState::default());
        let watcher = if config.watch_disabled {
            None
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            let state = Arc::clone(&shared);
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => state.on_event(event, &tx),
                Err(e) => error!(error = %e, "file watcher error"),
            }) {
                Ok(w) => {
                    spawn_reloader(Arc::clone(&shared), rx, config.debounce);
                    Some(w)
                }
                Err(e) => {
                    warn!(error = %e, "cannot create file watcher, watching disabled");
                    None
                }
            }
        };
        Ok(Self {
            shared,
            watcher: Mutex::new(watcher),
        })
    }
}

/// Absolute form of `path` that matches what the notifier reports, also
/// for files that do not exist yet.
fn resolve(path: &Path) -> StrataResult<PathBuf> {
    if let Ok(full) = path.canonicalize() {
        return Ok(full);
    }
    let name = path
        .file_name()
        .ok_or_else(|| StrataError::config_error(format!("not a file path: {}", path.display())))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(parent.canonicalize()?.join(name))
}

impl WatchState {
    fn on_event(&self, event: notify::Event, reloads: &mpsc::UnboundedSender<PathBuf>) {
        let relevant = matches!(
            event.kind,
            EventKind::Create(_)
                | EventKind::Modify(ModifyKind::Data(_))
                | EventKind::Modify(ModifyKind::Name(_))
                | EventKind::Modify(ModifyKind::Any)
        );
        if !relevant {
            return;
        }
        for path in event.paths {
            if self.callbacks.lock().contains_key(&path) {
                let _ = reloads.send(path);
            }
        }
    }

    async fn reload(&self, path: &Path) {
        let Some(on_change) = self.callbacks.lock().get(path).cloned() else {
            return;
        };
        match tokio::fs::read(path).await {
            Ok(data) => on_change(data),
            Err(e) => debug!(path = %path.display(), error = %e, "changed file is not readable yet"),
        }
    }
}

/// Run the debounce loop on the current runtime, or on a dedicated
/// thread with its own runtime when there is none.
fn spawn_reloader(state: Arc<WatchState>, rx: mpsc::UnboundedReceiver<PathBuf>, debounce: Duration) {
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(debounce_reloads(state, rx, debounce));
        return;
    }
    let spawned = std::thread::Builder::new()
        .name("strata-file-reload".to_string())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime.block_on(debounce_reloads(state, rx, debounce)),
                Err(e) => error!(error = %e, "cannot start file reload runtime"),
            }
        });
    if let Err(e) = spawned {
        error!(error = %e, "cannot start file reload thread");
    }
}

/// Re-read each changed file once it has been quiet for `debounce`.
/// Ends when the watcher, and with it the sender, is dropped.
async fn debounce_reloads(
    state: Arc<WatchState>,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
) {
    let mut due: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        let next = due.values().min().copied();
        tokio::select! {
            received = rx.recv() => match received {
                Some(path) => {
                    due.insert(path, Instant::now() + debounce);
                }
                None => break,
            },
            _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                let now = Instant::now();
                let ready: Vec<PathBuf> = due
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in ready {
                    due.remove(&path);
                    state.reload(&path).await;
                }
            }
        }
    }
    debug!("file reload loop stopped");
}

#[async_trait]
impl Client for FileClient {
    fn name(&self) -> &str {
        super::FILE
    }

    async fn pull(&self, path: &str) -> StrataResult<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn push(&self, path: &str, data: &[u8]) -> StrataResult<()> {
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    fn watch(&self, path: &str, on_change: ChangeCallback) -> StrataResult<()> {
        let mut watcher = self.watcher.lock();
        let Some(watcher) = watcher.as_mut() else {
            return Err(StrataError::WatchDisabled);
        };

        let full = resolve(Path::new(path))?;
        {
            let mut callbacks = self.shared.callbacks.lock();
            if callbacks.contains_key(&full) {
                return Ok(());
            }
            callbacks.insert(full.clone(), on_change);
        }

        let dir = full.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
        if self.shared.directories.lock().insert(dir.clone()) {
            if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                self.shared.directories.lock().remove(&dir);
                self.shared.callbacks.lock().remove(&full);
                return Err(StrataError::Internal(format!(
                    "cannot watch {}: {e}",
                    dir.display()
                )));
            }
        }
        debug!(path = %full.display(), "watching file");
        Ok(())
    }

    fn close(&self) -> StrataResult<()> {
        self.watcher.lock().take();
        self.shared.callbacks.lock().clear();
        self.shared.directories.lock().clear();
        Ok(())
    }
}
