use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::catalog::DirectorySet;

/// Quiet period after the last raw filesystem event before a change signal
/// is emitted.
pub const QUIET_PERIOD: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    Changed,
}

/// Watches the library roots the last scan used and collapses bursts of
/// filesystem events into a single debounced [`LibraryEvent::Changed`].
///
/// The raw notifier runs on its own thread and only forwards ticks into the
/// debounce task; no library state is touched from there. Must be created
/// inside a tokio runtime.
pub struct LibraryWatcher {
    raw_tx: mpsc::UnboundedSender<()>,
    signal: broadcast::Sender<LibraryEvent>,
    watcher: Option<RecommendedWatcher>,
    armed: DirectorySet,
    rearms: u64,
    debounce: JoinHandle<()>,
}

impl LibraryWatcher {
    pub fn new() -> Self {
        Self::with_quiet_period(QUIET_PERIOD)
    }

    pub fn with_quiet_period(quiet: Duration) -> Self {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<()>();
        let (signal, _) = broadcast::channel(8);
        let tx = signal.clone();
        // Timer-owning debounce loop: every raw tick rearms the quiet
        // window; only quiescence emits the signal.
        let debounce = tokio::spawn(async move {
            while raw_rx.recv().await.is_some() {
                loop {
                    match time::timeout(quiet, raw_rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_) => {
                            let _ = tx.send(LibraryEvent::Changed);
                            break;
                        }
                    }
                }
            }
        });
        Self {
            raw_tx,
            signal,
            watcher: None,
            armed: DirectorySet::new(),
            rearms: 0,
            debounce,
        }
    }

    /// Receiver for debounced change signals.
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.signal.subscribe()
    }

    pub fn watched(&self) -> &DirectorySet {
        &self.armed
    }

    /// Registers recursive watches on `directories`. A request equal to the
    /// currently armed set is a no-op; anything else tears the old watches
    /// down first. A directory that fails to register is skipped without
    /// aborting the rest.
    pub fn update_watches(&mut self, directories: &DirectorySet) {
        if *directories == self.armed {
            return;
        }

        self.watcher = None;
        self.armed = directories.clone();
        self.rearms += 1;

        let tx = self.raw_tx.clone();
        let mut watcher =
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else { return };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                if event.paths.iter().any(|path| !path.is_dir()) {
                    let _ = tx.send(());
                }
            }) {
                Ok(watcher) => watcher,
                Err(err) => {
                    warn!(%err, "failed to create filesystem watcher");
                    return;
                }
            };

        for dir in directories {
            if !dir.is_dir() {
                continue;
            }
            if let Err(err) = watcher.watch(dir, RecursiveMode::Recursive) {
                warn!(dir = %dir.display(), %err, "failed to watch directory");
            }
        }
        debug!(count = directories.len(), "library watches armed");
        self.watcher = Some(watcher);
    }

    /// Deregisters all watches. Idempotent.
    pub fn stop(&mut self) {
        self.watcher = None;
        self.armed.clear();
    }
}

impl Default for LibraryWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.debounce.abort();
    }
}
