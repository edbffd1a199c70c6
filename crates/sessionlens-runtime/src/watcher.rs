//! Debounced file-system watching.
//!
//! Raw notify events are coalesced per path with a 100 ms timer and
//! classified into three logical kinds: root changed, project directory
//! changed, session file changed. Session files are watched only while
//! the coordinator has registered interest in them, and their watches are
//! re-armed on emission for backends that drop a path after firing.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tracing::debug;

/// Coalescing window per watched path.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Poll interval of the underlying watcher backend.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    RootChanged,
    ProjectDirChanged(PathBuf),
    SessionFileChanged(PathBuf),
}

enum WorkerMsg {
    Fs(Event),
    SetRoot(PathBuf),
    SetProjectDirs(Vec<PathBuf>),
    AddSession(PathBuf),
    RemoveSession(PathBuf),
}

struct WatchScope {
    root: Option<PathBuf>,
    project_dirs: HashSet<PathBuf>,
    session_files: HashSet<PathBuf>,
}

pub struct FileWatcher {
    watcher: Arc<Mutex<PollWatcher>>,
    worker_tx: Sender<WorkerMsg>,
    rx: Receiver<WatchEvent>,
    root: Option<PathBuf>,
    project_dirs: Vec<PathBuf>,
    session_files: HashSet<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (worker_tx, worker_rx) = channel();
        let (event_tx, event_rx) = channel();

        let fs_tx = worker_tx.clone();
        let config = notify::Config::default().with_poll_interval(POLL_INTERVAL);
        let watcher = PollWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = fs_tx.send(WorkerMsg::Fs(event));
                }
            },
            config,
        )?;
        let watcher = Arc::new(Mutex::new(watcher));

        let rearm_watcher = Arc::clone(&watcher);
        std::thread::Builder::new()
            .name("sessionlens-watcher".to_string())
            .spawn(move || debounce_loop(worker_rx, event_tx, rearm_watcher))?;

        Ok(Self {
            watcher,
            worker_tx,
            rx: event_rx,
            root: None,
            project_dirs: Vec::new(),
            session_files: HashSet::new(),
        })
    }

    /// Watch exactly one root; replaces any previous root.
    pub fn start(&mut self, root: &Path) -> Result<()> {
        if let Some(old) = self.root.take() {
            let _ = self.lock_watcher().unwatch(&old);
        }
        self.lock_watcher().watch(root, RecursiveMode::NonRecursive)?;
        self.root = Some(root.to_path_buf());
        let _ = self.worker_tx.send(WorkerMsg::SetRoot(root.to_path_buf()));
        Ok(())
    }

    /// Watch the given project directories, dropping old ones.
    pub fn watch_project_dirs(&mut self, dirs: &[PathBuf]) {
        {
            let mut watcher = self.lock_watcher();
            for old in &self.project_dirs {
                let _ = watcher.unwatch(old);
            }
            for dir in dirs {
                if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                    debug!(dir = %dir.display(), %err, "cannot watch project dir");
                }
            }
        }
        self.project_dirs = dirs.to_vec();
        let _ = self.worker_tx.send(WorkerMsg::SetProjectDirs(dirs.to_vec()));
    }

    pub fn watch_session(&mut self, path: &Path) {
        if self.session_files.contains(path) {
            return;
        }
        if let Err(err) = self.lock_watcher().watch(path, RecursiveMode::NonRecursive) {
            debug!(path = %path.display(), %err, "cannot watch session file");
            return;
        }
        self.session_files.insert(path.to_path_buf());
        let _ = self.worker_tx.send(WorkerMsg::AddSession(path.to_path_buf()));
    }

    pub fn unwatch_session(&mut self, path: &Path) {
        if self.session_files.remove(path) {
            let _ = self.lock_watcher().unwatch(path);
            let _ = self.worker_tx.send(WorkerMsg::RemoveSession(path.to_path_buf()));
        }
    }

    pub fn receiver(&self) -> &Receiver<WatchEvent> {
        &self.rx
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, PollWatcher> {
        self.watcher.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn debounce_loop(
    rx: Receiver<WorkerMsg>,
    tx: Sender<WatchEvent>,
    watcher: Arc<Mutex<PollWatcher>>,
) {
    let mut scope =
        WatchScope { root: None, project_dirs: HashSet::new(), session_files: HashSet::new() };
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        let timeout = pending
            .values()
            .min()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::from_secs(1));

        match rx.recv_timeout(timeout) {
            Ok(WorkerMsg::Fs(event)) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
                {
                    for path in event.paths {
                        // A new raw event re-arms the coalescing timer
                        pending.insert(path, Instant::now() + DEBOUNCE_WINDOW);
                    }
                }
            }
            Ok(WorkerMsg::SetRoot(root)) => scope.root = Some(root),
            Ok(WorkerMsg::SetProjectDirs(dirs)) => {
                scope.project_dirs = dirs.into_iter().collect();
            }
            Ok(WorkerMsg::AddSession(path)) => {
                scope.session_files.insert(path);
            }
            Ok(WorkerMsg::RemoveSession(path)) => {
                scope.session_files.remove(&path);
                pending.remove(&path);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }

        let now = Instant::now();
        let due: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        for path in due {
            pending.remove(&path);

            if scope.session_files.contains(&path) && path.exists() {
                // Some backends drop a file from the watch set after
                // firing; re-adding is a no-op elsewhere.
                let mut guard = watcher.lock().unwrap_or_else(|e| e.into_inner());
                let _ = guard.watch(&path, RecursiveMode::NonRecursive);
            }

            if let Some(event) = classify(&path, &scope)
                && tx.send(event).is_err()
            {
                return;
            }
        }
    }
}

/// Map a raw path to its logical event.
fn classify(path: &Path, scope: &WatchScope) -> Option<WatchEvent> {
    if scope.session_files.contains(path) {
        return Some(WatchEvent::SessionFileChanged(path.to_path_buf()));
    }
    if let Some(root) = &scope.root
        && path == root.as_path()
    {
        return Some(WatchEvent::RootChanged);
    }
    if scope.project_dirs.contains(path) {
        return Some(WatchEvent::ProjectDirChanged(path.to_path_buf()));
    }

    // Child paths reported for a watched directory
    if let Some(parent) = path.parent() {
        if scope.project_dirs.contains(parent) {
            return Some(WatchEvent::ProjectDirChanged(parent.to_path_buf()));
        }
        if let Some(root) = &scope.root
            && parent == root.as_path()
        {
            return Some(WatchEvent::RootChanged);
        }
    }

    None
}
