//! Debounced filesystem watching.
//!
//! `notify-debouncer-mini` settles each path on its own. A window thread per
//! root then folds every settled batch that lands inside one debounce window
//! into a single change callback, so edits to several files still surface
//! once. Directory events are dropped, including removals of directories
//! known to the window.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tracing::{debug, warn};

/// Default debounce window
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Lower bound for the per-path settle time
const MIN_SETTLE: Duration = Duration::from_millis(10);

/// An active watch subscription on one root.
///
/// Dropping the handle also stops notifications; `release` makes the
/// teardown explicit and logs it.
pub struct WatchHandle {
    root: PathBuf,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl WatchHandle {
    /// The watched root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unsubscribe and stop the debouncer thread
    pub fn release(mut self) {
        if let Some(mut debouncer) = self.debouncer.take() {
            if let Err(e) = debouncer.watcher().unwatch(&self.root) {
                debug!(root = %self.root.display(), error = %e, "Unwatch failed");
            }
        }
        debug!(root = %self.root.display(), "Released watcher");
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .field("active", &self.debouncer.is_some())
            .finish()
    }
}

/// Watch `root` recursively, calling `on_change` with the first changed
/// file of each debounce window.
pub fn watch<F>(root: &Path, debounce: Duration, on_change: F) -> notify::Result<WatchHandle>
where
    F: Fn(PathBuf) + Send + 'static,
{
    let window = ChangeWindow::new(root, debounce);
    let (batches, settled) = mpsc::channel::<Vec<PathBuf>>();

    let mut debouncer = new_debouncer(settle_time(debounce), move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                // Fails only after the window thread has exited
                let _ = batches.send(events.into_iter().map(|e| e.path).collect());
            }
            Err(e) => warn!("Watcher error: {:?}", e),
        }
    })?;

    debouncer
        .watcher()
        .watch(root, RecursiveMode::Recursive)?;

    thread::Builder::new()
        .name("kiln-watch".into())
        .spawn(move || window.run(settled, on_change))
        .map_err(notify::Error::io)?;

    debug!(root = %root.display(), debounce_ms = debounce.as_millis() as u64, "Watching");

    Ok(WatchHandle {
        root: root.to_path_buf(),
        debouncer: Some(debouncer),
    })
}

/// Per-path settle time; a fraction of the root window
fn settle_time(debounce: Duration) -> Duration {
    (debounce / 4).max(MIN_SETTLE)
}

/// Folds settled batches into at most one callback per window
struct ChangeWindow {
    window: Duration,
    directories: HashSet<PathBuf>,
}

impl ChangeWindow {
    fn new(root: &Path, window: Duration) -> Self {
        Self {
            window,
            directories: directories_under(root),
        }
    }

    /// Deliver one change per window until the watcher goes away
    fn run<F: Fn(PathBuf)>(mut self, batches: Receiver<Vec<PathBuf>>, on_change: F) {
        while let Ok(batch) = batches.recv() {
            let Some(first) = self.first_file_change(batch) else {
                continue;
            };

            let deadline = Instant::now() + self.window;
            if !self.absorb_until(deadline, &batches) {
                break;
            }
            on_change(first);
        }
        debug!("Change window closed");
    }

    /// Swallow batches arriving before `deadline`; false once the sender is gone
    fn absorb_until(&mut self, deadline: Instant, batches: &Receiver<Vec<PathBuf>>) -> bool {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match batches.recv_timeout(remaining) {
                Ok(batch) => {
                    self.first_file_change(batch);
                }
                Err(RecvTimeoutError::Timeout) => return true,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// Track directories seen in the batch and return its first file path
    fn first_file_change(&mut self, batch: Vec<PathBuf>) -> Option<PathBuf> {
        let mut first = None;
        for path in batch {
            if path.is_dir() {
                self.directories.insert(path);
                continue;
            }
            // A directory that was removed
            if self.directories.remove(&path) {
                continue;
            }
            if first.is_none() {
                first = Some(path);
            }
        }
        first
    }
}

/// Every directory under `root`, root included
fn directories_under(root: &Path) -> HashSet<PathBuf> {
    let mut found = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                pending.push(entry.path());
            }
        }
        found.insert(dir);
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn collect_window(
        window: Duration,
        batches: Vec<(Duration, Vec<PathBuf>)>,
        linger: Duration,
    ) -> Vec<PathBuf> {
        let temp = TempDir::new().unwrap();
        let changes = ChangeWindow::new(temp.path(), window);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || changes.run(rx, move |p| sink.lock().unwrap().push(p)));

        for (delay, batch) in batches {
            thread::sleep(delay);
            tx.send(batch).unwrap();
        }
        thread::sleep(linger);
        drop(tx);
        worker.join().unwrap();

        let seen = seen.lock().unwrap().clone();
        seen
    }

    #[test]
    fn test_directory_events_are_suppressed() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();
        std::fs::create_dir(temp.path().join("gone")).unwrap();

        let mut window = ChangeWindow::new(temp.path(), DEFAULT_DEBOUNCE);
        assert_eq!(window.first_file_change(vec![temp.path().to_path_buf()]), None);
        assert_eq!(
            window.first_file_change(vec![temp.path().to_path_buf(), file.clone()]),
            Some(file.clone())
        );

        std::fs::remove_dir(temp.path().join("gone")).unwrap();
        assert_eq!(window.first_file_change(vec![temp.path().join("gone")]), None);

        // Removed files are still changes
        std::fs::remove_file(&file).unwrap();
        assert_eq!(window.first_file_change(vec![file.clone()]), Some(file));
    }

    #[test]
    fn test_batches_inside_one_window_fold_into_one_change() {
        let seen = collect_window(
            Duration::from_millis(300),
            vec![
                (Duration::ZERO, vec![PathBuf::from("/w/a.txt")]),
                (Duration::from_millis(100), vec![PathBuf::from("/w/b.txt")]),
            ],
            Duration::from_millis(500),
        );
        assert_eq!(seen, vec![PathBuf::from("/w/a.txt")]);
    }

    #[test]
    fn test_batches_in_separate_windows_each_report() {
        let seen = collect_window(
            Duration::from_millis(100),
            vec![
                (Duration::ZERO, vec![PathBuf::from("/w/a.txt")]),
                (Duration::from_millis(300), vec![PathBuf::from("/w/b.txt")]),
            ],
            Duration::from_millis(300),
        );
        assert_eq!(seen, vec![PathBuf::from("/w/a.txt"), PathBuf::from("/w/b.txt")]);
    }

    #[test]
    fn test_settle_time_is_a_fraction_of_the_window() {
        assert_eq!(settle_time(Duration::from_millis(1000)), Duration::from_millis(250));
        assert_eq!(settle_time(Duration::from_millis(8)), MIN_SETTLE);
    }
}
