use crate::file_set::{ChangeKind, FileChange, FileSetManager};
use glob::{glob, Pattern};
use kubelog_core::config::WatchConfig;
use kubelog_core::{IngestionError, TailEventSink};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Buffered notify events between the OS watcher thread and the dispatch loop
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Watches a log directory and feeds change batches to a [`FileSetManager`]
pub struct DirectoryWatcher {
    config: WatchConfig,
    pattern: Pattern,
}

impl DirectoryWatcher {
    /// Create a watcher for the configured directory and file name pattern
    pub fn new(config: WatchConfig) -> Result<Self, IngestionError> {
        let pattern = Pattern::new(&config.pattern).map_err(|e| {
            IngestionError::FileWatch(format!("Invalid pattern '{}': {}", config.pattern, e))
        })?;
        Ok(Self { config, pattern })
    }

    /// Watch until `cancel` fires, dispatching every batch to `manager` in order
    ///
    /// Batches are handed over one at a time from this task, so a file never
    /// sees two notifications processed concurrently. Requires a multi-threaded
    /// runtime since tailing is blocking file I/O.
    pub async fn run<S: TailEventSink>(
        self,
        mut manager: FileSetManager<S>,
        cancel: CancellationToken,
    ) -> Result<FileSetManager<S>, IngestionError> {
        let (async_tx, mut async_rx) = mpsc::channel::<notify::Result<Event>>(EVENT_CHANNEL_SIZE);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // Sync callback on the notify thread
                let _ = async_tx.blocking_send(res);
            },
            Config::default(),
        )
        .map_err(|e| IngestionError::FileWatch(format!("Failed to create file watcher: {}", e)))?;

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&self.config.directory, mode).map_err(|e| {
            IngestionError::FileWatch(format!(
                "Failed to watch directory {:?}: {}",
                self.config.directory, e
            ))
        })?;
        info!(directory = %self.config.directory.display(), pattern = %self.config.pattern, "Watching log directory");

        if self.config.scan_existing {
            let existing = self.scan_existing()?;
            info!(count = existing.len(), "Tracking existing log files");
            tokio::task::block_in_place(|| manager.handle_file_changes(&existing));
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = async_rx.recv() => event,
            };

            match event {
                Some(Ok(event)) => {
                    let batch = self.to_file_changes(&event);
                    if batch.is_empty() {
                        continue;
                    }
                    debug!(changes = batch.len(), "Dispatching file changes");
                    tokio::task::block_in_place(|| manager.handle_file_changes(&batch));
                }
                Some(Err(e)) => error!(error = %e, "File watch error"),
                None => {
                    warn!("File watcher channel closed");
                    break;
                }
            }
        }

        info!("Directory watcher stopped");
        Ok(manager)
    }

    /// Created notifications for matching files already in the directory
    fn scan_existing(&self) -> Result<Vec<FileChange>, IngestionError> {
        let directory = Pattern::escape(&self.config.directory.to_string_lossy());
        let pattern = if self.config.recursive {
            format!("{}/**/{}", directory, self.config.pattern)
        } else {
            format!("{}/{}", directory, self.config.pattern)
        };

        let entries = glob(&pattern).map_err(|e| {
            IngestionError::FileWatch(format!("Invalid glob pattern '{}': {}", pattern, e))
        })?;
        let mut files: Vec<PathBuf> = entries.flatten().filter(|entry| entry.is_file()).collect();
        files.sort();
        files.dedup();

        Ok(files
            .into_iter()
            .map(|path| FileChange::new(path, ChangeKind::Created))
            .collect())
    }

    /// Whether the file name of `path` matches the configured pattern
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.pattern.matches(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    /// Translate a notify event into an ordered batch of file changes
    pub fn to_file_changes(&self, event: &Event) -> Vec<FileChange> {
        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                ChangeKind::Created
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                ChangeKind::Deleted
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                // Paths are [from, to]
                return event
                    .paths
                    .iter()
                    .zip([ChangeKind::Deleted, ChangeKind::Created])
                    .filter(|(path, _)| self.matches(path))
                    .map(|(path, kind)| FileChange::new(path, kind))
                    .collect();
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
            EventKind::Modify(_) => ChangeKind::Changed,
            _ => {
                debug!(kind = ?event.kind, "Ignoring file event");
                return Vec::new();
            }
        };

        event
            .paths
            .iter()
            .filter(|path| self.matches(path))
            .map(|path| FileChange::new(path, kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubelog_core::config::TailConfig;
    use kubelog_core::{TailEvent, TailEventSink};
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn watcher(pattern: &str) -> DirectoryWatcher {
        DirectoryWatcher::new(WatchConfig {
            directory: PathBuf::from("/var/log/containers"),
            pattern: pattern.to_string(),
            ..WatchConfig::default()
        })
        .unwrap()
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_invalid_pattern() {
        let result = DirectoryWatcher::new(WatchConfig {
            pattern: "[".to_string(),
            ..WatchConfig::default()
        });
        assert!(matches!(result, Err(IngestionError::FileWatch(_))));
    }

    #[test]
    fn test_matches_file_name_only() {
        let watcher = watcher("*.log");
        assert!(watcher.matches(Path::new("/var/log/containers/web-1_default_app.log")));
        assert!(!watcher.matches(Path::new("/var/log/containers/web-1.log.gz")));
        assert!(!watcher.matches(Path::new("/")));
    }

    #[test]
    fn test_translate_basic_kinds() {
        let watcher = watcher("*.log");
        let path = "/var/log/containers/a.log";

        let created = watcher.to_file_changes(&event(EventKind::Create(CreateKind::File), &[path]));
        assert_eq!(created, vec![FileChange::new(path, ChangeKind::Created)]);

        let removed = watcher.to_file_changes(&event(EventKind::Remove(RemoveKind::File), &[path]));
        assert_eq!(removed, vec![FileChange::new(path, ChangeKind::Deleted)]);

        let modified = watcher.to_file_changes(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &[path],
        ));
        assert_eq!(modified, vec![FileChange::new(path, ChangeKind::Changed)]);
    }

    #[test]
    fn test_translate_ignores_metadata_access_and_other_files() {
        let watcher = watcher("*.log");
        let metadata = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/var/log/containers/a.log"],
        );
        assert!(watcher.to_file_changes(&metadata).is_empty());

        let access = event(EventKind::Access(AccessKind::Any), &["/var/log/containers/a.log"]);
        assert!(watcher.to_file_changes(&access).is_empty());

        let other = event(EventKind::Create(CreateKind::File), &["/var/log/containers/a.txt"]);
        assert!(watcher.to_file_changes(&other).is_empty());
    }

    #[test]
    fn test_translate_rename_both() {
        let watcher = watcher("*.log");
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/var/log/containers/a.log", "/var/log/containers/b.log"],
        );
        assert_eq!(
            watcher.to_file_changes(&renamed),
            vec![
                FileChange::new("/var/log/containers/a.log", ChangeKind::Deleted),
                FileChange::new("/var/log/containers/b.log", ChangeKind::Created),
            ]
        );

        // Rotation to a name outside the pattern only removes the old file
        let rotated = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/var/log/containers/a.log", "/var/log/containers/a.log.1"],
        );
        assert_eq!(
            watcher.to_file_changes(&rotated),
            vec![FileChange::new("/var/log/containers/a.log", ChangeKind::Deleted)]
        );
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<String>);

    impl TailEventSink for CollectingSink {
        fn post(&self, event: TailEvent) {
            if let TailEvent::Lines(entry) = event {
                self.0.lock().unwrap().push_str(&entry.lines);
            }
        }
    }

    #[test]
    fn test_scan_existing_honours_recursion() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("pod-a");
        std::fs::create_dir(&nested).unwrap();
        std::fs::File::create(dir.path().join("top.log")).unwrap();
        std::fs::File::create(dir.path().join("notes.txt")).unwrap();
        std::fs::File::create(nested.join("inner.log")).unwrap();

        let flat = DirectoryWatcher::new(WatchConfig {
            directory: dir.path().to_path_buf(),
            ..WatchConfig::default()
        })
        .unwrap();
        assert_eq!(
            flat.scan_existing().unwrap(),
            vec![FileChange::new(dir.path().join("top.log"), ChangeKind::Created)]
        );

        let recursive = DirectoryWatcher::new(WatchConfig {
            directory: dir.path().to_path_buf(),
            recursive: true,
            ..WatchConfig::default()
        })
        .unwrap();
        let mut found: Vec<PathBuf> = recursive
            .scan_existing()
            .unwrap()
            .into_iter()
            .map(|change| change.path)
            .collect();
        found.sort();
        assert_eq!(found, vec![nested.join("inner.log"), dir.path().join("top.log")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_tracks_existing_files_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "existing").unwrap();
        std::fs::File::create(dir.path().join("ignored.txt")).unwrap();

        let watcher = DirectoryWatcher::new(WatchConfig {
            directory: dir.path().to_path_buf(),
            ..WatchConfig::default()
        })
        .unwrap();
        let sink = Arc::new(CollectingSink::default());
        let manager = FileSetManager::new(TailConfig::default(), sink.clone());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(watcher.run(manager, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        let manager = handle.await.unwrap().unwrap();
        assert!(manager.is_tracked(&path));
        assert_eq!(manager.tracked_count(), 1);
    }
}
