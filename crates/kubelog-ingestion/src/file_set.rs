use crate::reader::TailingFile;
use kubelog_core::config::TailConfig;
use kubelog_core::{IngestionError, RawLogEntry, TailEvent, TailEventSink};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Kind of change reported for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Deleted,
    Changed,
}

/// A single file change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// A file currently being tailed
struct TrackedFile {
    /// Source name attached to emitted entries
    source: String,
    reader: TailingFile,
}

/// Owns the set of tailed files and turns change notifications into log batches
///
/// Notifications must be delivered through one `&mut self` path at a time;
/// this is what keeps each file's cursor advancing in order.
pub struct FileSetManager<S> {
    config: TailConfig,
    sink: S,
    files: HashMap<PathBuf, TrackedFile>,
    /// Replaced on every add/remove so handed-out snapshots never change
    snapshot: Arc<HashSet<PathBuf>>,
}

impl<S: TailEventSink> FileSetManager<S> {
    /// Create an empty manager forwarding events to `sink`
    pub fn new(config: TailConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            files: HashMap::new(),
            snapshot: Arc::new(HashSet::new()),
        }
    }

    /// Process a batch of notifications in order
    ///
    /// A failure on one notification is logged and does not stop the rest of the batch.
    pub fn handle_file_changes(&mut self, changes: &[FileChange]) {
        for change in changes {
            let result = match change.kind {
                ChangeKind::Created => self.add_file(&change.path),
                ChangeKind::Deleted => {
                    self.remove_file(&change.path);
                    Ok(())
                }
                ChangeKind::Changed => self.file_changed(&change.path),
            };

            if let Err(e) = result {
                error!(path = %change.path.display(), kind = ?change.kind, error = %e, "Error handling file change");
            }
        }
    }

    /// Names of the currently tracked files
    pub fn snapshot(&self) -> Arc<HashSet<PathBuf>> {
        Arc::clone(&self.snapshot)
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn tracked_count(&self) -> usize {
        self.files.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn add_file(&mut self, path: &Path) -> Result<(), IngestionError> {
        if self.files.contains_key(path) {
            debug!(path = %path.display(), "File already tracked");
            return Ok(());
        }

        let reader = TailingFile::open(path, &self.config)?;
        info!(path = %path.display(), cursor = ?reader.cursor(), "Tracking file");

        let tracked = TrackedFile {
            source: source_name(path),
            reader,
        };
        self.files.insert(path.to_path_buf(), tracked);
        self.refresh_snapshot();
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) {
        // Dropping the tracked file closes its handle
        if self.files.remove(path).is_some() {
            info!(path = %path.display(), "Stopped tracking file");
            self.refresh_snapshot();
        }
    }

    fn file_changed(&mut self, path: &Path) -> Result<(), IngestionError> {
        let file = source_name(path);
        self.sink.post(TailEvent::ScanStarted { file: file.clone() });
        let result = self.drain_file(path);
        self.sink.post(TailEvent::ScanCompleted { file });
        result
    }

    fn drain_file(&mut self, path: &Path) -> Result<(), IngestionError> {
        if !self.files.contains_key(path) {
            debug!(path = %path.display(), "Change on untracked file, tracking it now");
            self.add_file(path)?;
        }

        let Some(tracked) = self.files.get_mut(path) else {
            return Ok(());
        };

        let mut reads = 0;
        loop {
            let chunk = tracked.reader.read_new_lines(self.config.read_cap_bytes);
            reads += 1;

            let overflowed = chunk.overflowed();
            if !chunk.is_empty() {
                self.sink
                    .post(TailEvent::Lines(RawLogEntry::new(tracked.source.clone(), chunk.text)));
            }

            if !overflowed {
                break;
            }
            if reads >= self.config.max_reads_per_change {
                warn!(path = %path.display(), reads, "Read limit reached for a single change, remaining content deferred");
                break;
            }
        }

        Ok(())
    }

    fn refresh_snapshot(&mut self) {
        self.snapshot = Arc::new(self.files.keys().cloned().collect());
    }
}

/// Source name attached to entries read from `path`
fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<TailEvent>>,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<(String, String)> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|event| match event {
                    TailEvent::Lines(entry) => Some((entry.source.clone(), entry.lines.clone())),
                    _ => None,
                })
                .collect()
        }

        fn take(&self) -> Vec<TailEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl TailEventSink for RecordingSink {
        fn post(&self, event: TailEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn manager(config: TailConfig) -> FileSetManager<Arc<RecordingSink>> {
        FileSetManager::new(config, Arc::new(RecordingSink::default()))
    }

    fn append(path: &Path, content: &str) {
        let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_create_change_delete_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.log");
        append(&path, "boot\n");

        let mut manager = manager(TailConfig::default());
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Created)]);
        assert!(manager.is_tracked(&path));
        assert!(manager.snapshot().contains(&path));

        append(&path, "request 1\nrequest 2\n");
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);

        let events = manager.sink().take();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            TailEvent::ScanStarted {
                file: "web.log".to_string()
            }
        );
        match &events[1] {
            TailEvent::Lines(entry) => {
                assert_eq!(entry.source, "web.log");
                assert_eq!(entry.lines, "boot\nrequest 1\nrequest 2\n");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            events[2],
            TailEvent::ScanCompleted {
                file: "web.log".to_string()
            }
        );

        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Deleted)]);
        assert!(!manager.is_tracked(&path));
        assert_eq!(manager.tracked_count(), 0);
    }

    #[test]
    fn test_lines_written_after_creating_empty_file_are_delivered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.log");
        append(&path, "");

        let mut manager = manager(TailConfig::default());
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Created)]);
        assert!(manager.sink().lines().is_empty());

        append(&path, "line1\nline2\nline3\n");
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);

        assert_eq!(
            manager.sink().lines(),
            vec![("fresh.log".to_string(), "line1\nline2\nline3\n".to_string())]
        );
    }

    #[test]
    fn test_change_on_untracked_file_self_heals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missed.log");
        append(&path, "hello\n");

        let mut manager = manager(TailConfig::default());
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);

        assert!(manager.is_tracked(&path));
        assert_eq!(
            manager.sink().lines(),
            vec![("missed.log".to_string(), "hello\n".to_string())]
        );
    }

    #[test]
    fn test_burst_drained_in_capped_reads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("burst.log");
        append(&path, "start\n");

        let config = TailConfig {
            read_cap_bytes: 32,
            ..TailConfig::default()
        };
        let mut manager = manager(config);
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Created)]);

        let written: String = (0..40).map(|i| format!("burst line {:03}\n", i)).collect();
        append(&path, &written);
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);

        let lines = manager.sink().lines();
        assert!(lines.len() > 1);
        let joined: String = lines.into_iter().map(|(_, text)| text).collect();
        assert_eq!(joined, format!("start\n{}", written));
    }

    #[test]
    fn test_read_limit_bounds_work_per_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("limited.log");
        append(&path, "start\n");

        let config = TailConfig {
            read_cap_bytes: 8,
            max_reads_per_change: 2,
            ..TailConfig::default()
        };
        let mut manager = manager(config);
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Created)]);
        append(&path, "aaaaaa\nbbbbbb\ncccccc\n");

        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);
        let first: String = manager.sink().lines().into_iter().map(|(_, t)| t).collect();
        assert_eq!(first, "start\naaaaaa\n");

        manager.sink().take();
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);
        let second: String = manager.sink().lines().into_iter().map(|(_, t)| t).collect();
        assert_eq!(second, "bbbbbb\ncccccc\n");
    }

    #[test]
    fn test_failure_does_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.log");
        let present = dir.path().join("present.log");
        append(&present, "ok\n");

        let mut manager = manager(TailConfig::default());
        manager.handle_file_changes(&[
            FileChange::new(&missing, ChangeKind::Created),
            FileChange::new(&missing, ChangeKind::Changed),
            FileChange::new(&present, ChangeKind::Changed),
        ]);

        assert!(!manager.is_tracked(&missing));
        assert!(manager.is_tracked(&present));
        assert_eq!(
            manager.sink().lines(),
            vec![("present.log".to_string(), "ok\n".to_string())]
        );
    }

    #[test]
    fn test_snapshot_is_not_mutated_after_handout() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        append(&a, "a\n");
        append(&b, "b\n");

        let mut manager = manager(TailConfig::default());
        manager.handle_file_changes(&[FileChange::new(&a, ChangeKind::Created)]);
        let before = manager.snapshot();

        manager.handle_file_changes(&[
            FileChange::new(&b, ChangeKind::Created),
            FileChange::new(&a, ChangeKind::Deleted),
        ]);

        assert_eq!(before.len(), 1);
        assert!(before.contains(&a));
        let after = manager.snapshot();
        assert_eq!(after.len(), 1);
        assert!(after.contains(&b));
    }

    #[test]
    fn test_recreated_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rotated.log");
        append(&path, "old\n");

        let mut manager = manager(TailConfig::default());
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Created)]);
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Changed)]);
        manager.sink().take();

        fs::remove_file(&path).unwrap();
        manager.handle_file_changes(&[FileChange::new(&path, ChangeKind::Deleted)]);
        append(&path, "new\n");
        manager.handle_file_changes(&[
            FileChange::new(&path, ChangeKind::Created),
            FileChange::new(&path, ChangeKind::Changed),
        ]);

        assert_eq!(
            manager.sink().lines(),
            vec![("rotated.log".to_string(), "new\n".to_string())]
        );
    }
}
