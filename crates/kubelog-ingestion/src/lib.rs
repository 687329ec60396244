//! kubelog Ingestion
//!
//! Tails container log files: backward line-boundary seeking, incremental
//! per-file reading, file-set lifecycle management and directory watching.

pub mod file_set;
pub mod reader;
pub mod seeker;
pub mod watcher;

pub use file_set::{ChangeKind, FileChange, FileSetManager};
pub use reader::{ReadChunk, ReadStatus, TailReader, TailingFile};
pub use seeker::{LineSeeker, DEFAULT_CHUNK_SIZE};
pub use watcher::DirectoryWatcher;
