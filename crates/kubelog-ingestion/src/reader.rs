use crate::seeker::LineSeeker;
use kubelog_core::config::TailConfig;
use kubelog_core::IngestionError;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of a single read call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// All currently available content fit into the read
    BufferSufficient,
    /// More content is available than the per-call cap allowed
    ContentExceedsCap,
    /// The file shrank below the cursor; the cursor was re-established
    Reset,
}

/// Complete lines returned by [`TailReader::read_new_lines`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChunk {
    /// Newly appended text, ending on a line feed (or empty)
    pub text: String,
    pub status: ReadStatus,
}

impl ReadChunk {
    fn empty(status: ReadStatus) -> Self {
        Self {
            text: String::new(),
            status,
        }
    }

    /// Whether a further call may return more content right away
    pub fn overflowed(&self) -> bool {
        self.status == ReadStatus::ContentExceedsCap
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Incremental reader over a growing stream
///
/// Tracks a cursor that always sits on a line start and hands out only
/// complete lines appended since the previous call.
#[derive(Debug)]
pub struct TailReader<R> {
    stream: R,
    /// `None` until a line boundary has been seen; the first one found
    /// after that places the cursor at the start of the stream
    cursor: Option<u64>,
    seeker: LineSeeker,
    buffer: Vec<u8>,
    shrink_counter: u32,
    shrink_after_calls: u32,
}

/// Tailing reader over an on-disk file
pub type TailingFile = TailReader<File>;

impl TailReader<File> {
    /// Open `path` read-only and place the cursor on its last line
    pub fn open(path: &Path, config: &TailConfig) -> Result<Self, IngestionError> {
        let file = File::open(path).map_err(|source| IngestionError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file, config).map_err(IngestionError::from)
    }
}

impl<R: Read + Seek> TailReader<R> {
    /// Wrap `stream` and establish the initial cursor from its end
    pub fn new(stream: R, config: &TailConfig) -> io::Result<Self> {
        let mut reader = Self {
            stream,
            cursor: None,
            seeker: LineSeeker::new(config.seek_chunk_size),
            buffer: Vec::new(),
            shrink_counter: 0,
            shrink_after_calls: config.shrink_after_calls,
        };
        reader.cursor = reader.seek_last_line()?;
        Ok(reader)
    }

    /// Current read cursor, `None` while no line boundary has been found
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Capacity of the scratch buffer
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Return complete lines appended since the last call, reading at most `max_bytes`
    ///
    /// Never fails: I/O errors are logged and reported as an empty chunk so the
    /// caller can retry on the next change notification.
    pub fn read_new_lines(&mut self, max_bytes: usize) -> ReadChunk {
        match self.try_read_new_lines(max_bytes) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Failed to read new lines");
                ReadChunk::empty(ReadStatus::BufferSufficient)
            }
        }
    }

    fn try_read_new_lines(&mut self, max_bytes: usize) -> io::Result<ReadChunk> {
        let cursor = match self.cursor {
            Some(cursor) => cursor,
            // Nothing has been delivered yet, so the first line starts the file
            None => match self.seek_last_line()? {
                Some(_) => {
                    self.cursor = Some(0);
                    0
                }
                None => return Ok(ReadChunk::empty(ReadStatus::BufferSufficient)),
            },
        };

        let length = self.stream.seek(SeekFrom::End(0))?;
        if length < cursor {
            info!(cursor, length, "File shrank below cursor, re-establishing position");
            self.cursor = self.seek_last_line()?;
            return Ok(ReadChunk::empty(ReadStatus::Reset));
        }

        let available = length - cursor;
        if available == 0 {
            return Ok(ReadChunk::empty(ReadStatus::BufferSufficient));
        }

        let (to_read, status) = if available > max_bytes as u64 {
            (max_bytes, ReadStatus::ContentExceedsCap)
        } else {
            (available as usize, ReadStatus::BufferSufficient)
        };
        if to_read == 0 {
            return Ok(ReadChunk::empty(ReadStatus::BufferSufficient));
        }

        self.ensure_buffer(to_read);
        self.stream.seek(SeekFrom::Start(cursor))?;
        let buffer = &mut self.buffer[..to_read];
        self.stream.read_exact(buffer)?;

        let Some(last_line_feed) = buffer.iter().rposition(|&b| b == b'\n') else {
            // Only a partial line so far; it is completed on a later call
            return Ok(ReadChunk::empty(ReadStatus::BufferSufficient));
        };

        let consumed = last_line_feed + 1;
        self.cursor = Some(cursor + consumed as u64);
        let text = String::from_utf8_lossy(&buffer[..consumed]).into_owned();
        debug!(bytes = consumed, overflowed = status == ReadStatus::ContentExceedsCap, "Read new lines");

        Ok(ReadChunk { text, status })
    }

    /// Grow the scratch buffer immediately; shrink it after a sustained run of small reads
    fn ensure_buffer(&mut self, required: usize) {
        if self.buffer.len() < required {
            self.buffer = vec![0; required];
            self.shrink_counter = 0;
            return;
        }

        if self.buffer.len() > required * 2 {
            self.shrink_counter += 1;
        } else {
            self.shrink_counter = 0;
        }

        if self.shrink_counter >= self.shrink_after_calls {
            debug!(from = self.buffer.len(), to = required, "Shrinking read buffer");
            self.buffer = vec![0; required];
            self.shrink_counter = 0;
        }
    }

    fn seek_last_line(&mut self) -> io::Result<Option<u64>> {
        self.stream.seek(SeekFrom::End(0))?;
        if self.seeker.seek_last_line_start(&mut self.stream)? {
            Ok(Some(self.stream.stream_position()?))
        } else {
            Ok(None)
        }
    }
}
