use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

/// Default number of bytes read per backward step
pub const DEFAULT_CHUNK_SIZE: usize = 80;

/// Locates line starts by scanning a seekable stream backwards
///
/// The scratch buffer is allocated once and reused across calls.
#[derive(Debug)]
pub struct LineSeeker {
    buffer: Vec<u8>,
}

impl LineSeeker {
    /// Create a seeker reading `chunk_size` bytes per backward step
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buffer: vec![0; chunk_size.max(1)],
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    /// Change the chunk size, reallocating the scratch buffer only if it differs
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        let chunk_size = chunk_size.max(1);
        if self.buffer.len() != chunk_size {
            self.buffer = vec![0; chunk_size];
        }
    }

    /// Position `stream` on the start of the line preceding its current position
    ///
    /// Returns `false` if there is no line feed before the current position
    /// (empty stream, or a single line that is not yet terminated); the stream
    /// is then left at offset 0. When only one line feed precedes the position,
    /// the line starts at offset 0 and `true` is returned.
    pub fn seek_last_line_start<S: Read + Seek>(&mut self, stream: &mut S) -> io::Result<bool> {
        // End of the line preceding the cursor
        if !self.seek_previous_line_feed(stream)? {
            return Ok(false);
        }

        // End of the line before that one
        if self.seek_previous_line_feed(stream)? {
            stream.seek(SeekFrom::Current(1))?;
        } else {
            stream.seek(SeekFrom::Start(0))?;
        }

        Ok(true)
    }

    /// Read the line preceding the current position and leave the stream on its start
    ///
    /// Repeated calls walk the stream backwards one line at a time. The
    /// returned line has its `\n` (and a preceding `\r`) removed.
    pub fn read_previous_line<S: Read + Seek>(
        &mut self,
        stream: &mut S,
    ) -> io::Result<Option<String>> {
        if !self.seek_last_line_start(stream)? {
            return Ok(None);
        }

        let start = stream.stream_position()?;
        let mut line = Vec::new();
        BufReader::new(&mut *stream).read_until(b'\n', &mut line)?;
        stream.seek(SeekFrom::Start(start))?;

        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Move `stream` onto the nearest `\n` strictly before its current position
    fn seek_previous_line_feed<S: Read + Seek>(&mut self, stream: &mut S) -> io::Result<bool> {
        let mut current = stream.stream_position()?;

        while current > 0 {
            let to_read = (self.buffer.len() as u64).min(current) as usize;
            let chunk_start = current - to_read as u64;

            stream.seek(SeekFrom::Start(chunk_start))?;
            let chunk = &mut self.buffer[..to_read];
            stream.read_exact(chunk)?;

            if let Some(index) = chunk.iter().rposition(|&b| b == b'\n') {
                stream.seek(SeekFrom::Start(chunk_start + index as u64))?;
                return Ok(true);
            }

            current = chunk_start;
        }

        stream.seek(SeekFrom::Start(0))?;
        Ok(false)
    }
}

impl Default for LineSeeker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}
