//! Byte-range file chunking with forward line alignment.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// A half-open byte range `[start, end)` within a file.
///
/// Produced by [`line_aligned_chunks`]; every range ends immediately after a
/// `\n` (or at EOF), so a worker reading exactly this range sees whole rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Split `path` into at most `target_chunks` ranges, rounding each tentative
/// boundary forward to the next line boundary.
///
/// A chunk can swallow its successors entirely when lines are long relative
/// to the chunk size; the result then simply has fewer ranges. An empty file
/// yields no ranges.
pub fn line_aligned_chunks(path: &Path, target_chunks: usize) -> io::Result<Vec<ByteRange>> {
    let file_size = std::fs::metadata(path)?.len();
    if file_size == 0 {
        return Ok(Vec::new());
    }
    let target_chunks = target_chunks.max(1) as u64;
    let chunk_size = (file_size / target_chunks).max(1);

    let mut reader = BufReader::new(File::open(path)?);
    let mut ranges = Vec::new();
    let mut start = 0u64;
    while start < file_size {
        let mut end = (start + chunk_size).min(file_size);
        if end < file_size {
            reader.seek(SeekFrom::Start(end))?;
            let mut partial = Vec::new();
            let consumed = reader.read_until(b'\n', &mut partial)? as u64;
            end += consumed;
        }
        ranges.push(ByteRange { start, end });
        start = end;
    }
    Ok(ranges)
}
