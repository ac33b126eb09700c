//! Line framing over a chunked byte stream
//!
//! Provides [`FrameDecoder`], which turns arbitrarily split byte chunks into
//! complete `\n`-terminated lines.

/// Line delimiter for server-sent-event streams
pub const LINE_DELIMITER: u8 = b'\n';

/// Incremental line decoder for one byte stream
///
/// Chunks are appended to an internal buffer and complete lines are
/// drained from the front. Whatever follows the last delimiter stays
/// buffered until the next chunk arrives.
///
/// Splitting happens on raw bytes: `\n` never occurs inside a multi-byte
/// UTF-8 sequence, so a chunk boundary in the middle of a character is
/// harmless as long as it is not also the end of the stream.
///
/// # Examples
/// ```
/// use outline_stream::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// assert!(decoder.push(b"data: {\"a\"").next().is_none());
/// let lines: Vec<_> = decoder.push(b":1}\ndata: [DO").collect();
/// assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
/// assert_eq!(decoder.pending(), b"data: [DO".len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and iterate over the lines it completes
    ///
    /// Lines are yielded without their delimiter. Lines the caller does not
    /// pull from the iterator stay buffered and are yielded by the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.buffer.extend_from_slice(chunk);
        Lines {
            buffer: &mut self.buffer,
            consumed: 0,
        }
    }

    /// Number of buffered bytes not yet terminated by a delimiter
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// End the stream, discarding any undelimited remainder
    ///
    /// Returns the number of discarded bytes. A trailing segment without a
    /// delimiter is never treated as a complete line.
    pub fn finish(self) -> usize {
        let discarded = self.buffer.len();
        if discarded > 0 {
            tracing::trace!(discarded, "dropping undelimited frame remainder");
        }
        discarded
    }
}

/// Iterator over the complete lines currently buffered in a [`FrameDecoder`]
///
/// Consumed lines are compacted out of the decoder's buffer when the
/// iterator is dropped.
#[derive(Debug)]
pub struct Lines<'a> {
    buffer: &'a mut Vec<u8>,
    consumed: usize,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buffer[self.consumed..];
        let end = rest.iter().position(|&b| b == LINE_DELIMITER)?;
        let line = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.consumed += end + 1;
        Some(line)
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        self.buffer.drain(..self.consumed);
    }
}
