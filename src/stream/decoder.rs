//! Incremental event-stream chunk decoder
//!
//! Raw fragments may split an event anywhere, including in the middle of a
//! field name or a multi-byte UTF-8 sequence. [`ChunkDecoder`] buffers what
//! it has seen and only ever yields whole, blank-line-delimited event
//! records, in arrival order.

/// Separator between event records after line-ending normalization.
const RECORD_SEPARATOR: &str = "\n\n";

/// Failure raised when the carry-over grows past its limit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event stream buffer exceeded {limit} bytes without a record separator")]
pub struct BufferOverflow {
    /// Configured limit in bytes
    pub limit: usize,
}

/// Splits a byte stream into event records.
///
/// # Examples
///
/// ```
/// use agentchat::stream::ChunkDecoder;
///
/// let mut decoder = ChunkDecoder::new();
/// assert!(decoder.push(b"data: {'a'").unwrap().is_empty());
/// let records = decoder.push(b": 1}\n\ndata: tail").unwrap();
/// assert_eq!(records, vec!["data: {'a': 1}".to_string()]);
/// assert_eq!(decoder.finish(), Some("data: tail".to_string()));
/// ```
#[derive(Debug)]
pub struct ChunkDecoder {
    /// Decoded text not yet terminated by a separator
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    max_buffer_bytes: usize,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    /// Default carry-over limit (1MB)
    pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

    /// Create a decoder with the default carry-over limit.
    pub fn new() -> Self {
        Self::with_max_buffer_bytes(Self::DEFAULT_MAX_BUFFER_BYTES)
    }

    /// Create a decoder with a custom carry-over limit.
    pub fn with_max_buffer_bytes(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
            max_buffer_bytes,
        }
    }

    /// Bytes currently held as carry-over.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    /// Feed raw bytes and collect every record they complete.
    ///
    /// # Errors
    ///
    /// Returns [`BufferOverflow`] if the carry-over would exceed the limit.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, BufferOverflow> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);
        let text = self.decode_utf8(&input);
        self.append(&text)
    }

    /// Feed already-decoded text and collect every record it completes.
    ///
    /// # Errors
    ///
    /// Returns [`BufferOverflow`] if the carry-over would exceed the limit.
    pub fn push_str(&mut self, text: &str) -> Result<Vec<String>, BufferOverflow> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        if !self.pending.is_empty() {
            // Bytes left over from a byte fragment can never complete now.
            self.pending.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        self.append(text)
    }

    /// Signal end-of-channel and return the final record, if any.
    ///
    /// Carry-over that is empty or whitespace only is discarded.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        let rest = std::mem::take(&mut self.buffer);
        let trimmed = rest.trim_end_matches('\n');
        if trimmed.trim().is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Decode as much of `input` as forms complete characters; keep an
    /// incomplete trailing sequence in `pending`. Invalid sequences become
    /// U+FFFD.
    fn decode_utf8(&mut self, mut input: &[u8]) -> String {
        let mut out = String::with_capacity(input.len());
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this slice is valid UTF-8.
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            self.pending.extend_from_slice(rest);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn append(&mut self, text: &str) -> Result<Vec<String>, BufferOverflow> {
        self.buffer.push_str(text);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut records = Vec::new();
        while let Some(pos) = self.buffer.find(RECORD_SEPARATOR) {
            let record: String = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + RECORD_SEPARATOR.len());
            if record.trim().is_empty() {
                continue;
            }
            records.push(record);
        }

        if self.buffered_len() > self.max_buffer_bytes {
            return Err(BufferOverflow {
                limit: self.max_buffer_bytes,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_record() {
        let mut decoder = ChunkDecoder::new();
        let records = decoder.push(b"data: hello\n\n").unwrap();
        assert_eq!(records, vec!["data: hello"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_record_split_mid_field() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(b"da").unwrap().is_empty());
        assert!(decoder.push(b"ta: one\n").unwrap().is_empty());
        let records = decoder.push(b"\ndata: two\n\n").unwrap();
        assert_eq!(records, vec!["data: one", "data: two"]);
    }

    #[test]
    fn test_multibyte_split_across_fragments() {
        let text = "data: caf\u{e9} \u{1f600}\n\n";
        let bytes = text.as_bytes();
        let mut decoder = ChunkDecoder::new();
        let mut records = Vec::new();
        for b in bytes {
            records.extend(decoder.push(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(records, vec!["data: caf\u{e9} \u{1f600}"]);
    }

    #[test]
    fn test_crlf_separators_are_normalized() {
        let mut decoder = ChunkDecoder::new();
        let mut records = decoder.push(b"data: a\r\n\r").unwrap();
        records.extend(decoder.push(b"\ndata: b\r\n\r\n").unwrap());
        assert_eq!(records, vec!["data: a", "data: b"]);
    }

    #[test]
    fn test_finish_emits_non_blank_carry_over() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(b"data: first\n\ndata: last").unwrap();
        assert_eq!(decoder.finish(), Some("data: last".to_string()));
    }

    #[test]
    fn test_finish_discards_whitespace_carry_over() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(b"data: first\n\n  \n").unwrap();
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(b"").unwrap().is_empty());
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_blank_records_are_skipped() {
        let mut decoder = ChunkDecoder::new();
        let records = decoder.push(b"\n\n\n\ndata: x\n\n").unwrap();
        assert_eq!(records, vec!["data: x"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut decoder = ChunkDecoder::new();
        let records = decoder.push(b"data: a\xffb\n\n").unwrap();
        assert_eq!(records, vec!["data: a\u{fffd}b"]);
    }

    #[test]
    fn test_truncated_sequence_at_end_is_replaced() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(b"data: \xe2\x82").unwrap();
        assert_eq!(decoder.finish(), Some("data: \u{fffd}".to_string()));
    }

    #[test]
    fn test_buffer_overflow() {
        let mut decoder = ChunkDecoder::with_max_buffer_bytes(8);
        let result = decoder.push(b"data: no separator here");
        assert_eq!(result, Err(BufferOverflow { limit: 8 }));
    }

    #[test]
    fn test_push_str_matches_push() {
        let mut by_bytes = ChunkDecoder::new();
        let mut by_text = ChunkDecoder::new();
        let body = "data: one\n\ndata: two\n\n";
        assert_eq!(
            by_bytes.push(body.as_bytes()).unwrap(),
            by_text.push_str(body).unwrap()
        );
    }
}
