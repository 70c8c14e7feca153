//! Incremental Server-Sent Events decoder.
//!
//! Network chunks are fed as they arrive; every complete event in the
//! buffer is returned immediately. Events may be split anywhere, including
//! inside a multi-byte UTF-8 sequence, since framing happens on raw bytes
//! and only complete events are decoded. A pending event larger than the
//! configured limit is an error rather than unbounded buffering.

/// Default upper bound on a single buffered event
pub const DEFAULT_MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Decoder failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SseError {
    /// No event boundary within the size limit
    #[error("SSE event exceeds {limit} bytes ({size} buffered)")]
    EventTooLarge {
        /// Bytes buffered without a boundary
        size: usize,
        /// Configured limit
        limit: usize,
    },
}

/// One decoded SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field
    pub event_type: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

impl SseEvent {
    /// Whether this is the OpenAI-style `[DONE]` sentinel
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Buffered SSE decoder
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes before this offset hold no boundary
    scanned: usize,
    max_event_size: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
        }
    }
}

impl SseDecoder {
    /// Create a decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest event the decoder will buffer
    #[must_use]
    pub fn with_max_event_size(mut self, limit: usize) -> Self {
        self.max_event_size = limit;
        self
    }

    /// Feed a chunk and drain every complete event
    ///
    /// # Errors
    /// Returns [`SseError::EventTooLarge`] once the pending event outgrows
    /// the limit; the buffer is discarded
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, SseError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, delimiter_len)) = self.find_event_boundary() {
            let raw: Vec<u8> = self.buffer.drain(..end + delimiter_len).collect();
            self.scanned = 0;
            if let Some(event) = parse_event(&raw[..end]) {
                events.push(event);
            }
        }
        // A delimiter may straddle the next chunk
        self.scanned = self.buffer.len().saturating_sub(3);

        if self.buffer.len() > self.max_event_size {
            let size = self.buffer.len();
            self.buffer = Vec::new();
            self.scanned = 0;
            return Err(SseError::EventTooLarge {
                size,
                limit: self.max_event_size,
            });
        }
        Ok(events)
    }

    /// Parse whatever remains once the byte stream has ended
    pub fn finish(&mut self) -> Option<SseEvent> {
        let raw = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        parse_event(&raw)
    }

    fn find_event_boundary(&self) -> Option<(usize, usize)> {
        let from = self.scanned.min(self.buffer.len());
        let window = &self.buffer[from..];
        let lf = find(window, b"\n\n").map(|pos| (from + pos, 2));
        let crlf = find(window, b"\r\n\r\n").map(|pos| (from + pos, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_event(raw: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(raw);

    let mut event_type = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => event_type = Some(value.to_string()),
            "data" => data_lines.push(value),
            // id, retry and unknown fields carry nothing we use
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event_type,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    impl SseDecoder {
        fn feed_ok(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
            self.feed(chunk).expect("within limit")
        }
    }

    #[test]
    fn test_simple_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed_ok(b"data: {\"text\": \"hello\"}\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"text\": \"hello\"}");
        assert_eq!(events[0].event_type, None);
    }

    #[test]
    fn test_event_with_type() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed_ok(b"event: content_block_delta\ndata: {}\n\n");

        assert_eq!(events[0].event_type.as_deref(), Some("content_block_delta"));
    }

    #[test]
    fn test_partial_chunks() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.feed_ok(b"event: message_start\ndata: {\"ty").is_empty());
        let events = decoder.feed_ok(b"pe\": 1}\n\ndata: next\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"type\": 1}");

        let events = decoder.feed_ok(b"\n");
        assert_eq!(events[0].data, "next");
    }

    #[test]
    fn test_multi_line_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed_ok(b"data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn test_crlf_delimiters() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed_ok(b"data: first\r\n\r\ndata: second\r\n\r\n");

        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["first", "second"]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = bytes.iter().position(|&b| b == 0xC3).map(|p| p + 1).unwrap_or(0);

        assert!(decoder.feed_ok(&bytes[..split]).is_empty());
        let events = decoder.feed_ok(&bytes[split..]);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn test_comments_and_done() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed_ok(b": keep-alive\n\ndata: [DONE]\n\n");

        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed_ok(b"data: a\r\n\r").is_empty());
        let events = decoder.feed_ok(b"\ndata: b\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a");
        assert_eq!(decoder.feed_ok(b"\n")[0].data, "b");
    }

    #[test]
    fn test_event_without_boundary_is_bounded() {
        let mut decoder = SseDecoder::new().with_max_event_size(64);
        assert!(decoder.feed_ok(&[b'x'; 40]).is_empty());

        let err = decoder.feed(&[b'x'; 40]).expect_err("too large");
        assert_eq!(err, SseError::EventTooLarge { size: 80, limit: 64 });

        // The decoder recovers with an empty buffer
        let events = decoder.feed_ok(b"data: ok\n\n");
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn test_many_small_chunks_without_boundary() {
        let mut decoder = SseDecoder::new();
        decoder.feed_ok(b"data: ");
        for _ in 0..1000 {
            assert!(decoder.feed_ok(b"abc").is_empty());
        }
        let events = decoder.feed_ok(b"\n\n");
        assert_eq!(events[0].data.len(), 3000);
    }

    #[test]
    fn test_finish_flushes_trailing_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed_ok(b"data: tail").is_empty());
        assert_eq!(decoder.finish().map(|e| e.data), Some("tail".to_string()));
        assert!(decoder.finish().is_none());
    }
}
