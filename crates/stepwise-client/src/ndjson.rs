use serde::Deserialize;
use tracing::warn;

/// Longest record the decoder will buffer. Status lines are a few hundred bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Split a raw byte stream into newline-delimited records.
///
/// Bytes are buffered until a `\n` arrives, so records split across
/// chunks (including multi-byte UTF-8 sequences) come out whole.
/// A record longer than the line limit is dropped up to its next newline.
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl Default for NdjsonDecoder {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    /// Feed bytes into the decoder and extract complete, non-blank lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while !rest.is_empty() {
            let newline = rest.iter().position(|b| *b == b'\n');
            let (segment, terminated) = match newline {
                Some(pos) => (&rest[..pos], true),
                None => (rest, false),
            };
            rest = match newline {
                Some(pos) => &rest[pos + 1..],
                None => &[],
            };

            if !self.discarding {
                if self.buffer.len() + segment.len() > self.max_line {
                    warn!(
                        limit = self.max_line,
                        "Dropping oversized NDJSON record"
                    );
                    self.buffer.clear();
                    self.discarding = true;
                } else {
                    self.buffer.extend_from_slice(segment);
                }
            }

            if terminated {
                if !self.discarding {
                    if let Some(line) = self.take_line() {
                        lines.push(line);
                    }
                }
                self.discarding = false;
            }
        }

        lines
    }

    /// Flush a trailing record that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if std::mem::take(&mut self.discarding) {
            self.buffer.clear();
            return None;
        }
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// One status record from a model pull stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PullStatus {
    /// Decode one line. Malformed lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }

    /// Whether this record signals the end of the pull.
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    /// Transfer progress in percent, when both counters are present.
    pub fn progress_pct(&self) -> Option<u8> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some(((done.min(total) as f64 / total as f64) * 100.0).round() as u8)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_basic() {
        let mut dec = NdjsonDecoder::new();
        let lines = dec.feed(b"{\"status\":\"pulling manifest\"}\n{\"status\":\"success\"}\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "{\"status\":\"success\"}");
        assert!(dec.finish().is_none());
    }

    #[test]
    fn test_decoder_chunked() {
        let mut dec = NdjsonDecoder::new();
        assert!(dec.feed(b"{\"status\":\"pul").is_empty());
        let lines = dec.feed(b"ling\"}\r\n\n");
        assert_eq!(lines, vec!["{\"status\":\"pulling\"}".to_string()]);
    }

    #[test]
    fn test_decoder_split_utf8() {
        let text = "{\"status\":\"café\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut dec = NdjsonDecoder::new();
        assert!(dec.feed(&text[..split]).is_empty());
        let lines = dec.feed(&text[split..]);
        assert_eq!(lines, vec!["{\"status\":\"café\"}".to_string()]);
    }

    #[test]
    fn test_decoder_trailing_record() {
        let mut dec = NdjsonDecoder::new();
        assert!(dec.feed(b"{\"status\":\"success\"}").is_empty());
        assert_eq!(dec.finish().as_deref(), Some("{\"status\":\"success\"}"));
    }

    #[test]
    fn test_decoder_drops_oversized_record() {
        let mut dec = NdjsonDecoder::with_max_line(16);
        assert!(dec.feed(b"{\"status\":\"aaaaaaaa").is_empty());
        // still inside the oversized record
        assert!(dec.feed(b"bbbbbbbbbbbbbbbbbbbbbbbb").is_empty());
        let lines = dec.feed(b"\"}\n{\"status\":\"ok\"}\n");
        assert_eq!(lines, vec!["{\"status\":\"ok\"}".to_string()]);
        assert!(dec.finish().is_none());
    }

    #[test]
    fn test_decoder_unterminated_stream_stays_bounded() {
        let mut dec = NdjsonDecoder::with_max_line(32);
        for _ in 0..1000 {
            assert!(dec.feed(&[b'x'; 64]).is_empty());
            assert!(dec.buffer.len() <= 32);
        }
        assert!(dec.finish().is_none());

        // decoder is usable again after the dropped record
        assert_eq!(dec.feed(b"{}\n"), vec!["{}".to_string()]);
    }

    #[test]
    fn test_decoder_line_at_limit_is_kept() {
        let mut dec = NdjsonDecoder::with_max_line(8);
        assert_eq!(dec.feed(b"12345678\n"), vec!["12345678".to_string()]);
        assert!(dec.feed(b"123456789\n").is_empty());
    }

    #[test]
    fn test_pull_status_progress() {
        let s = PullStatus::parse(r#"{"status":"downloading","total":200,"completed":50}"#).unwrap();
        assert_eq!(s.progress_pct(), Some(25));
        assert!(!s.is_success());

        let s = PullStatus::parse(r#"{"status":"downloading","total":0,"completed":0}"#).unwrap();
        assert_eq!(s.progress_pct(), None);
    }

    #[test]
    fn test_pull_status_success_and_malformed() {
        assert!(PullStatus::parse(r#"{"status":"success"}"#).unwrap().is_success());
        assert!(PullStatus::parse("{not json").is_none());
        let s = PullStatus::parse(r#"{"error":"pull model manifest: file does not exist"}"#).unwrap();
        assert!(s.status.is_none());
        assert!(s.error.is_some());
    }
}
