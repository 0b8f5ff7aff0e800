/// Newline-delimited JSON handling for inference-service responses.
///
/// The service answers `/api/generate` with one JSON object per line, both
/// when streaming and (on some versions) when not. Lines can be split across
/// HTTP chunks, and so can multi-byte UTF-8 sequences.
use serde_json::Value;

/// Incremental line splitter that buffers incomplete lines across chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the HTTP response. Returns any complete, non-blank lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(line) = clean_line(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush whatever is left once the body has ended (a final line without `\n`).
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        clean_line(&rest)
    }
}

fn clean_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// One classified line
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Json(Value),
    Malformed(String),
}

pub fn classify(line: &str) -> Line {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => Line::Json(value),
        Err(_) => Line::Malformed(line.to_string()),
    }
}

/// Result of reading a whole NDJSON body
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Collected {
    /// Last line that parsed as JSON
    pub last: Option<Value>,
    /// Lines that did not parse, in order
    pub malformed: Vec<String>,
}

impl Collected {
    pub fn push(&mut self, line: &str) {
        match classify(line) {
            Line::Json(value) => self.last = Some(value),
            Line::Malformed(raw) => self.malformed.push(raw),
        }
    }
}

/// Parse a complete body; later well-formed lines overwrite earlier ones.
pub fn last_object(body: &str) -> Collected {
    let mut buf = LineBuffer::new();
    let mut collected = Collected::default();
    for line in buf.feed(body.as_bytes()) {
        collected.push(&line);
    }
    if let Some(line) = buf.finish() {
        collected.push(&line);
    }
    collected
}
