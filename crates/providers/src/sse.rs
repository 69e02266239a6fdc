//! Minimal server-sent-events line buffer.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences split across network chunks decode correctly.

/// Accumulates raw bytes and yields the payload of each complete `data:` line.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns the `data:` payloads completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines, comments, and `event:` lines (the type is in the payload)
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}
