//! Server-Sent Events (SSE) parser for chat-completion streams.

/// A complete frame from an OpenAI-style event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// JSON payload from one or more `data:` lines.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

/// Incremental SSE parser.
///
/// Buffers partial data across network chunks and emits complete frames.
/// Frames are delimited by a blank line; `\r\n` line endings are accepted.
/// A UTF-8 sequence split between chunks is held back until it completes.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    partial: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return any complete frames.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<SseFrame> {
        let text = self.decode(chunk.as_ref());
        if text.contains('\r') {
            self.buffer.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(&text);
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let text: String = self.buffer.drain(..pos + 2).collect();
            if let Some(frame) = Self::parse_frame(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decode everything up to the last complete character. Bytes that can
    /// never be valid UTF-8 become U+FFFD.
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.partial.extend_from_slice(chunk);
        let complete = match std::str::from_utf8(&self.partial) {
            Ok(_) => self.partial.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.partial.len(),
        };
        let rest = self.partial.split_off(complete);
        let text = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial = rest;
        text
    }

    fn parse_frame(text: &str) -> Option<SseFrame> {
        let data_parts: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();

        // Comment-only or event-only frames carry nothing we use
        if data_parts.is_empty() {
            return None;
        }

        let data = data_parts.join("\n");
        if data.trim() == "[DONE]" {
            return Some(SseFrame::Done);
        }
        if data.is_empty() {
            return None;
        }
        Some(SseFrame::Data(data))
    }
}
