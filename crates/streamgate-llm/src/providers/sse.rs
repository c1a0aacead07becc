//! Minimal server-sent-events decoding for upstream provider streams

/// Accumulates raw body bytes and hands back the `data:` payload of each
/// complete event.
///
/// Bytes are buffered until an event boundary so multi-byte characters split
/// across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the data payloads of every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = find_boundary(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = data_payload(&event[..end]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Payload of a trailing event the upstream closed without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

/// Data payload of a single SSE line, if it is a `data:` line.
pub fn data_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn data_payload(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let lines: Vec<&str> = text.lines().filter_map(data_line).collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
