/// Splits a byte stream into trimmed, non-empty UTF-8 lines
///
/// Bytes after the last newline are held until more data arrives, so lines
/// and multi-byte characters split across reads are reassembled. One decoder
/// serves one response.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Empty decoder
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Add bytes, returning every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete.split(|&b| b == b'\n').filter_map(decode_line).collect()
    }

    /// Flush a final line that had no trailing newline
    pub fn finish(&mut self) -> Option<String> {
        let remaining = std::mem::take(&mut self.buffer);
        decode_line(&remaining)
    }

    /// Drop any buffered partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_owned())
}
