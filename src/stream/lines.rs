// src/stream/lines.rs

/// Longest line kept in memory before it is emitted unterminated.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Splits one pipe's byte stream into lines.
///
/// - `\n` and `\r` both end a line, so `\r\n` endings and carriage-return
///   progress redraws come out as separate lines without stray `\r`.
/// - Empty lines are dropped.
/// - Bytes are buffered until a terminator, so multi-byte UTF-8 sequences
///   split across reads decode correctly; invalid UTF-8 is replaced.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' || b == b'\r' {
                lines.extend(self.take_line());
            } else {
                self.pending.push(b);
                if self.pending.len() >= MAX_LINE_BYTES {
                    lines.extend(self.take_line());
                }
            }
        }
        lines
    }

    /// Flush the unterminated tail at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn take_line(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}
