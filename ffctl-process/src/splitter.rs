/// Splits a raw byte stream into lines.
///
/// Runs of `\n` and `\r` are separators, never part of a token, so both
/// regular log output and carriage-return progress updates yield lines.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the lines completed by it.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;

        for (i, &b) in self.pending.iter().enumerate() {
            if b == b'\n' || b == b'\r' {
                if i > start {
                    lines.push(String::from_utf8_lossy(&self.pending[start..i]).into_owned());
                }
                start = i + 1;
            }
        }

        self.pending.drain(..start);
        lines
    }

    /// Drain whatever is left after EOF.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}
