//! Newline-delimited record reassembly
//!
//! Decoded text arrives in arbitrary pieces. [`LineReassembler`] hands out a
//! line only once the `\n` terminating it has been seen; whatever follows the
//! last newline is carried over to the next push.

/// Splits a text stream into `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineReassembler {
    /// Unterminated fragment carried between pushes
    carry: String,
    /// Lines handed out so far
    lines_emitted: u64,
}

impl LineReassembler {
    /// Create an empty reassembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text and return every line it completed
    ///
    /// Returned lines have their `\n` (and a preceding `\r`) removed. Blank
    /// lines are returned as empty strings; filtering is the parser's job.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.carry.push_str(text);

        let Some(last_newline) = self.carry.rfind('\n') else {
            return Vec::new();
        };

        let remainder = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, remainder);

        let lines: Vec<String> = complete
            .split_terminator('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();

        self.lines_emitted += lines.len() as u64;
        lines
    }

    /// The unterminated fragment currently held back
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.carry
    }

    /// Throw away the carry-over
    ///
    /// Used at abort and forced completion: an unterminated fragment is by
    /// definition incomplete and is never parsed. Returns the number of bytes
    /// discarded.
    pub fn discard(&mut self) -> usize {
        let dropped = self.carry.len();
        self.carry.clear();
        dropped
    }

    /// Total lines emitted
    #[must_use]
    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }
}
