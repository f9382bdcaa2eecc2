//! Incremental UTF-8 decoding
//!
//! The transport hands us arbitrary byte chunks. A multi-byte character can
//! straddle two chunks, so decoding each chunk on its own would corrupt it.
//! [`ChunkDecoder`] keeps the incomplete tail of one chunk and prepends it to
//! the next.

use std::borrow::Cow;

/// Longest possible incomplete UTF-8 prefix (a 4-byte sequence missing one byte)
const MAX_PENDING: usize = 3;

/// Stateful UTF-8 decoder for a chunked byte stream
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    /// Bytes of a character whose remaining bytes have not arrived yet
    pending: Vec<u8>,
    /// Total bytes fed through `decode`
    bytes_seen: u64,
}

impl ChunkDecoder {
    /// Create a decoder with no buffered state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, returning all text that is complete so far
    ///
    /// Invalid sequences (as opposed to truncated ones) become U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.bytes_seen += chunk.len() as u64;

        let input: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));

                    match e.error_len() {
                        // Truncated sequence at the end of input: wait for more bytes
                        None => {
                            let tail = &rest[valid..];
                            debug_assert!(tail.len() <= MAX_PENDING);
                            self.pending.extend_from_slice(tail);
                            break;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + bad..];
                        }
                    }
                }
            }
        }

        out
    }

    /// Signal end of stream
    ///
    /// A partial character left over at this point can never be completed and
    /// is dropped. Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Dropping incomplete UTF-8 sequence at end of stream");
        }
        self.pending.clear();
        dropped
    }

    /// Whether a partial character is buffered
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Total bytes received
    #[must_use]
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(b"hello "), "hello ");
        assert_eq!(decoder.decode(b"world"), "world");
        assert!(!decoder.has_pending());
        assert_eq!(decoder.bytes_seen(), 11);
    }

    #[test]
    fn test_split_multibyte_character() {
        // "é" is C3 A9, "🦀" is F0 9F A6 80
        let bytes = "café 🦀!".as_bytes();
        let mut decoder = ChunkDecoder::new();

        let mut out = String::new();
        for i in 0..bytes.len() {
            out.push_str(&decoder.decode(&bytes[i..=i]));
        }
        assert_eq!(out, "café 🦀!");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_every_split_point() {
        let text = "héllo\n🦀 wörld\n";
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = ChunkDecoder::new();
            let mut out = decoder.decode(&bytes[..split]);
            out.push_str(&decoder.decode(&bytes[split..]));
            assert_eq!(out, text, "split at {split}");
        }
    }

    #[test]
    fn test_partial_character_held_back() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xF0, 0x9F]), "a");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&[0xA6, 0x80]), "🦀");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_finish_drops_partial() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(decoder.finish(), 2);
        assert!(!decoder.has_pending());
        assert_eq!(decoder.finish(), 0);
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
        assert!(!decoder.has_pending());
    }
}
