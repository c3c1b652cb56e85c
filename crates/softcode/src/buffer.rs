//! Bounded output buffer
//!
//! Every evaluation appends into one shared [`OutputBuffer`]. Nested calls
//! remember the length at which they started and treat everything past it
//! as their own output, so they can inspect it (function names), rewind it
//! (unknown functions) or capitalize it (`%N`) without copying.
//!
//! Writes past the limit are silently truncated on a character boundary,
//! matching how an over-long result is clipped rather than rejected.

use crate::flags::LBUF_SIZE;
use std::fmt;

/// Growable text buffer with a hard byte limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    text: String,
    limit: usize,
}

impl OutputBuffer {
    /// Create an empty buffer with the standard large-buffer limit
    pub fn new() -> Self {
        Self::with_limit(LBUF_SIZE - 1)
    }

    /// Create an empty buffer holding at most `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Bytes that can still be written
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.text.len())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Text written at or after byte offset `start`
    pub fn since(&self, start: usize) -> &str {
        self.text.get(start..).unwrap_or("")
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Append a character if it fits
    pub fn push(&mut self, c: char) -> bool {
        if c.len_utf8() > self.remaining() {
            return false;
        }
        self.text.push(c);
        true
    }

    /// Append as much of `s` as fits
    pub fn push_str(&mut self, s: &str) {
        let room = self.remaining();
        if s.len() <= room {
            self.text.push_str(s);
            return;
        }
        let mut cut = room;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&s[..cut]);
    }

    /// Rewind to `len` bytes (no-op when already shorter)
    pub fn truncate(&mut self, len: usize) {
        if len < self.text.len() && self.text.is_char_boundary(len) {
            self.text.truncate(len);
        }
    }

    /// Drop a single trailing space written at or after `start`
    pub fn trim_trailing_space(&mut self, start: usize) {
        if self.text.len() > start && self.text.ends_with(' ') {
            self.text.pop();
        }
    }

    /// Uppercase the character beginning at byte offset `pos`
    pub fn capitalize_at(&mut self, pos: usize) {
        let Some(c) = self.text.get(pos..).and_then(|rest| rest.chars().next()) else {
            return;
        };
        if !c.is_lowercase() {
            return;
        }
        let upper: String = c.to_uppercase().collect();
        self.text.replace_range(pos..pos + c.len_utf8(), &upper);
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<OutputBuffer> for String {
    fn from(buf: OutputBuffer) -> Self {
        buf.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_respects_limit() {
        let mut buf = OutputBuffer::with_limit(5);
        buf.push_str("abc");
        buf.push_str("defgh");
        assert_eq!(buf.as_str(), "abcde");
        assert!(!buf.push('x'));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let mut buf = OutputBuffer::with_limit(4);
        buf.push_str("aé€");
        // 'a' (1) + 'é' (2) fit, '€' (3) does not.
        assert_eq!(buf.as_str(), "aé");
    }

    #[test]
    fn test_since_and_rewind() {
        let mut buf = OutputBuffer::new();
        buf.push_str("hello ");
        let mark = buf.len();
        buf.push_str("world");
        assert_eq!(buf.since(mark), "world");
        buf.truncate(mark);
        assert_eq!(buf.as_str(), "hello ");
        buf.trim_trailing_space(0);
        assert_eq!(buf.as_str(), "hello");
    }

    #[test]
    fn test_capitalize_at() {
        let mut buf = OutputBuffer::new();
        buf.push_str("say hi");
        buf.capitalize_at(4);
        assert_eq!(buf.as_str(), "say Hi");
        buf.capitalize_at(99);
        assert_eq!(buf.as_str(), "say Hi");
    }
}
