//! Nesting-aware tokenizer
//!
//! Splits softcode text on a delimiter while respecting `[]`/`()` nesting,
//! `{}` literal blocks, `\`/`%` escapes and embedded ANSI escape sequences.
//! The evaluator uses it to find the end of bracketed calls and to split
//! function argument lists; command parsing outside the core uses it to
//! split `obj/attr` style arguments.

use crate::flags::*;

/// Depth of the closer stack for `[` and `(`
const STACK_LIMIT: usize = 32;

const ESC: u8 = 0x1b;
const ANSI_CSI: u8 = b'[';

/// A position in a piece of text being tokenized
///
/// An exhausted cursor is different from one sitting at the end of its
/// text: splitting at the end yields one final empty token, after which
/// the cursor is exhausted and yields nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor<'a> {
    text: &'a str,
    pos: Option<usize>,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: Some(0),
        }
    }

    /// Cursor starting at byte offset `pos` of `text`
    pub fn at(text: &'a str, pos: usize) -> Self {
        Self {
            text,
            pos: Some(pos.min(text.len())),
        }
    }

    /// No more input, not even an empty final field
    pub fn is_exhausted(&self) -> bool {
        self.pos.is_none()
    }

    /// Byte offset of the next unread character
    pub fn position(&self) -> Option<usize> {
        self.pos
    }

    /// Unread text
    pub fn rest(&self) -> Option<&'a str> {
        self.pos.and_then(|p| self.text.get(p..))
    }

    pub fn text(&self) -> &'a str {
        self.text
    }
}

/// Splits text on delimiters using the server's space-compression setting
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    space_compress: bool,
}

impl Tokenizer {
    pub fn new(space_compress: bool) -> Self {
        Self { space_compress }
    }

    /// Extract the next token up to `delim` (or the end when `delim` is `None`)
    ///
    /// # Arguments
    /// * `cursor` - Advanced past the delimiter, or exhausted if it was never found
    /// * `delim` - Delimiter byte; only recognised at nesting depth zero
    /// * `flags` - `EV_STRIP`, `EV_STRIP_ESC`, `EV_STRIP_LS`, `EV_STRIP_TS`,
    ///   `EV_STRIP_AROUND` and `EV_NO_COMPRESS` are honoured
    ///
    /// # Returns
    /// The token, or `None` when the cursor was already exhausted
    pub fn split_at(&self, cursor: &mut Cursor<'_>, delim: Option<u8>, flags: EvalFlags) -> Option<String> {
        let start = cursor.pos?;
        let b = cursor.text.as_bytes();

        if start >= b.len() {
            cursor.pos = None;
            return Some(String::new());
        }

        let no_compress = flags & EV_NO_COMPRESS != 0;
        let compress = self.space_compress && !no_compress;
        let mut i = start;

        if (self.space_compress || flags & EV_STRIP_LS != 0) && !no_compress {
            while i < b.len() && b[i].is_ascii_whitespace() {
                i += 1;
            }
        }

        let mut out: Vec<u8> = Vec::with_capacity(b.len() - i);
        let mut stack: Vec<u8> = Vec::with_capacity(STACK_LIMIT);
        let mut first = true;

        while i < b.len() {
            let c = b[i];
            match c {
                b'\\' | b'%' => {
                    if c == b'\\' && flags & EV_STRIP_ESC != 0 {
                        i += 1;
                    } else {
                        out.push(c);
                        i += 1;
                    }
                    if i < b.len() {
                        out.push(b[i]);
                        i += 1;
                    }
                    first = false;
                }
                b']' | b')' => {
                    if let Some(tp) = stack.iter().rposition(|&s| s == c) {
                        stack.truncate(tp);
                    } else if Some(c) == delim {
                        let token = self.cleanup(flags, first, &b[..i], out);
                        cursor.pos = Some(i + 1);
                        return Some(token);
                    }
                    first = false;
                    out.push(c);
                    i += 1;
                }
                b'{' => {
                    let mut depth = 1;
                    if flags & EV_STRIP == 0 {
                        out.push(c);
                    }
                    i += 1;
                    while i < b.len() && depth > 0 {
                        match b[i] {
                            b'\\' | b'%' if i + 1 < b.len() => {
                                if b[i] == b'\\' && flags & EV_STRIP_ESC != 0 {
                                    i += 1;
                                } else {
                                    out.push(b[i]);
                                    i += 1;
                                }
                            }
                            b'{' => depth += 1,
                            b'}' => depth -= 1,
                            _ => {}
                        }
                        if depth > 0 {
                            out.push(b[i]);
                            i += 1;
                        }
                    }
                    if depth == 0 {
                        if flags & EV_STRIP == 0 {
                            out.push(b'}');
                        }
                        i += 1;
                    }
                    first = false;
                }
                _ if Some(c) == delim && stack.is_empty() => {
                    let token = self.cleanup(flags, first, &b[..i], out);
                    cursor.pos = Some(i + 1);
                    return Some(token);
                }
                b' ' => {
                    if compress {
                        if first {
                            i += 1;
                            continue;
                        } else if i > 0 && b[i - 1] == b' ' {
                            out.pop();
                        }
                    }
                    out.push(c);
                    i += 1;
                }
                b'[' | b'(' => {
                    if stack.len() < STACK_LIMIT {
                        stack.push(if c == b'[' { b']' } else { b')' });
                    }
                    out.push(c);
                    i += 1;
                    first = false;
                }
                ESC => {
                    i += copy_escape(b, i, &mut out);
                    first = false;
                }
                _ => {
                    first = false;
                    out.push(c);
                    i += 1;
                }
            }
        }

        let token = self.cleanup(flags, first, b, out);
        cursor.pos = None;
        Some(token)
    }

    /// Split a delimited argument list into at most `max_slots` arguments
    ///
    /// The cursor must sit just past the opening delimiter. The list runs to
    /// the matching `close` byte; inside it, arguments are separated by
    /// commas at depth zero and the final slot receives everything left,
    /// commas included. When `flags` contains `EV_EVAL`, each argument is
    /// passed through `eval` (with `EV_FCHECK` added) before being stored.
    ///
    /// # Returns
    /// `max_slots` entries with unused slots set to `None`, or `None` when
    /// the list has no closing delimiter
    pub fn split_list<F>(
        &self,
        cursor: &mut Cursor<'_>,
        close: u8,
        flags: EvalFlags,
        max_slots: usize,
        mut eval: F,
    ) -> Option<Vec<Option<String>>>
    where
        F: FnMut(&str, EvalFlags) -> String,
    {
        let mut slots: Vec<Option<String>> = vec![None; max_slots];
        let list = self.split_at(cursor, Some(close), 0)?;
        if cursor.is_exhausted() {
            return None;
        }

        let peval = flags & !EV_EVAL;
        let mut inner = Cursor::new(&list);
        let mut arg = 0;

        while arg < max_slots && !inner.is_exhausted() {
            let delim = if arg + 1 < max_slots { Some(b',') } else { None };
            let Some(token) = self.split_at(&mut inner, delim, peval) else {
                break;
            };
            slots[arg] = Some(if flags & EV_EVAL != 0 {
                eval(&token, flags | EV_FCHECK)
            } else {
                token
            });
            arg += 1;
        }

        Some(slots)
    }

    fn cleanup(&self, flags: EvalFlags, first: bool, consumed: &[u8], mut out: Vec<u8>) -> String {
        let no_compress = flags & EV_NO_COMPRESS != 0;
        let compress = self.space_compress && !no_compress;

        if (self.space_compress || flags & EV_STRIP_TS != 0)
            && !no_compress
            && !first
            && consumed.last() == Some(&b' ')
        {
            out.pop();
        }

        if flags & EV_STRIP_AROUND != 0 && out.first() == Some(&b'{') && out.last() == Some(&b'}') {
            out.pop();
            let mut lead = 1;
            if compress || flags & EV_STRIP_LS != 0 {
                while lead < out.len() && out[lead].is_ascii_whitespace() {
                    lead += 1;
                }
            }
            if compress || flags & EV_STRIP_TS != 0 {
                while out.len() > lead && out.last().is_some_and(|c| c.is_ascii_whitespace()) {
                    out.pop();
                }
            }
            out.drain(..lead);
        }

        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Copy one escape sequence starting at `b[i]` (an ESC byte) into `out`
///
/// # Returns
/// Number of bytes consumed
pub fn copy_escape(b: &[u8], i: usize, out: &mut Vec<u8>) -> usize {
    let mut j = i;
    out.push(b[j]);
    j += 1;
    if j < b.len() && b[j] == ANSI_CSI {
        loop {
            out.push(b[j]);
            j += 1;
            if !(j < b.len() && b[j] & 0xf0 == 0x30) {
                break;
            }
        }
    }
    while j < b.len() && b[j] & 0xf0 == 0x20 {
        out.push(b[j]);
        j += 1;
    }
    if j < b.len() {
        out.push(b[j]);
        j += 1;
    }
    j - i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_all(text: &str, delim: u8, flags: EvalFlags) -> Vec<String> {
        let tok = Tokenizer::new(true);
        let mut cursor = Cursor::new(text);
        let mut parts = Vec::new();
        while let Some(part) = tok.split_at(&mut cursor, Some(delim), flags) {
            parts.push(part);
        }
        parts
    }

    #[test]
    fn test_brackets_hide_delimiter() {
        assert_eq!(split_all("a[b,c],d", b',', 0), vec!["a[b,c]", "d"]);
        assert_eq!(split_all("a(b,c)", b',', 0), vec!["a(b,c)"]);
    }

    #[test]
    fn test_braces_copied_or_stripped() {
        assert_eq!(split_all("{a,b},c", b',', 0), vec!["{a,b}", "c"]);
        assert_eq!(split_all("{a,b},c", b',', EV_STRIP), vec!["a,b", "c"]);
        assert_eq!(split_all("{a{b}c}", b',', EV_STRIP), vec!["a{b}c"]);
    }

    #[test]
    fn test_escapes() {
        assert_eq!(split_all("a\\,b,c", b',', 0), vec!["a\\,b", "c"]);
        assert_eq!(split_all("a\\,b,c", b',', EV_STRIP_ESC), vec!["a,b", "c"]);
        assert_eq!(split_all("a%,b", b',', 0), vec!["a%,b"]);
    }

    #[test]
    fn test_space_compression() {
        assert_eq!(split_all("  a   b  ,c", b',', 0), vec!["a b", "c"]);
        let tok = Tokenizer::new(false);
        let mut cursor = Cursor::new("  a   b  ,c");
        assert_eq!(tok.split_at(&mut cursor, Some(b','), 0).unwrap(), "  a   b  ");
    }

    #[test]
    fn test_end_of_input_versus_empty_field() {
        let tok = Tokenizer::new(true);
        let mut cursor = Cursor::new("a,");
        assert_eq!(tok.split_at(&mut cursor, Some(b','), 0), Some("a".to_string()));
        assert_eq!(tok.split_at(&mut cursor, Some(b','), 0), Some(String::new()));
        assert!(cursor.is_exhausted());
        assert_eq!(tok.split_at(&mut cursor, Some(b','), 0), None);
    }

    #[test]
    fn test_missing_delimiter_exhausts() {
        let tok = Tokenizer::new(true);
        let mut cursor = Cursor::new("abc]");
        assert_eq!(tok.split_at(&mut cursor, Some(b')'), 0), Some("abc]".to_string()));
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_strip_around() {
        // Interior text is copied verbatim; only the edges are trimmed.
        assert_eq!(split_all("{ x  y }", b',', EV_STRIP_AROUND), vec!["x  y"]);
        assert_eq!(split_all("{x}y", b',', EV_STRIP_AROUND), vec!["{x}y"]);
    }

    #[test]
    fn test_escape_sequence_is_opaque() {
        assert_eq!(
            split_all("\x1b[1;31m;b", b';', 0),
            vec!["\x1b[1;31m", "b"]
        );
    }

    #[test]
    fn test_round_trip_balanced() {
        let text = "x[a,b],(c,d),{e,f},g";
        let parts = split_all(text, b',', 0);
        assert_eq!(parts.join(","), text);
    }

    #[test]
    fn test_split_list() {
        let tok = Tokenizer::new(true);
        let text = "1, 2 ,3) rest";
        let mut cursor = Cursor::new(text);
        let slots = tok
            .split_list(&mut cursor, b')', 0, 30, |s, _| s.to_string())
            .unwrap();
        assert_eq!(slots[0].as_deref(), Some("1"));
        assert_eq!(slots[1].as_deref(), Some("2"));
        assert_eq!(slots[2].as_deref(), Some("3"));
        assert!(slots[3].is_none());
        assert_eq!(cursor.rest(), Some(" rest"));
    }

    #[test]
    fn test_split_list_last_slot_takes_rest() {
        let tok = Tokenizer::new(true);
        let mut cursor = Cursor::new("a,b,c)");
        let slots = tok
            .split_list(&mut cursor, b')', 0, 2, |s, _| s.to_string())
            .unwrap();
        assert_eq!(slots, vec![Some("a".to_string()), Some("b,c".to_string())]);
    }

    #[test]
    fn test_split_list_evaluates_slots() {
        let tok = Tokenizer::new(true);
        let mut cursor = Cursor::new("x,y)");
        let slots = tok
            .split_list(&mut cursor, b')', EV_EVAL, 30, |s, f| {
                assert!(f & EV_FCHECK != 0);
                s.to_uppercase()
            })
            .unwrap();
        assert_eq!(slots[0].as_deref(), Some("X"));
        assert_eq!(slots[1].as_deref(), Some("Y"));
    }

    #[test]
    fn test_split_list_unterminated() {
        let tok = Tokenizer::new(true);
        let mut cursor = Cursor::new("a,b");
        assert!(tok
            .split_list(&mut cursor, b')', 0, 30, |s, _| s.to_string())
            .is_none());
    }
}
