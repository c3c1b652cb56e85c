//! Global register storage
//!
//! Registers are scratch values shared by every nested evaluation of one
//! command. Single-character registers (`%q0`-`%q9`, `%qa`-`%qz`) live in a
//! lazily-sized slot array; longer names live in a small ordered list.
//!
//! A [`RegisterData`] is an ordinary owned value. Isolation is a
//! `std::mem::take`, preservation a `clone` followed by [`RegisterData::restore`],
//! so whatever a nested call does to the live set is undone on every exit path.

use crate::error::{Result, SoftcodeError};

/// Slots allocated when only `0`-`9` have been touched
const BASE_QREGS: usize = 10;

/// Map a single-character register name to its slot
///
/// `0`-`9` map to 0-9 and letters (either case) to 10-35. Slots at or past
/// `max_global_regs` do not exist.
pub fn qidx(c: char, max_global_regs: usize) -> Option<usize> {
    let idx = match c {
        '0'..='9' => c as usize - '0' as usize,
        'a'..='z' => c as usize - 'a' as usize + 10,
        'A'..='Z' => c as usize - 'A' as usize + 10,
        _ => return None,
    };
    (idx < max_global_regs).then_some(idx)
}

/// Character naming slot `idx`
pub fn qname(idx: usize) -> Option<char> {
    match idx {
        0..=9 => char::from_digit(idx as u32, 10),
        10..=35 => Some((b'a' + (idx - 10) as u8) as char),
        _ => None,
    }
}

/// Whether `name` may be used as a named register
pub fn is_valid_register_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '#'))
}

/// One command's register set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterData {
    q_regs: Vec<String>,
    x_regs: Vec<(String, String)>,
    dirty: u64,
}

impl RegisterData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutation counter, bumped on every change
    #[inline]
    pub fn dirty(&self) -> u64 {
        self.dirty
    }

    /// No register holds a value
    pub fn is_empty(&self) -> bool {
        self.q_regs.iter().all(String::is_empty) && self.x_regs.is_empty()
    }

    /// Value of slot `idx`, `None` when unset
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.q_regs
            .get(idx)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Store `value` in slot `idx`; an empty value clears it
    pub fn set(&mut self, idx: usize, value: &str, max_global_regs: usize) {
        if idx >= max_global_regs {
            return;
        }
        if idx >= self.q_regs.len() {
            if value.is_empty() {
                return;
            }
            let size = if idx < BASE_QREGS {
                BASE_QREGS.min(max_global_regs)
            } else {
                max_global_regs
            };
            self.q_regs.resize(size.max(idx + 1), String::new());
        }
        self.q_regs[idx].clear();
        self.q_regs[idx].push_str(value);
        self.dirty += 1;
    }

    /// Value of a named register (case-insensitive)
    pub fn get_named(&self, name: &str) -> Option<&str> {
        self.x_regs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Store a named register
    ///
    /// # Returns
    /// `InvalidRegister` for a malformed name, `RegisterLimit` when a new
    /// name would exceed `register_limit`
    pub fn set_named(&mut self, name: &str, value: &str, register_limit: usize) -> Result<()> {
        if !is_valid_register_name(name) {
            return Err(SoftcodeError::InvalidRegister);
        }
        let pos = self
            .x_regs
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name));

        match (pos, value.is_empty()) {
            (Some(i), true) => {
                self.x_regs.remove(i);
            }
            (Some(i), false) => {
                self.x_regs[i].1 = value.to_string();
            }
            (None, true) => return Ok(()),
            (None, false) => {
                if self.x_regs.len() >= register_limit {
                    return Err(SoftcodeError::RegisterLimit);
                }
                self.x_regs.push((name.to_ascii_lowercase(), value.to_string()));
            }
        }
        self.dirty += 1;
        Ok(())
    }

    /// Store by name, picking the slot array for single characters
    pub fn set_by_name(
        &mut self,
        name: &str,
        value: &str,
        max_global_regs: usize,
        register_limit: usize,
    ) -> Result<()> {
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                let idx = qidx(c, max_global_regs).ok_or(SoftcodeError::InvalidRegister)?;
                self.set(idx, value, max_global_regs);
                Ok(())
            }
            _ => self.set_named(name, value, register_limit),
        }
    }

    /// Read by name, picking the slot array for single characters
    pub fn get_by_name(&self, name: &str, max_global_regs: usize) -> Result<Option<&str>> {
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                let idx = qidx(c, max_global_regs).ok_or(SoftcodeError::InvalidRegister)?;
                Ok(self.get(idx))
            }
            _ => Ok(self.get_named(name)),
        }
    }

    /// Names of all registers currently holding a value
    pub fn list(&self) -> Vec<String> {
        let singles = self
            .q_regs
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_empty())
            .filter_map(|(i, _)| qname(i).map(String::from));
        singles
            .chain(self.x_regs.iter().map(|(n, _)| n.clone()))
            .collect()
    }

    /// Put back a snapshot taken with `clone`
    ///
    /// Nothing happens when the live set has not changed since the snapshot.
    pub fn restore(&mut self, saved: RegisterData) {
        if saved.dirty == self.dirty {
            return;
        }
        *self = saved;
    }

    /// Bytes needed to copy every value, `None` on overflow
    pub fn byte_size(&self) -> Option<usize> {
        let q = self
            .q_regs
            .iter()
            .try_fold(0usize, |acc, v| acc.checked_add(v.len()))?;
        self.x_regs.iter().try_fold(q, |acc, (n, v)| {
            acc.checked_add(n.len())?.checked_add(v.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qidx() {
        assert_eq!(qidx('0', 36), Some(0));
        assert_eq!(qidx('a', 36), Some(10));
        assert_eq!(qidx('Z', 36), Some(35));
        assert_eq!(qidx('a', 10), None);
        assert_eq!(qidx('!', 36), None);
    }

    #[test]
    fn test_set_and_clear() {
        let mut regs = RegisterData::new();
        regs.set(3, "three", 36);
        regs.set(20, "k", 36);
        assert_eq!(regs.get(3), Some("three"));
        assert_eq!(regs.get(20), Some("k"));
        assert_eq!(regs.list(), vec!["3", "k"]);

        regs.set(3, "", 36);
        assert_eq!(regs.get(3), None);
        assert_eq!(regs.dirty(), 3);
    }

    #[test]
    fn test_named_registers() {
        let mut regs = RegisterData::new();
        regs.set_named("Total", "5", 2).unwrap();
        assert_eq!(regs.get_named("TOTAL"), Some("5"));
        assert_eq!(regs.list(), vec!["total"]);

        regs.set_named("b.c", "x", 2).unwrap();
        assert_eq!(regs.set_named("third", "y", 2), Err(SoftcodeError::RegisterLimit));
        assert_eq!(regs.set_named("9lives", "y", 2), Err(SoftcodeError::InvalidRegister));

        // Overwriting an existing name never hits the limit.
        regs.set_named("total", "6", 2).unwrap();
        assert_eq!(regs.get_named("total"), Some("6"));
    }

    #[test]
    fn test_by_name_dispatch() {
        let mut regs = RegisterData::new();
        regs.set_by_name("q", "single", 36, 50).unwrap();
        regs.set_by_name("long", "named", 36, 50).unwrap();
        assert_eq!(regs.get(qidx('q', 36).unwrap()), Some("single"));
        assert_eq!(regs.get_by_name("long", 36), Ok(Some("named")));
        assert_eq!(
            regs.set_by_name("!", "x", 36, 50),
            Err(SoftcodeError::InvalidRegister)
        );
    }

    #[test]
    fn test_restore_short_circuits() {
        let mut regs = RegisterData::new();
        regs.set(0, "keep", 36);

        let saved = regs.clone();
        regs.restore(saved.clone());
        assert_eq!(regs, saved);

        regs.set(0, "changed", 36);
        regs.set_named("tmp", "x", 50).unwrap();
        regs.restore(saved);
        assert_eq!(regs.get(0), Some("keep"));
        assert_eq!(regs.get_named("tmp"), None);
    }

    #[test]
    fn test_take_isolates() {
        let mut regs = RegisterData::new();
        regs.set(1, "caller", 36);
        let outer = std::mem::take(&mut regs);
        assert!(regs.is_empty());
        regs.set(1, "callee", 36);
        regs = outer;
        assert_eq!(regs.get(1), Some("caller"));
    }
}
