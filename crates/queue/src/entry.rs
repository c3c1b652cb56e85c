//! Queue entries
//!
//! A queued command is fully materialized when it is created: the command
//! text, its positional arguments and a copy of the register set all live
//! in the entry, so nothing about the code that queued it has to survive
//! until it runs.

use mush_core::{Dbref, A_SEMAPHORE};
use mush_softcode::flags::NUM_ENV_VARS;
use mush_softcode::RegisterData;

/// The four queues an entry can sit in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Commands enacted by players, run first
    Player,
    /// Commands enacted by objects, moved to the player queue each second
    Object,
    /// Timed waits, ordered by wake time
    Wait,
    /// Entries blocked on a semaphore
    Semaphore,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "Player",
            Self::Object => "Object",
            Self::Wait => "Wait",
            Self::Semaphore => "Semaphore",
        }
    }
}

/// Semaphore an entry waits on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semaphore {
    pub object: Dbref,
    /// Uppercased attribute holding the count
    pub attr: String,
}

impl Semaphore {
    pub fn new(object: Dbref, attr: &str) -> Self {
        Self {
            object,
            attr: attr.to_ascii_uppercase(),
        }
    }

    /// Whether this is the default `SEMAPHORE` attribute
    pub fn is_default(&self) -> bool {
        self.attr == A_SEMAPHORE
    }
}

/// One queued command
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub pid: u32,
    /// Executor; [`Dbref::NOTHING`] once the entry has been halted
    pub player: Dbref,
    /// Enactor
    pub cause: Dbref,
    pub command: String,
    /// Positional arguments (`%0`-`%9`)
    pub args: Vec<String>,
    /// Registers captured when the command was queued
    pub registers: Option<RegisterData>,
    /// Absolute wake time in seconds; 0 when untimed
    pub wait_until: i64,
    pub semaphore: Option<Semaphore>,
    /// Queue the entry currently sits in
    pub queue: QueueKind,
}

impl QueueEntry {
    /// Build an untimed entry, copying at most [`NUM_ENV_VARS`] arguments
    pub fn new(
        pid: u32,
        player: Dbref,
        cause: Dbref,
        command: &str,
        args: &[String],
        registers: Option<&RegisterData>,
    ) -> Self {
        Self {
            pid,
            player,
            cause,
            command: command.to_string(),
            args: args.iter().take(NUM_ENV_VARS).cloned().collect(),
            registers: registers.filter(|r| !r.is_empty()).cloned(),
            wait_until: 0,
            semaphore: None,
            queue: QueueKind::Player,
        }
    }

    /// Bytes needed to copy everything the entry carries
    ///
    /// # Returns
    /// `None` when the total does not fit in a `usize`
    pub fn required_size(command: &str, args: &[String], registers: Option<&RegisterData>) -> Option<usize> {
        let mut total = command.len().checked_add(1)?;
        for arg in args.iter().take(NUM_ENV_VARS) {
            total = total.checked_add(arg.len())?.checked_add(1)?;
        }
        if let Some(regs) = registers {
            total = total.checked_add(regs.byte_size()?)?;
        }
        Some(total)
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.player == Dbref::NOTHING
    }

    #[inline]
    pub fn is_timed(&self) -> bool {
        self.wait_until != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_caps_arguments() {
        let args: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let entry = QueueEntry::new(1, Dbref(2), Dbref(2), "say hi", &args, None);
        assert_eq!(entry.args.len(), NUM_ENV_VARS);
        assert!(!entry.is_halted());
        assert!(!entry.is_timed());
    }

    #[test]
    fn test_required_size() {
        let args = vec!["ab".to_string(), "c".to_string()];
        assert_eq!(QueueEntry::required_size("cmd", &args, None), Some(4 + 3 + 2));

        let mut regs = RegisterData::new();
        regs.set(0, "xyz", 36);
        let with_regs = QueueEntry::required_size("cmd", &[], Some(&regs)).unwrap();
        assert!(with_regs > 4);
    }

    #[test]
    fn test_semaphore_default() {
        assert!(Semaphore::new(Dbref(3), "semaphore").is_default());
        assert!(!Semaphore::new(Dbref(3), "LOCK").is_default());
    }
}
