//! Error types for the command queue
//!
//! The `Display` text of each variant is the exact line sent to the player
//! who asked for the operation.

use mush_core::MushError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("That is not a valid PID.")]
    InvalidPid,

    #[error("That PID is not associated with an active queue entry.")]
    NoSuchPid,

    #[error("That queue entry has already been halted.")]
    AlreadyHalted,

    /// Halted entries can no longer have their wait time changed
    #[error("That queue entry has been halted.")]
    EntryHalted,

    #[error("That is not a valid wait time.")]
    InvalidWaitTime,

    #[error("That semaphore does not have a wait time.")]
    NoWaitTime,

    #[error("Permission denied.")]
    PermissionDenied,

    #[error("No match.")]
    NoMatch,

    #[error("Invalid attribute.")]
    InvalidAttribute,

    #[error("Can't specify a target and /all")]
    TargetWithAll,

    #[error("Not enough money to queue command.")]
    NotEnoughMoney,

    /// Every PID is in use
    #[error("Could not queue command. The queue is full.")]
    QueueFull,

    /// Owner went over their quota and was halted
    #[error("Run away objects: too many commands queued.  Halted.")]
    RunAway,

    /// Sizing the entry overflowed
    #[error("Could not queue command. The entry is too large.")]
    EntryTooLarge,

    /// The executor is halted and may not queue anything
    #[error("Object is halted.")]
    ExecutorHalted,
}

impl From<QueueError> for MushError {
    fn from(err: QueueError) -> Self {
        MushError::Queue(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
