//! # MUSH Command Queue
//!
//! Deferred execution of softcode commands.
//!
//! ## Features
//! - Player, object, wait and semaphore queues sharing one PID space
//! - Up-front payment with refunds, plus a per-owner runaway quota
//! - `@wait`, `@notify`, `@halt`, `@ps` and `@queue` operations
//! - Deterministic clock for ticking the scheduler from tests

pub mod entry;
pub mod error;
pub mod scheduler;

pub use entry::{QueueEntry, QueueKind, Semaphore};
pub use error::{QueueError, Result};
pub use scheduler::{
    now_secs, CommandRunner, NotifySwitch, PsMode, QueueRequest, Scheduler, SemaphoreMode,
};
