//! Evaluation and function flag bits
//!
//! Both sets are plain `u32` masks so they can be combined with `|` and
//! cleared with `& !FLAG` at each recursion step.

/// Evaluation flags passed down through [`Evaluator::evaluate`](crate::Evaluator::evaluate)
///
/// # Example
/// ```rust
/// use mush_softcode::flags::*;
/// let flags = EV_FCHECK | EV_EVAL;
/// assert_eq!(flags & EV_STRIP, 0);
/// ```
pub type EvalFlags = u32;

/// Unknown `name(` is an error rather than literal text
pub const EV_FMAND: EvalFlags = 0x0000_0100;

/// Look for `name(` function calls
pub const EV_FCHECK: EvalFlags = 0x0000_0200;

/// Remove one level of `{}` braces
pub const EV_STRIP: EvalFlags = 0x0000_0400;

/// Evaluate function arguments
pub const EV_EVAL: EvalFlags = 0x0000_0800;

/// Strip trailing spaces from tokens
pub const EV_STRIP_TS: EvalFlags = 0x0000_1000;

/// Strip leading spaces from tokens
pub const EV_STRIP_LS: EvalFlags = 0x0000_2000;

/// Drop the `\` of escaped characters while tokenizing
pub const EV_STRIP_ESC: EvalFlags = 0x0000_4000;

/// Strip a `{}` pair surrounding a whole token
pub const EV_STRIP_AROUND: EvalFlags = 0x0000_8000;

/// Outermost evaluation of a command
pub const EV_TOP: EvalFlags = 0x0001_0000;

/// Do not record trace output for this evaluation
pub const EV_NOTRACE: EvalFlags = 0x0002_0000;

/// Never compress spaces
pub const EV_NO_COMPRESS: EvalFlags = 0x0004_0000;

/// `%l` expands to nothing
pub const EV_NO_LOCATION: EvalFlags = 0x0008_0000;

/// `[` is literal text
pub const EV_NOFCHECK: EvalFlags = 0x0010_0000;

/// Function flags carried by registry entries
pub type FnFlags = u32;

/// Any number of arguments
pub const FN_VARARGS: FnFlags = 0x8000_0000;

/// Arguments are passed unevaluated
pub const FN_NO_EVAL: FnFlags = 0x4000_0000;

/// Body runs as the defining object
pub const FN_PRIV: FnFlags = 0x2000_0000;

/// Registers are restored after the call
pub const FN_PRES: FnFlags = 0x1000_0000;

/// Call sees an empty register set
pub const FN_NOREGS: FnFlags = 0x0800_0000;

/// Modifies the database
pub const FN_DBFX: FnFlags = 0x0400_0000;

/// Touches the command queue
pub const FN_QFX: FnFlags = 0x0200_0000;

/// Produces output to other objects
pub const FN_OUTFX: FnFlags = 0x0100_0000;

/// Touches object stacks
pub const FN_STACKFX: FnFlags = 0x0080_0000;

/// Touches global variables
pub const FN_VARFX: FnFlags = 0x0040_0000;

/// Maximum number of arguments any function call can receive
pub const MAX_NFARGS: usize = 30;

/// Number of positional arguments saved with a queued command
pub const NUM_ENV_VARS: usize = 10;

/// Largest text a single evaluation may produce, in bytes
pub const LBUF_SIZE: usize = 8000;

/// Length cap for short names (function names, colour specs)
pub const SBUF_SIZE: usize = 64;
