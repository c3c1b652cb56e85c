//! # MUSH Softcode Runtime
//!
//! The expression language every attribute, command and function body is
//! written in.
//!
//! ## Features
//! - Single-pass evaluator with `%`-substitutions, `[]` calls and `{}` grouping
//! - Builtin and user-defined (`@function`) functions behind one trait
//! - Single-character and named global registers with scoped save/restore
//! - Per-command resource ceilings (recursion, invocations, CPU time)
//! - Trace collection for objects with tracing turned on
//!
//! ## Layout
//!
//! - [`tokenizer`] splits text on delimiters while respecting nesting
//! - [`eval`] drives evaluation and function dispatch
//! - [`builtins`] holds the standard function library
//! - [`context`] carries per-command state between nested evaluations

pub mod ansi;
pub mod buffer;
pub mod builtins;
pub mod context;
pub mod error;
pub mod eval;
pub mod flags;
pub mod functions;
pub mod registers;
pub mod tokenizer;
pub mod trace;

pub use buffer::OutputBuffer;
pub use context::{EvalContext, LoopFrame, RegisterScope};
pub use error::{Result, SoftcodeError};
pub use eval::Evaluator;
pub use functions::{Builtin, BuiltinFn, FunctionCall, FunctionRegistry, SoftFunction, UserFunction};
pub use registers::RegisterData;
pub use tokenizer::{Cursor, Tokenizer};
pub use trace::{TraceCollector, TraceEntry};
