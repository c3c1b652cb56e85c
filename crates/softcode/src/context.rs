//! Per-command evaluation state
//!
//! One [`EvalContext`] is built for each top-level command and passed by
//! mutable reference through every nested evaluation. It holds the live
//! register set, the trace buffer, the resource counters and the loop and
//! switch stacks that `#`-tokens and `%i`/`%j` read from.

use crate::flags::{FnFlags, FN_NOREGS, FN_PRES};
use crate::registers::RegisterData;
use crate::trace::TraceCollector;
use crate::error::{Result, SoftcodeError};
use std::time::{Duration, Instant};

/// Deepest allowed nesting of `iter()` and friends
pub const MAX_ITER_NESTING: usize = 100;

/// How a nested call treats the caller's registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterScope {
    /// Callee reads and writes the caller's registers
    Shared,
    /// Callee works on the live set, which is put back afterwards
    Preserve,
    /// Callee starts empty and its registers are thrown away
    Isolate,
}

impl RegisterScope {
    /// Scope requested by a function's `FN_NOREGS` / `FN_PRES` flags
    pub fn from_flags(flags: FnFlags) -> Self {
        if flags & FN_NOREGS != 0 {
            Self::Isolate
        } else if flags & FN_PRES != 0 {
            Self::Preserve
        } else {
            Self::Shared
        }
    }
}

/// One active loop level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopFrame {
    /// Current element (`##`, `%i`)
    pub token: String,
    /// Second list element for paired loops (`#+`, `%j`)
    pub token2: String,
    /// One-based iteration number (`#@`)
    pub number: usize,
}

/// State threaded through one command's evaluation
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub registers: RegisterData,
    pub trace: TraceCollector,
    /// Current function nesting depth
    pub func_nest_lev: u32,
    /// Function calls made since the command started
    pub func_invk_ctr: u32,
    /// When the command started, for the CPU ceiling
    pub cpu_start: Instant,
    /// Text of the command being run (`%c`, `%m`)
    pub curr_cmd: String,
    /// Output piped from a previous command (`%|`)
    pub pout: Option<String>,
    loops: Vec<LoopFrame>,
    /// Depth of active `switch()` evaluation
    pub in_switch: u32,
    /// Value being switched on (`#$`)
    pub switch_token: String,
    /// Builtins carrying any of these flags are refused
    pub limitmask: FnFlags,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext {
    pub fn new() -> Self {
        Self {
            registers: RegisterData::new(),
            trace: TraceCollector::new(),
            func_nest_lev: 0,
            func_invk_ctr: 0,
            cpu_start: Instant::now(),
            curr_cmd: String::new(),
            pout: None,
            loops: Vec::new(),
            in_switch: 0,
            switch_token: String::new(),
            limitmask: 0,
        }
    }

    /// Fresh context for a queued command, seeded with its saved registers
    pub fn for_command(command: &str, registers: Option<RegisterData>) -> Self {
        let mut ctx = Self::new();
        ctx.curr_cmd = command.to_string();
        if let Some(regs) = registers {
            ctx.registers = regs;
        }
        ctx
    }

    /// Reset the per-command counters before running a new command
    pub fn start_command(&mut self, command: &str) {
        self.func_invk_ctr = 0;
        self.func_nest_lev = 0;
        self.cpu_start = Instant::now();
        self.curr_cmd.clear();
        self.curr_cmd.push_str(command);
    }

    /// Run `f` with the registers scoped as requested
    pub fn with_scope<R>(&mut self, scope: RegisterScope, f: impl FnOnce(&mut Self) -> R) -> R {
        match scope {
            RegisterScope::Shared => f(self),
            RegisterScope::Preserve => {
                let saved = self.registers.clone();
                let result = f(self);
                self.registers.restore(saved);
                result
            }
            RegisterScope::Isolate => {
                let saved = std::mem::take(&mut self.registers);
                let result = f(self);
                self.registers = saved;
                result
            }
        }
    }

    /// Whether the CPU budget has run out
    pub fn cpu_exceeded(&self, limit: Duration) -> bool {
        self.cpu_start.elapsed() > limit
    }

    // ========== Loops ==========

    /// Enter a new loop level
    pub fn push_loop(&mut self) -> Result<()> {
        if self.loops.len() >= MAX_ITER_NESTING {
            return Err(SoftcodeError::LoopNesting);
        }
        self.loops.push(LoopFrame::default());
        Ok(())
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    /// Innermost loop level, if any
    pub fn current_loop(&self) -> Option<&LoopFrame> {
        self.loops.last()
    }

    pub fn current_loop_mut(&mut self) -> Option<&mut LoopFrame> {
        self.loops.last_mut()
    }

    /// Loop level counted from the outermost (0 = outermost)
    pub fn loop_at(&self, level: usize) -> Option<&LoopFrame> {
        self.loops.get(level)
    }

    /// Number of active loop levels
    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    #[inline]
    pub fn in_loop(&self) -> bool {
        !self.loops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_stack() {
        let mut ctx = EvalContext::new();
        assert!(!ctx.in_loop());
        ctx.push_loop().unwrap();
        ctx.current_loop_mut().unwrap().token = "outer".into();
        ctx.push_loop().unwrap();
        ctx.current_loop_mut().unwrap().token = "inner".into();

        assert_eq!(ctx.current_loop().unwrap().token, "inner");
        assert_eq!(ctx.loop_at(0).unwrap().token, "outer");
        assert_eq!(ctx.loop_at(1).unwrap().token, "inner");
        assert!(ctx.loop_at(2).is_none());

        ctx.pop_loop();
        assert_eq!(ctx.loop_depth(), 1);
    }

    #[test]
    fn test_loop_nesting_cap() {
        let mut ctx = EvalContext::new();
        for _ in 0..MAX_ITER_NESTING {
            ctx.push_loop().unwrap();
        }
        assert_eq!(ctx.push_loop(), Err(SoftcodeError::LoopNesting));
    }

    #[test]
    fn test_register_scopes() {
        let mut ctx = EvalContext::new();
        ctx.registers.set(0, "caller", 36);

        let seen = ctx.with_scope(RegisterScope::Isolate, |inner| {
            let seen = inner.registers.get(0).map(String::from);
            inner.registers.set(0, "callee", 36);
            seen
        });
        assert_eq!(seen, None);
        assert_eq!(ctx.registers.get(0), Some("caller"));

        ctx.with_scope(RegisterScope::Preserve, |inner| inner.registers.set(0, "tmp", 36));
        assert_eq!(ctx.registers.get(0), Some("caller"));

        ctx.with_scope(RegisterScope::Shared, |inner| inner.registers.set(0, "kept", 36));
        assert_eq!(ctx.registers.get(0), Some("kept"));
        assert_eq!(RegisterScope::from_flags(FN_NOREGS | FN_PRES), RegisterScope::Isolate);
    }

    #[test]
    fn test_start_command_resets_counters() {
        let mut ctx = EvalContext::new();
        ctx.func_invk_ctr = 99;
        ctx.start_command("think hi");
        assert_eq!(ctx.func_invk_ctr, 0);
        assert_eq!(ctx.curr_cmd, "think hi");
        assert!(!ctx.cpu_exceeded(Duration::from_secs(60)));
    }
}
