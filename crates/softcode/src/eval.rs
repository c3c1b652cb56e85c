//! Expression evaluator
//!
//! [`Evaluator::evaluate`] walks softcode text once, left to right, copying
//! plain runs straight into the output and dispatching on the handful of
//! special characters:
//!
//! - `\` copies the next character untouched
//! - `[...]` evaluates its contents as a mandatory function call
//! - `{...}` copies its contents with function checking off
//! - `%x` substitutions (arguments, registers, pronouns, colours, ...)
//! - `name(args)` calls a builtin or user function when function checking is on
//! - `#` tokens inside `iter()` and `switch()`
//! - ANSI escape sequences are copied as opaque units
//!
//! Nested evaluations append into the same [`OutputBuffer`] and only ever
//! look at what they wrote themselves.

use crate::ansi::{self, ANSI_NORMAL};
use crate::buffer::OutputBuffer;
use crate::context::EvalContext;
use crate::error::{Result, SoftcodeError};
use crate::flags::*;
use crate::functions::{FunctionCall, FunctionRegistry, SoftFunction};
use crate::registers::qidx;
use crate::tokenizer::{copy_escape, Cursor, Tokenizer};
use mush_config::EngineConfig;
use mush_core::{Dbref, World, A_SEX};
use std::sync::Arc;

const ESC: u8 = 0x1b;

const SUBJECTIVE: [&str; 5] = ["", "it", "she", "he", "they"];
const POSSESSIVE: [&str; 5] = ["", "its", "her", "his", "their"];
const OBJECTIVE: [&str; 5] = ["", "it", "her", "him", "them"];
const ABSOLUTE: [&str; 5] = ["", "its", "hers", "his", "theirs"];

/// Per-invocation scan state
struct Frame<'a> {
    player: Dbref,
    caller: Dbref,
    cause: Dbref,
    flags: EvalFlags,
    cargs: &'a [String],
    /// Output length when this evaluation began
    start: usize,
    at_space: bool,
    ansi: bool,
    gender: Option<usize>,
    alldone: bool,
}

/// The softcode interpreter
pub struct Evaluator {
    world: Arc<dyn World>,
    functions: FunctionRegistry,
    config: Arc<EngineConfig>,
    tokenizer: Tokenizer,
}

impl Evaluator {
    /// Create an evaluator with every builtin registered
    pub fn new(world: Arc<dyn World>, config: Arc<EngineConfig>) -> Self {
        Self::with_functions(world, config, FunctionRegistry::new())
    }

    pub fn with_functions(
        world: Arc<dyn World>,
        config: Arc<EngineConfig>,
        functions: FunctionRegistry,
    ) -> Self {
        let tokenizer = Tokenizer::new(config.space_compress);
        Self {
            world,
            functions,
            config,
            tokenizer,
        }
    }

    pub fn world(&self) -> &dyn World {
        self.world.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Evaluate `input` into a fresh string
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_to_string(
        &self,
        ctx: &mut EvalContext,
        player: Dbref,
        caller: Dbref,
        cause: Dbref,
        flags: EvalFlags,
        input: &str,
        cargs: &[String],
    ) -> String {
        let mut out = OutputBuffer::new();
        self.evaluate(ctx, &mut out, player, caller, cause, flags, input, cargs);
        out.into_string()
    }

    /// Evaluate `input`, appending the result to `out`
    ///
    /// # Arguments
    /// * `player` - Executor whose permissions and attributes are used
    /// * `caller` - Object that invoked this evaluation (`%@`)
    /// * `cause` - Enactor (`%#`, `%n`, pronouns)
    /// * `flags` - `EV_*` evaluation flags
    /// * `cargs` - Positional arguments (`%0`-`%9`)
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        ctx: &mut EvalContext,
        out: &mut OutputBuffer,
        player: Dbref,
        caller: Dbref,
        cause: Dbref,
        flags: EvalFlags,
        input: &str,
        cargs: &[String],
    ) {
        let mut frame = Frame {
            player,
            caller,
            cause,
            flags,
            cargs,
            start: out.len(),
            at_space: true,
            ansi: false,
            gender: None,
            alldone: false,
        };

        let is_trace = flags & EV_NOTRACE == 0 && self.world.is_tracing(player);
        let is_top = is_trace && ctx.trace.begin();

        let b = input.as_bytes();
        let mut i = 0;

        while i < b.len() && !frame.alldone {
            let hash_special = ctx.in_loop() || ctx.in_switch > 0;

            if !is_special(b[i], hash_special) {
                let mut j = i + 1;
                while j < b.len() && !is_special(b[j], hash_special) {
                    j += 1;
                }
                out.push_str(&input[i..j]);
                i = j;
                frame.at_space = false;
                if i >= b.len() {
                    break;
                }
            }

            match b[i] {
                b' ' => {
                    let compress = self.config.space_compress && frame.flags & EV_NO_COMPRESS == 0;
                    if !(compress && frame.at_space) {
                        out.push(' ');
                        frame.at_space = true;
                    }
                }
                b'\\' => {
                    frame.at_space = false;
                    if i + 1 < b.len() {
                        i += 1;
                        if let Some(c) = input[i..].chars().next() {
                            out.push(c);
                        }
                    }
                }
                b'[' => {
                    frame.at_space = false;
                    if frame.flags & EV_NOFCHECK != 0 {
                        out.push('[');
                    } else {
                        let mut cursor = Cursor::at(input, i + 1);
                        match self.tokenizer.split_at(&mut cursor, Some(b']'), 0) {
                            Some(inner) if !cursor.is_exhausted() => {
                                self.evaluate(
                                    ctx,
                                    out,
                                    frame.player,
                                    frame.caller,
                                    frame.cause,
                                    frame.flags | EV_FCHECK | EV_FMAND,
                                    &inner,
                                    frame.cargs,
                                );
                                i = cursor.position().unwrap_or(b.len()) - 1;
                            }
                            _ => {
                                out.push('[');
                            }
                        }
                    }
                }
                b'{' => {
                    frame.at_space = false;
                    let mut cursor = Cursor::at(input, i + 1);
                    match self.tokenizer.split_at(&mut cursor, Some(b'}'), 0) {
                        Some(inner) if !cursor.is_exhausted() => {
                            let strip = frame.flags & EV_STRIP != 0;
                            if !strip {
                                out.push('{');
                            }
                            let body = match inner.strip_prefix(' ') {
                                Some(rest) => {
                                    out.push(' ');
                                    rest
                                }
                                None => inner.as_str(),
                            };
                            // A kept literal block also keeps its brackets.
                            let inner_flags = if strip {
                                frame.flags & !(EV_STRIP | EV_FCHECK)
                            } else {
                                (frame.flags & !EV_FCHECK) | EV_NOFCHECK
                            };
                            self.evaluate(
                                ctx,
                                out,
                                frame.player,
                                frame.caller,
                                frame.cause,
                                inner_flags,
                                body,
                                frame.cargs,
                            );
                            if !strip {
                                out.push('}');
                            }
                            i = cursor.position().unwrap_or(b.len()) - 1;
                        }
                        _ => {
                            out.push('{');
                        }
                    }
                }
                b'%' => {
                    frame.at_space = false;
                    i = self.substitute(ctx, out, &mut frame, input, i);
                }
                b'(' => {
                    frame.at_space = false;
                    i = self.call_function(ctx, out, &mut frame, input, i);
                }
                b'#' => {
                    frame.at_space = false;
                    match self.hash_token(ctx, b.get(i + 1).copied()) {
                        Some(token) => {
                            out.push_str(&token);
                            i += 1;
                        }
                        None => {
                            out.push('#');
                        }
                    }
                }
                ESC => {
                    let mut end = i + copy_escape(b, i, &mut Vec::new());
                    while end < b.len() && !input.is_char_boundary(end) {
                        end += 1;
                    }
                    out.push_str(&input[i..end]);
                    i = end;
                    continue;
                }
                _ => {
                    if let Some(c) = input[i..].chars().next() {
                        out.push(c);
                    }
                }
            }

            i += char_len(b, i);
        }

        if self.config.space_compress && frame.at_space && frame.flags & EV_NO_COMPRESS == 0 {
            out.trim_trailing_space(frame.start);
        }

        if frame.ansi {
            out.push_str(ANSI_NORMAL);
        }

        if is_trace {
            ctx.trace
                .add(player, input, out.since(frame.start), self.config.trace_limit);
            let discarded = ctx.trace.discarded(self.config.trace_limit);
            if is_top || !self.config.trace_topdown {
                ctx.trace.flush(self.world.as_ref());
            }
            if is_top && discarded > 0 {
                self.world.notify(
                    player,
                    &format!("{} lines of trace output discarded.", discarded),
                );
            }
        }
    }

    /// Expand the `#` token whose second character is `next`
    fn hash_token(&self, ctx: &EvalContext, next: Option<u8>) -> Option<String> {
        let in_loop = ctx.loop_depth();
        match next? {
            b'#' => ctx.current_loop().map(|l| l.token.clone()),
            b'@' => ctx.current_loop().map(|l| l.number.to_string()),
            b'+' => ctx.current_loop().map(|l| l.token2.clone()),
            b'$' if ctx.in_switch > 0 => Some(ctx.switch_token.clone()),
            b'!' => Some(if in_loop > 0 {
                (in_loop - 1).to_string()
            } else {
                ctx.in_switch.to_string()
            }),
            _ => None,
        }
    }

    /// Handle a `%` substitution starting at `b[i] == '%'`
    ///
    /// # Returns
    /// Index of the last byte consumed
    fn substitute(
        &self,
        ctx: &mut EvalContext,
        out: &mut OutputBuffer,
        frame: &mut Frame<'_>,
        input: &str,
        mut i: usize,
    ) -> usize {
        let b = input.as_bytes();
        i += 1;
        let Some(&code) = b.get(i) else {
            return i - 1;
        };
        let savepos = out.len();

        match code {
            b'0'..=b'9' => {
                let n = (code - b'0') as usize;
                if let Some(arg) = frame.cargs.get(n) {
                    out.push_str(arg);
                }
            }
            b'r' | b'R' => out.push_str("\r\n"),
            b't' | b'T' => {
                out.push('\t');
            }
            b'b' | b'B' => {
                out.push(' ');
            }
            b'c' | b'C' if self.config.c_cmd_subst => out.push_str(&ctx.curr_cmd),
            b'c' | b'C' | b'x' | b'X' => {
                i += 1;
                if i >= b.len() {
                    return i - 1;
                }
                if !self.config.ansi_colors {
                    return i;
                }
                if b[i] == b'<' || b[i] == b'/' {
                    return self.xterm_colors(out, frame, input, i);
                }
                match ansi::ansi_letter(b[i]) {
                    Some(seq) => {
                        out.push_str(seq);
                        frame.ansi = b[i] != b'n';
                    }
                    None => {
                        if let Some(c) = input[i..].chars().next() {
                            out.push(c);
                        }
                    }
                }
            }
            b'=' => {
                if b.get(i + 1) != Some(&b'<') {
                    return i;
                }
                let Some((name, end)) = angle_text(input, i + 1) else {
                    return i + 1;
                };
                let name = name.to_ascii_uppercase();
                if let Some(attr) = self.world.get_attribute_inherited(frame.player, &name) {
                    if self.world.can_read_attribute(frame.player, frame.player, &attr) {
                        out.push_str(&attr.value);
                    }
                }
                i = end;
            }
            b'_' => {
                let key = if b.get(i + 1) == Some(&b'<') {
                    let Some((name, end)) = angle_text(input, i + 1) else {
                        return i + 1;
                    };
                    i = end;
                    format!("{}.{}", frame.player.get(), name.to_ascii_lowercase())
                } else {
                    i += 1;
                    let Some(&ch) = b.get(i) else {
                        return i - 1;
                    };
                    if !ch.is_ascii_alphanumeric() {
                        return i;
                    }
                    format!("{}.{}", frame.player.get(), ch.to_ascii_lowercase() as char)
                };
                if ctx.limitmask & FN_VARFX == 0 {
                    if let Some(value) = self.world.get_variable(&key) {
                        out.push_str(&value);
                    }
                }
            }
            b'v' | b'V' => {
                i += 1;
                let Some(&ch) = b.get(i) else {
                    return i - 1;
                };
                let ch = ch.to_ascii_uppercase();
                if ch.is_ascii_uppercase() {
                    let name = format!("V{}", ch as char);
                    if let Some(attr) = self.world.get_attribute_inherited(frame.player, &name) {
                        out.push_str(&attr.value);
                    }
                }
            }
            b'q' | b'Q' => {
                i += 1;
                let Some(&ch) = b.get(i) else {
                    return i - 1;
                };
                if ch != b'<' {
                    if let Some(idx) = qidx(ch as char, self.config.max_global_regs) {
                        if let Some(value) = ctx.registers.get(idx) {
                            out.push_str(value);
                        }
                    }
                } else {
                    let Some((name, end)) = angle_text(input, i) else {
                        return i;
                    };
                    if let Some(value) = ctx.registers.get_named(&name.to_ascii_lowercase()) {
                        out.push_str(value);
                    }
                    i = end;
                }
            }
            b'o' | b'O' => {
                let g = self.gender(frame);
                out.push_str(OBJECTIVE[g]);
            }
            b'p' | b'P' => {
                let g = self.gender(frame);
                out.push_str(POSSESSIVE[g]);
            }
            b's' | b'S' => {
                let g = self.gender(frame);
                out.push_str(SUBJECTIVE[g]);
            }
            b'a' | b'A' => {
                let g = self.gender(frame);
                out.push_str(ABSOLUTE[g]);
            }
            b'#' => out.push_str(&frame.cause.to_string()),
            b'!' => out.push_str(&frame.player.to_string()),
            b'@' => out.push_str(&frame.caller.to_string()),
            b'n' | b'N' => out.push_str(&self.world.name(frame.cause)),
            b'l' | b'L' => {
                if frame.flags & EV_NO_LOCATION == 0 {
                    out.push_str(&self.world.location(frame.cause).to_string());
                }
            }
            b':' => {
                out.push_str(&format!(
                    "{}:{}",
                    frame.cause,
                    self.world.creation_time(frame.cause)
                ));
            }
            b'm' | b'M' => out.push_str(&ctx.curr_cmd),
            b'i' | b'I' | b'j' | b'J' => {
                let second = matches!(code, b'j' | b'J');
                let (level, last) = self.loop_level(ctx, b, i);
                i = last;
                if let Some(lf) = level.and_then(|l| ctx.loop_at(l)) {
                    out.push_str(if second { &lf.token2 } else { &lf.token });
                }
            }
            b'+' => out.push_str(&frame.cargs.len().to_string()),
            b'|' => {
                if let Some(pout) = &ctx.pout {
                    out.push_str(pout);
                }
            }
            b'%' => {
                out.push('%');
            }
            _ => {
                if let Some(c) = input[i..].chars().next() {
                    out.push(c);
                }
            }
        }

        if code.is_ascii_uppercase() {
            out.capitalize_at(savepos);
        }
        i
    }

    /// Resolve the loop level named by `%i<d>` / `%i-<d>`
    ///
    /// # Returns
    /// The absolute level (if any) and the index of the last byte consumed
    fn loop_level(&self, ctx: &EvalContext, b: &[u8], code_at: usize) -> (Option<usize>, usize) {
        let in_loop = ctx.loop_depth() as i64;
        let mut i = code_at + 1;
        if i >= b.len() {
            return (None, code_at);
        }

        let level = if b[i] == b'-' {
            i += 1;
            if i >= b.len() {
                return (None, i - 1);
            }
            if !b[i].is_ascii_digit() {
                return (None, i);
            }
            (b[i] - b'0') as i64
        } else {
            if in_loop == 0 || !b[i].is_ascii_digit() {
                return (None, i);
            }
            let level = in_loop - 1 - (b[i] - b'0') as i64;
            if level < 0 {
                return (None, i);
            }
            level
        };

        if level > in_loop - 1 {
            return (None, i);
        }
        (Some(level as usize), i)
    }

    /// Handle `%x<...>` / `%x/<...>` sequences starting at `b[i]`
    fn xterm_colors(
        &self,
        out: &mut OutputBuffer,
        frame: &mut Frame<'_>,
        input: &str,
        mut i: usize,
    ) -> usize {
        let b = input.as_bytes();
        loop {
            let mut background = false;
            if b[i] == b'/' {
                if i + 1 >= b.len() {
                    break;
                }
                i += 1;
                background = true;
            }

            if b[i] != b'<' {
                break;
            }
            let Some((spec, end)) = angle_text(input, i) else {
                break;
            };
            if let Some(index) = ansi::str2xterm(&spec) {
                out.push_str(&ansi::xterm_code(index, background));
                frame.ansi = true;
            }
            i = end;

            match b.get(i + 1) {
                Some(b'<') | Some(b'/') => i += 1,
                _ => break,
            }
        }
        i
    }

    fn gender(&self, frame: &mut Frame<'_>) -> usize {
        let cause = frame.cause;
        *frame.gender.get_or_insert_with(|| {
            let sex = self
                .world
                .get_attribute_inherited(cause, A_SEX)
                .map(|a| a.value)
                .unwrap_or_default();
            match sex.bytes().next() {
                Some(b'P' | b'p') => 4,
                Some(b'M' | b'm') => 3,
                Some(b'F' | b'f' | b'W' | b'w') => 2,
                _ => 1,
            }
        })
    }

    /// Handle `(` at `b[i]`: try to call the function named by this frame's output
    ///
    /// # Returns
    /// Index of the last byte consumed
    fn call_function(
        &self,
        ctx: &mut EvalContext,
        out: &mut OutputBuffer,
        frame: &mut Frame<'_>,
        input: &str,
        i: usize,
    ) -> usize {
        if frame.flags & EV_FCHECK == 0 {
            out.push('(');
            return i;
        }

        let mut name = truncate_to(out.since(frame.start), SBUF_SIZE - 1).to_string();
        if self.config.space_compress && frame.flags & EV_FMAND != 0 {
            name.truncate(name.trim_end().len());
        }
        name.make_ascii_uppercase();

        let Some(func) = self.functions.lookup(&name) else {
            if frame.flags & EV_FMAND != 0 {
                out.truncate(frame.start);
                out.push_str(&SoftcodeError::FunctionNotFound(name).to_string());
                frame.alldone = true;
            } else {
                out.push('(');
            }
            frame.flags &= !EV_FCHECK;
            return i;
        };

        let feval = if func.flags() & FN_NO_EVAL != 0 {
            (frame.flags & !EV_EVAL) | EV_STRIP_ESC
        } else {
            frame.flags
        };

        let mut cursor = Cursor::at(input, i + 1);
        let (player, caller, cause, cargs) = (frame.player, frame.caller, frame.cause, frame.cargs);
        let slots = self.tokenizer.split_list(
            &mut cursor,
            b')',
            feval,
            func.max_args(),
            |text, flags| self.evaluate_to_string(ctx, player, caller, cause, flags, text, cargs),
        );

        let Some(slots) = slots else {
            out.push('(');
            frame.flags &= !EV_FCHECK;
            return i;
        };
        let next = cursor.position().unwrap_or(input.len());

        let used = slots.iter().rposition(Option::is_some).map_or(0, |p| p + 1);
        let mut fargs: Vec<String> = slots
            .into_iter()
            .take(used)
            .map(Option::unwrap_or_default)
            .collect();

        out.truncate(frame.start);

        let result = if func.is_user_defined() {
            self.invoke(ctx, func.as_ref(), &name, frame, feval, fargs)
        } else {
            if func.nargs() == 0 && fargs.len() == 1 && fargs[0].is_empty() {
                fargs.clear();
            }
            let got = fargs.len();
            let nargs = func.nargs();
            if got as i32 == nargs || got as i32 == -nargs || func.flags() & FN_VARARGS != 0 {
                self.invoke(ctx, func.as_ref(), &name, frame, feval, fargs)
            } else {
                Err(SoftcodeError::WrongArgCount {
                    name: name.clone(),
                    expected: nargs,
                    got,
                })
            }
        };

        match result {
            Ok(text) => out.push_str(&text),
            Err(err) => out.push_str(&err.to_string()),
        }

        frame.flags &= !EV_FCHECK;
        next - 1
    }

    /// Run `func` after the resource and permission checks
    fn invoke(
        &self,
        ctx: &mut EvalContext,
        func: &dyn SoftFunction,
        name: &str,
        frame: &Frame<'_>,
        feval: EvalFlags,
        fargs: Vec<String>,
    ) -> Result<String> {
        ctx.func_nest_lev += 1;
        ctx.func_invk_ctr += 1;

        let result = self.check_limits(ctx, func, frame.player).and_then(|()| {
            let mut call = FunctionCall {
                evaluator: self,
                ctx: &mut *ctx,
                name,
                player: frame.player,
                caller: frame.caller,
                cause: frame.cause,
                flags: feval,
                fargs,
                cargs: frame.cargs,
            };
            func.call(&mut call)
        });

        ctx.func_nest_lev -= 1;
        result
    }

    fn check_limits(&self, ctx: &EvalContext, func: &dyn SoftFunction, player: Dbref) -> Result<()> {
        if ctx.func_nest_lev >= self.config.func_nest_lim {
            tracing::debug!("Recursion limit hit by {} in {}", player, func.name());
            return Err(SoftcodeError::RecursionLimit);
        }
        if ctx.func_invk_ctr >= self.config.func_invk_lim {
            tracing::debug!("Invocation limit hit by {} in {}", player, func.name());
            return Err(SoftcodeError::InvocationLimit);
        }
        if ctx.cpu_exceeded(self.config.func_cpu_lim) {
            tracing::debug!("CPU limit hit by {} in {}", player, func.name());
            return Err(SoftcodeError::CpuLimit);
        }
        if self.world.is_going(player) {
            return Err(SoftcodeError::BadInvoker);
        }
        if !self.world.may_use(player, func.perms()) {
            return Err(SoftcodeError::PermissionDenied);
        }
        if !func.is_user_defined() && ctx.limitmask & func.flags() != 0 {
            return Err(SoftcodeError::PermissionDenied);
        }
        Ok(())
    }
}

fn is_special(c: u8, hash_special: bool) -> bool {
    match c {
        b' ' | b'\\' | b'[' | b'{' | b'%' | b'(' | ESC => true,
        b'#' => hash_special,
        _ => false,
    }
}

/// Byte length of the character starting at `b[i]`
fn char_len(b: &[u8], i: usize) -> usize {
    match b.get(i) {
        Some(&c) if c >= 0xf0 => 4,
        Some(&c) if c >= 0xe0 => 3,
        Some(&c) if c >= 0xc0 => 2,
        _ => 1,
    }
}

/// Text between `<` at `b[open]` and the next `>`
///
/// # Returns
/// The (length-capped) text and the index of the `>`, or `None` when
/// there is no closing `>`
fn angle_text(input: &str, open: usize) -> Option<(String, usize)> {
    let rest = input.get(open + 1..)?;
    let close = rest.find('>')?;
    let text = truncate_to(&rest[..close], SBUF_SIZE - 1).to_string();
    Some((text, open + 1 + close))
}

fn truncate_to(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    &s[..cut]
}
