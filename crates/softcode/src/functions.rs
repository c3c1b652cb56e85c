//! Function registry
//!
//! Builtins and user-defined (`@function`) functions share the
//! [`SoftFunction`] trait, so the evaluator resolves a name once and then
//! invokes whatever it found. Builtins are registered at startup and never
//! change; user functions can be defined while the server runs.

use crate::context::{EvalContext, RegisterScope};
use crate::error::{Result, SoftcodeError};
use crate::eval::Evaluator;
use crate::flags::*;
use mush_config::EngineConfig;
use mush_core::{Dbref, World};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a function needs while it runs
pub struct FunctionCall<'a> {
    pub evaluator: &'a Evaluator,
    pub ctx: &'a mut EvalContext,
    /// Uppercased name the function was called by
    pub name: &'a str,
    /// Executor
    pub player: Dbref,
    pub caller: Dbref,
    /// Enactor
    pub cause: Dbref,
    /// Evaluation flags of the call site
    pub flags: EvalFlags,
    /// Arguments, already evaluated unless the function is `FN_NO_EVAL`
    pub fargs: Vec<String>,
    /// Positional arguments of the enclosing evaluation (`%0`-`%9`)
    pub cargs: &'a [String],
}

impl<'a> FunctionCall<'a> {
    pub fn world(&self) -> &dyn World {
        self.evaluator.world()
    }

    pub fn config(&self) -> &EngineConfig {
        self.evaluator.config()
    }

    /// Argument `i`, or the empty string when absent
    pub fn arg(&self, i: usize) -> &str {
        self.fargs.get(i).map(String::as_str).unwrap_or("")
    }

    pub fn nargs(&self) -> usize {
        self.fargs.len()
    }

    /// Evaluate `text` as the same executor, caller and enactor
    pub fn evaluate(&mut self, text: &str, flags: EvalFlags) -> String {
        self.evaluator.evaluate_to_string(
            self.ctx,
            self.player,
            self.caller,
            self.cause,
            flags,
            text,
            self.cargs,
        )
    }

    /// Fail unless the argument count lies within `min..=max`
    pub fn check_range(&self, min: usize, max: usize) -> Result<()> {
        let got = self.fargs.len();
        if got >= min && got <= max {
            return Ok(());
        }
        let name = self.name.to_string();
        Err(if min == max {
            SoftcodeError::WrongArgCount {
                name,
                expected: min as i32,
                got,
            }
        } else {
            SoftcodeError::ArgCountRange { name, min, max, got }
        })
    }
}

/// A callable softcode function
pub trait SoftFunction: Send + Sync {
    /// Uppercased registry name
    fn name(&self) -> &str;

    /// Declared arity; negative means "at most `-n`, remainder joined into the last"
    fn nargs(&self) -> i32;

    fn flags(&self) -> FnFlags;

    /// Permission mask handed to the world's `may_use` check
    fn perms(&self) -> u32;

    /// User functions skip builtin arity and limitmask checks
    fn is_user_defined(&self) -> bool {
        false
    }

    /// Argument slots to split the call's argument list into
    fn max_args(&self) -> usize {
        if self.is_user_defined() {
            MAX_NFARGS
        } else if self.nargs() < 0 {
            self.nargs().unsigned_abs() as usize
        } else {
            MAX_NFARGS
        }
    }

    fn call(&self, call: &mut FunctionCall<'_>) -> Result<String>;
}

/// Signature shared by every builtin
pub type BuiltinFn = fn(&mut FunctionCall<'_>) -> Result<String>;

/// Builtin function table entry
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub nargs: i32,
    pub flags: FnFlags,
    pub perms: u32,
    pub handler: BuiltinFn,
}

impl Builtin {
    pub const fn new(name: &'static str, nargs: i32, flags: FnFlags, handler: BuiltinFn) -> Self {
        Self {
            name,
            nargs,
            flags,
            perms: 0,
            handler,
        }
    }
}

impl SoftFunction for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn nargs(&self) -> i32 {
        self.nargs
    }

    fn flags(&self) -> FnFlags {
        self.flags
    }

    fn perms(&self) -> u32 {
        self.perms
    }

    fn call(&self, call: &mut FunctionCall<'_>) -> Result<String> {
        (self.handler)(call)
    }
}

/// A function whose body is an attribute on some object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunction {
    pub name: String,
    pub obj: Dbref,
    pub attr: String,
    pub perms: u32,
    pub flags: FnFlags,
}

impl UserFunction {
    pub fn new(name: &str, obj: Dbref, attr: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            obj,
            attr: attr.to_ascii_uppercase(),
            perms: 0,
            flags: 0,
        }
    }

    pub fn with_flags(mut self, flags: FnFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl SoftFunction for UserFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn nargs(&self) -> i32 {
        MAX_NFARGS as i32
    }

    fn flags(&self) -> FnFlags {
        self.flags
    }

    fn perms(&self) -> u32 {
        self.perms
    }

    fn is_user_defined(&self) -> bool {
        true
    }

    fn call(&self, call: &mut FunctionCall<'_>) -> Result<String> {
        let Some(body) = call.world().get_attribute(self.obj, &self.attr) else {
            return Ok(String::new());
        };

        let executor = if self.flags & FN_PRIV != 0 {
            self.obj
        } else {
            call.player
        };
        let eflags = if self.flags & FN_NO_EVAL != 0 {
            EV_FCHECK | EV_EVAL
        } else {
            call.flags
        };
        let args = std::mem::take(&mut call.fargs);
        let evaluator = call.evaluator;
        let (caller, cause) = (call.player, call.cause);

        let result = call.ctx.with_scope(RegisterScope::from_flags(self.flags), |ctx| {
            evaluator.evaluate_to_string(ctx, executor, caller, cause, eflags, &body.value, &args)
        });
        Ok(result)
    }
}

/// Name-to-function lookup for builtins and user functions
pub struct FunctionRegistry {
    builtins: HashMap<String, Arc<dyn SoftFunction>>,
    user: RwLock<HashMap<String, Arc<dyn SoftFunction>>>,
}

impl FunctionRegistry {
    /// Registry holding every builtin
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for builtin in crate::builtins::all_builtins() {
            registry.register_builtin(builtin);
        }
        tracing::debug!("Registered {} builtin functions", registry.builtins.len());
        registry
    }

    /// Registry with nothing in it
    pub fn empty() -> Self {
        Self {
            builtins: HashMap::new(),
            user: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_builtin(&mut self, builtin: Builtin) {
        self.builtins
            .insert(builtin.name.to_ascii_uppercase(), Arc::new(builtin));
    }

    /// Define or replace a user function
    ///
    /// # Returns
    /// `false` when a builtin already owns the name
    pub fn define_user(&self, func: UserFunction) -> bool {
        if self.builtins.contains_key(&func.name) {
            return false;
        }
        tracing::debug!(
            "Defined user function {} as {}/{}",
            func.name,
            func.obj,
            func.attr
        );
        self.user.write().insert(func.name.clone(), Arc::new(func));
        true
    }

    pub fn remove_user(&self, name: &str) -> bool {
        self.user.write().remove(&name.to_ascii_uppercase()).is_some()
    }

    /// Look a function up by (already uppercased) name, builtins first
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn SoftFunction>> {
        if let Some(f) = self.builtins.get(name) {
            return Some(Arc::clone(f));
        }
        self.user.read().get(name).cloned()
    }

    pub fn builtin_count(&self) -> usize {
        self.builtins.len()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
