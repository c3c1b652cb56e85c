//! Built-in softcode functions
//!
//! Grouped the same way as the function reference: math, logic, strings,
//! lists (including the looping and switching functions), registers and
//! object access. Every builtin returns the text it produces; errors come
//! back as `Err` and are rendered inline by the evaluator.

use crate::context::{LoopFrame, RegisterScope};
use crate::error::{Result, SoftcodeError};
use crate::flags::*;
use crate::functions::{Builtin, FunctionCall};
use mush_core::{Attribute, Dbref};

/// Flags used when a no-eval builtin evaluates one of its arguments
const ARG_EVAL: EvalFlags = EV_STRIP | EV_FCHECK | EV_EVAL;

/// Every builtin function, ready to be registered
pub fn all_builtins() -> Vec<Builtin> {
    let mut table = Vec::new();

    register_math_functions(&mut table);
    register_logic_functions(&mut table);
    register_string_functions(&mut table);
    register_list_functions(&mut table);
    register_register_functions(&mut table);
    register_object_functions(&mut table);

    table
}

/// Register math functions
fn register_math_functions(table: &mut Vec<Builtin>) {
    table.push(Builtin::new("add", 2, 0, builtin_add));
    table.push(Builtin::new("sub", 2, 0, builtin_sub));
    table.push(Builtin::new("mul", 2, 0, builtin_mul));
    table.push(Builtin::new("div", 2, 0, builtin_div));
    table.push(Builtin::new("mod", 2, 0, builtin_mod));
    table.push(Builtin::new("abs", 1, 0, builtin_abs));
    table.push(Builtin::new("min", 0, FN_VARARGS, builtin_min));
    table.push(Builtin::new("max", 0, FN_VARARGS, builtin_max));
    table.push(Builtin::new("inc", 1, 0, builtin_inc));
    table.push(Builtin::new("dec", 1, 0, builtin_dec));
}

/// Register comparison and boolean functions
fn register_logic_functions(table: &mut Vec<Builtin>) {
    table.push(Builtin::new("eq", 2, 0, builtin_eq));
    table.push(Builtin::new("neq", 2, 0, builtin_neq));
    table.push(Builtin::new("gt", 2, 0, builtin_gt));
    table.push(Builtin::new("gte", 2, 0, builtin_gte));
    table.push(Builtin::new("lt", 2, 0, builtin_lt));
    table.push(Builtin::new("lte", 2, 0, builtin_lte));
    table.push(Builtin::new("not", 1, 0, builtin_not));
    table.push(Builtin::new("t", 1, 0, builtin_t));
    table.push(Builtin::new("if", 0, FN_VARARGS | FN_NO_EVAL, builtin_if));
    table.push(Builtin::new("ifelse", 3, FN_NO_EVAL, builtin_if));
}

/// Register string functions
fn register_string_functions(table: &mut Vec<Builtin>) {
    table.push(Builtin::new("strlen", -1, 0, builtin_strlen));
    table.push(Builtin::new("lcstr", -1, 0, builtin_lcstr));
    table.push(Builtin::new("ucstr", -1, 0, builtin_ucstr));
    table.push(Builtin::new("capstr", -1, 0, builtin_capstr));
    table.push(Builtin::new("mid", 3, 0, builtin_mid));
    table.push(Builtin::new("left", 2, 0, builtin_left));
    table.push(Builtin::new("right", 2, 0, builtin_right));
    table.push(Builtin::new("cat", 0, FN_VARARGS, builtin_cat));
    table.push(Builtin::new("strcat", 0, FN_VARARGS, builtin_strcat));
    table.push(Builtin::new("edit", 3, 0, builtin_edit));
    table.push(Builtin::new("repeat", 2, 0, builtin_repeat));
    table.push(Builtin::new("space", 0, FN_VARARGS, builtin_space));
    table.push(Builtin::new("trim", 0, FN_VARARGS, builtin_trim));
    table.push(Builtin::new("lit", -1, FN_NO_EVAL, builtin_lit));
}

/// Register list, loop and switch functions
fn register_list_functions(table: &mut Vec<Builtin>) {
    table.push(Builtin::new("words", 0, FN_VARARGS, builtin_words));
    table.push(Builtin::new("first", 0, FN_VARARGS, builtin_first));
    table.push(Builtin::new("rest", 0, FN_VARARGS, builtin_rest));
    table.push(Builtin::new("last", 0, FN_VARARGS, builtin_last));
    table.push(Builtin::new("lnum", 0, FN_VARARGS, builtin_lnum));
    table.push(Builtin::new("iter", 0, FN_VARARGS | FN_NO_EVAL, builtin_iter));
    table.push(Builtin::new("iter2", 0, FN_VARARGS | FN_NO_EVAL, builtin_iter2));
    table.push(Builtin::new("ilev", 0, 0, builtin_ilev));
    table.push(Builtin::new("inum", 1, 0, builtin_inum));
    table.push(Builtin::new("itext", 1, 0, builtin_itext));
    table.push(Builtin::new("itext2", 1, 0, builtin_itext2));
    table.push(Builtin::new("switch", 0, FN_VARARGS | FN_NO_EVAL, builtin_switch));
    table.push(Builtin::new("case", 0, FN_VARARGS | FN_NO_EVAL, builtin_case));
}

/// Register global register functions
fn register_register_functions(table: &mut Vec<Builtin>) {
    table.push(Builtin::new("setq", 0, FN_VARARGS, builtin_setq));
    table.push(Builtin::new("setr", 2, 0, builtin_setr));
    table.push(Builtin::new("r", 1, 0, builtin_r));
    table.push(Builtin::new("lregs", 0, 0, builtin_lregs));
    table.push(Builtin::new("localize", 1, FN_NO_EVAL, builtin_localize));
    table.push(Builtin::new("private", 1, FN_NO_EVAL, builtin_private));
}

/// Register object and attribute functions
fn register_object_functions(table: &mut Vec<Builtin>) {
    table.push(Builtin::new("u", 0, FN_VARARGS, builtin_u));
    table.push(Builtin::new("ulocal", 0, FN_VARARGS, builtin_ulocal));
    table.push(Builtin::new("uprivate", 0, FN_VARARGS, builtin_uprivate));
    table.push(Builtin::new("v", 1, 0, builtin_v));
    table.push(Builtin::new("get", 1, 0, builtin_get));
    table.push(Builtin::new("name", 1, 0, builtin_name));
    table.push(Builtin::new("num", 1, 0, builtin_num));
    table.push(Builtin::new("loc", 1, 0, builtin_loc));
    table.push(Builtin::new("owner", 1, 0, builtin_owner));
}

// ============================================================================
// HELPERS
// ============================================================================

fn parse_number(s: &str) -> Result<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0.0);
    }
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or(SoftcodeError::NotANumber)
}

fn parse_integer(s: &str) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<i64>().map_err(|_| SoftcodeError::NotAnInteger)
}

/// Render a number the way softcode prints it: integers without a fraction,
/// everything else with trailing zeros removed
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let s = format!("{:.6}", n);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn bool_str(b: bool) -> String {
    if b { "1" } else { "0" }.to_string()
}

/// Softcode truthiness
///
/// Dbrefs are true unless negative, numbers are true unless zero, and
/// any other non-empty text is true.
pub fn is_true(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    if let Some(rest) = s.strip_prefix('#') {
        let word = rest.split_whitespace().next().unwrap_or("");
        return word.parse::<i64>().map_or(true, |n| n >= 0);
    }
    match s.parse::<f64>() {
        Ok(n) => n != 0.0,
        Err(_) => true,
    }
}

fn split_list<'s>(list: &'s str, delim: &str) -> Vec<&'s str> {
    if delim == " " || delim.is_empty() {
        list.split_whitespace().collect()
    } else if list.is_empty() {
        Vec::new()
    } else {
        list.split(delim).collect()
    }
}

/// Delimiter argument `i`, defaulting to a space
fn delim_arg(call: &FunctionCall<'_>, i: usize) -> String {
    match call.fargs.get(i) {
        Some(d) if !d.is_empty() => d.clone(),
        _ => " ".to_string(),
    }
}

/// Case-insensitive wildcard match supporting `*` and `?`
pub fn quick_wild(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let t: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// Resolve `obj/attr` (or a bare attribute on the executor)
fn resolve_attr(call: &FunctionCall<'_>, spec: &str) -> Result<(Dbref, Option<Attribute>)> {
    let (thing, name) = match spec.split_once('/') {
        Some((obj, attr)) => {
            let thing = call
                .world()
                .match_thing(call.player, obj.trim())
                .ok_or(SoftcodeError::NoMatch)?;
            (thing, attr)
        }
        None => (call.player, spec),
    };
    let name = name.trim().to_ascii_uppercase();
    Ok((thing, call.world().get_attribute_inherited(thing, &name)))
}

fn match_object(call: &FunctionCall<'_>, name: &str) -> Result<Dbref> {
    call.world()
        .match_thing(call.player, name.trim())
        .ok_or(SoftcodeError::NoMatch)
}

// ============================================================================
// MATH FUNCTIONS
// ============================================================================

fn builtin_add(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(format_number(parse_number(call.arg(0))? + parse_number(call.arg(1))?))
}

fn builtin_sub(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(format_number(parse_number(call.arg(0))? - parse_number(call.arg(1))?))
}

fn builtin_mul(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(format_number(parse_number(call.arg(0))? * parse_number(call.arg(1))?))
}

fn builtin_div(call: &mut FunctionCall<'_>) -> Result<String> {
    let a = parse_integer(call.arg(0))?;
    let b = parse_integer(call.arg(1))?;
    if b == 0 {
        return Err(SoftcodeError::DivideByZero);
    }
    Ok(a.wrapping_div(b).to_string())
}

fn builtin_mod(call: &mut FunctionCall<'_>) -> Result<String> {
    let a = parse_integer(call.arg(0))?;
    let b = parse_integer(call.arg(1))?;
    if b == 0 {
        return Err(SoftcodeError::DivideByZero);
    }
    Ok(a.wrapping_rem(b).to_string())
}

fn builtin_abs(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(format_number(parse_number(call.arg(0))?.abs()))
}

fn builtin_min(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(1, MAX_NFARGS)?;
    let mut best = f64::INFINITY;
    for arg in &call.fargs {
        best = best.min(parse_number(arg)?);
    }
    Ok(format_number(best))
}

fn builtin_max(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(1, MAX_NFARGS)?;
    let mut best = f64::NEG_INFINITY;
    for arg in &call.fargs {
        best = best.max(parse_number(arg)?);
    }
    Ok(format_number(best))
}

fn builtin_inc(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(parse_integer(call.arg(0))?.wrapping_add(1).to_string())
}

fn builtin_dec(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(parse_integer(call.arg(0))?.wrapping_sub(1).to_string())
}

// ============================================================================
// LOGIC FUNCTIONS
// ============================================================================

fn compare(call: &FunctionCall<'_>) -> Result<std::cmp::Ordering> {
    let a = parse_number(call.arg(0))?;
    let b = parse_number(call.arg(1))?;
    Ok(a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal))
}

fn builtin_eq(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(compare(call)?.is_eq()))
}

fn builtin_neq(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(compare(call)?.is_ne()))
}

fn builtin_gt(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(compare(call)?.is_gt()))
}

fn builtin_gte(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(compare(call)?.is_ge()))
}

fn builtin_lt(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(compare(call)?.is_lt()))
}

fn builtin_lte(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(compare(call)?.is_le()))
}

fn builtin_not(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(!is_true(call.arg(0))))
}

fn builtin_t(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(bool_str(is_true(call.arg(0))))
}

/// `if(cond, then[, else])` and `ifelse(cond, then, else)`
fn builtin_if(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(2, 3)?;
    let args = std::mem::take(&mut call.fargs);
    let cond = call.evaluate(&args[0], ARG_EVAL);
    if is_true(&cond) {
        Ok(call.evaluate(&args[1], ARG_EVAL))
    } else if let Some(otherwise) = args.get(2) {
        Ok(call.evaluate(otherwise, ARG_EVAL))
    } else {
        Ok(String::new())
    }
}

// ============================================================================
// STRING FUNCTIONS
// ============================================================================

fn builtin_strlen(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call.arg(0).chars().count().to_string())
}

fn builtin_lcstr(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call.arg(0).to_lowercase())
}

fn builtin_ucstr(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call.arg(0).to_uppercase())
}

fn builtin_capstr(call: &mut FunctionCall<'_>) -> Result<String> {
    let mut chars = call.arg(0).chars();
    Ok(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    })
}

fn builtin_mid(call: &mut FunctionCall<'_>) -> Result<String> {
    let start = parse_integer(call.arg(1))?;
    let len = parse_integer(call.arg(2))?;
    if start < 0 || len < 0 {
        return Err(SoftcodeError::OutOfRange);
    }
    Ok(call
        .arg(0)
        .chars()
        .skip(start as usize)
        .take(len as usize)
        .collect())
}

fn builtin_left(call: &mut FunctionCall<'_>) -> Result<String> {
    let len = parse_integer(call.arg(1))?;
    if len < 0 {
        return Err(SoftcodeError::OutOfRange);
    }
    Ok(call.arg(0).chars().take(len as usize).collect())
}

fn builtin_right(call: &mut FunctionCall<'_>) -> Result<String> {
    let len = parse_integer(call.arg(1))?;
    if len < 0 {
        return Err(SoftcodeError::OutOfRange);
    }
    let total = call.arg(0).chars().count();
    Ok(call
        .arg(0)
        .chars()
        .skip(total.saturating_sub(len as usize))
        .collect())
}

fn builtin_cat(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call.fargs.join(" "))
}

fn builtin_strcat(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call.fargs.concat())
}

fn builtin_edit(call: &mut FunctionCall<'_>) -> Result<String> {
    let (text, from, to) = (call.arg(0), call.arg(1), call.arg(2));
    Ok(match from {
        "^" => format!("{}{}", to, text),
        "$" => format!("{}{}", text, to),
        "" => text.to_string(),
        _ => text.replace(from, to),
    })
}

fn builtin_repeat(call: &mut FunctionCall<'_>) -> Result<String> {
    let times = parse_integer(call.arg(1))?;
    let text = call.arg(0);
    if times <= 0 || text.is_empty() {
        return Ok(String::new());
    }
    let fit = (LBUF_SIZE - 1) / text.len();
    Ok(text.repeat((times as usize).min(fit)))
}

fn builtin_space(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(0, 1)?;
    let n = match call.fargs.first() {
        Some(arg) if !arg.trim().is_empty() => parse_integer(arg)?,
        _ => 1,
    };
    Ok(" ".repeat(n.clamp(0, LBUF_SIZE as i64 - 1) as usize))
}

/// `trim(string[, b|l|r[, char]])`
fn builtin_trim(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(1, 3)?;
    let style = call.arg(1).chars().next().map(|c| c.to_ascii_lowercase());
    let ch = call.arg(2).chars().next().unwrap_or(' ');
    let text = call.arg(0);
    Ok(match style {
        Some('l') => text.trim_start_matches(ch),
        Some('r') => text.trim_end_matches(ch),
        _ => text.trim_matches(ch),
    }
    .to_string())
}

fn builtin_lit(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call.arg(0).to_string())
}

// ============================================================================
// LIST FUNCTIONS
// ============================================================================

fn builtin_words(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(0, 2)?;
    let delim = delim_arg(call, 1);
    Ok(split_list(call.arg(0), &delim).len().to_string())
}

fn builtin_first(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(0, 2)?;
    let delim = delim_arg(call, 1);
    Ok(split_list(call.arg(0), &delim)
        .first()
        .map(|s| s.to_string())
        .unwrap_or_default())
}

fn builtin_rest(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(0, 2)?;
    let delim = delim_arg(call, 1);
    let list = call.arg(0);
    if delim == " " {
        let trimmed = list.trim_start();
        return Ok(trimmed
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim_start().to_string())
            .unwrap_or_default());
    }
    Ok(list
        .split_once(delim.as_str())
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_default())
}

fn builtin_last(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(0, 2)?;
    let delim = delim_arg(call, 1);
    Ok(split_list(call.arg(0), &delim)
        .last()
        .map(|s| s.to_string())
        .unwrap_or_default())
}

/// `lnum(n)` gives `0..n-1`; `lnum(lo, hi[, sep])` counts from `lo` to `hi`
fn builtin_lnum(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(1, 3)?;
    let (lo, hi) = if call.nargs() == 1 {
        let n = parse_integer(call.arg(0))?;
        if n <= 0 {
            return Ok(String::new());
        }
        (0, n - 1)
    } else {
        (parse_integer(call.arg(0))?, parse_integer(call.arg(1))?)
    };
    let sep = if call.nargs() == 3 { call.arg(2).to_string() } else { " ".to_string() };

    let mut out = String::new();
    let step: i64 = if lo <= hi { 1 } else { -1 };
    let mut n = lo;
    loop {
        if n != lo {
            out.push_str(&sep);
        }
        out.push_str(&n.to_string());
        if n == hi || out.len() >= LBUF_SIZE {
            break;
        }
        n += step;
    }
    Ok(out)
}

/// `iter(list, body[, delim[, osep]])`
fn builtin_iter(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(2, 4)?;
    perform_iter(call, false)
}

/// `iter2(list1, list2, body[, delim[, osep]])`
///
/// Walks both lists in step. Once the shorter list runs out its token is
/// empty for the remaining passes.
fn builtin_iter2(call: &mut FunctionCall<'_>) -> Result<String> {
    call.check_range(3, 5)?;
    perform_iter(call, true)
}

fn perform_iter(call: &mut FunctionCall<'_>, two_lists: bool) -> Result<String> {
    let args = std::mem::take(&mut call.fargs);
    let body_at = if two_lists { 2 } else { 1 };
    let list = call.evaluate(&args[0], ARG_EVAL);
    let list2 = if two_lists {
        call.evaluate(&args[1], ARG_EVAL)
    } else {
        String::new()
    };
    let delim = match args.get(body_at + 1) {
        Some(d) => call.evaluate(d, ARG_EVAL),
        None => " ".to_string(),
    };
    let delim = if delim.is_empty() { " ".to_string() } else { delim };
    let osep = match args.get(body_at + 2) {
        Some(s) => call.evaluate(s, ARG_EVAL),
        None => delim.clone(),
    };

    if call.ctx.push_loop().is_err() {
        call.world()
            .notify(call.player, "Exceeded maximum iteration nesting.");
        return Ok(String::new());
    }

    let invk_lim = call.config().func_invk_lim;
    let cpu_lim = call.config().func_cpu_lim;
    let words = split_list(&list, &delim);
    let words2 = split_list(&list2, &delim);
    let mut out = String::new();

    for n in 0..words.len().max(words2.len()) {
        if call.ctx.func_invk_ctr >= invk_lim || call.ctx.cpu_exceeded(cpu_lim) {
            break;
        }
        if n > 0 {
            out.push_str(&osep);
        }
        if let Some(frame) = call.ctx.current_loop_mut() {
            frame.token = words.get(n).map(|w| w.to_string()).unwrap_or_default();
            frame.token2 = words2.get(n).map(|w| w.to_string()).unwrap_or_default();
            frame.number = n + 1;
        }
        out.push_str(&call.evaluate(&args[body_at], ARG_EVAL));
        if out.len() >= LBUF_SIZE {
            break;
        }
    }

    call.ctx.pop_loop();
    Ok(out)
}

fn builtin_ilev(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok((call.ctx.loop_depth() as i64 - 1).to_string())
}

fn loop_level_arg(call: &FunctionCall<'_>) -> Result<usize> {
    let level = parse_integer(call.arg(0))?;
    if level < 0 || level >= call.ctx.loop_depth() as i64 {
        return Err(SoftcodeError::OutOfRange);
    }
    Ok(level as usize)
}

/// Read one field of the loop level named by the first argument
fn loop_field(call: &FunctionCall<'_>, field: fn(&LoopFrame) -> String) -> Result<String> {
    let level = loop_level_arg(call)?;
    Ok(call.ctx.loop_at(level).map(field).unwrap_or_default())
}

fn builtin_inum(call: &mut FunctionCall<'_>) -> Result<String> {
    loop_field(call, |l| l.number.to_string())
}

fn builtin_itext(call: &mut FunctionCall<'_>) -> Result<String> {
    loop_field(call, |l| l.token.clone())
}

fn builtin_itext2(call: &mut FunctionCall<'_>) -> Result<String> {
    loop_field(call, |l| l.token2.clone())
}

/// Shared body of `switch()` (wildcard patterns) and `case()` (exact matches)
fn do_switch(call: &mut FunctionCall<'_>, wild: bool) -> Result<String> {
    if call.nargs() < 2 {
        return Err(SoftcodeError::TooFewArgs {
            name: call.name.to_string(),
            min: 2,
            got: call.nargs(),
        });
    }
    let args = std::mem::take(&mut call.fargs);
    let target = call.evaluate(&args[0], ARG_EVAL);

    call.ctx.in_switch += 1;
    let saved_token = std::mem::replace(&mut call.ctx.switch_token, target.clone());

    let mut result = None;
    let mut i = 1;
    while i + 1 < args.len() {
        let pattern = call.evaluate(&args[i], ARG_EVAL);
        let hit = if wild {
            quick_wild(&pattern, &target)
        } else {
            pattern == target
        };
        if hit {
            result = Some(call.evaluate(&args[i + 1], ARG_EVAL));
            break;
        }
        i += 2;
    }
    if result.is_none() && args.len() % 2 == 0 {
        result = args.last().map(|default| call.evaluate(default, ARG_EVAL));
    }

    call.ctx.switch_token = saved_token;
    call.ctx.in_switch -= 1;
    Ok(result.unwrap_or_default())
}

fn builtin_switch(call: &mut FunctionCall<'_>) -> Result<String> {
    do_switch(call, true)
}

fn builtin_case(call: &mut FunctionCall<'_>) -> Result<String> {
    do_switch(call, false)
}

// ============================================================================
// REGISTER FUNCTIONS
// ============================================================================

fn set_register(call: &mut FunctionCall<'_>, name: &str, value: &str) -> Result<()> {
    let max_global_regs = call.config().max_global_regs;
    let register_limit = call.config().register_limit;
    call.ctx
        .registers
        .set_by_name(name.trim(), value, max_global_regs, register_limit)
}

/// `setq(name, value[, name, value]...)`
fn builtin_setq(call: &mut FunctionCall<'_>) -> Result<String> {
    let got = call.nargs();
    let name = call.name.to_string();
    if got < 2 {
        return Err(SoftcodeError::TooFewArgs { name, min: 2, got });
    }
    if got % 2 != 0 {
        return Err(SoftcodeError::OddArgCount { name, got });
    }
    if got > MAX_NFARGS - 2 {
        return Err(SoftcodeError::TooManyArgs {
            name,
            max: MAX_NFARGS - 2,
            got,
        });
    }

    let args = std::mem::take(&mut call.fargs);
    if got == 2 {
        set_register(call, &args[0], &args[1])?;
        return Ok(String::new());
    }

    let errors = args
        .chunks(2)
        .filter(|pair| set_register(call, &pair[0], &pair[1]).is_err())
        .count();
    if errors > 0 {
        return Err(SoftcodeError::RegisterErrors(errors));
    }
    Ok(String::new())
}

fn builtin_setr(call: &mut FunctionCall<'_>) -> Result<String> {
    let args = std::mem::take(&mut call.fargs);
    set_register(call, &args[0], &args[1])?;
    Ok(args[1].clone())
}

fn builtin_r(call: &mut FunctionCall<'_>) -> Result<String> {
    let max_global_regs = call.config().max_global_regs;
    Ok(call
        .ctx
        .registers
        .get_by_name(call.arg(0).trim(), max_global_regs)?
        .unwrap_or_default()
        .to_string())
}

fn builtin_lregs(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call.ctx.registers.list().join(" "))
}

fn scoped_eval(call: &mut FunctionCall<'_>, scope: RegisterScope) -> Result<String> {
    let body = std::mem::take(&mut call.fargs).into_iter().next().unwrap_or_default();
    let (evaluator, player, caller, cause, cargs) =
        (call.evaluator, call.player, call.caller, call.cause, call.cargs);
    Ok(call.ctx.with_scope(scope, |ctx| {
        evaluator.evaluate_to_string(ctx, player, caller, cause, ARG_EVAL, &body, cargs)
    }))
}

fn builtin_localize(call: &mut FunctionCall<'_>) -> Result<String> {
    scoped_eval(call, RegisterScope::Preserve)
}

fn builtin_private(call: &mut FunctionCall<'_>) -> Result<String> {
    scoped_eval(call, RegisterScope::Isolate)
}

// ============================================================================
// OBJECT FUNCTIONS
// ============================================================================

/// Shared body of `u()`, `ulocal()` and `uprivate()`
fn do_ufun(call: &mut FunctionCall<'_>, scope: RegisterScope) -> Result<String> {
    if call.fargs.is_empty() {
        return Err(SoftcodeError::TooFewArguments);
    }
    let mut args = std::mem::take(&mut call.fargs);
    let spec = args.remove(0);

    let (thing, attr) = resolve_attr(call, &spec)?;
    let Some(attr) = attr else {
        return Ok(String::new());
    };
    if attr.value.is_empty() {
        return Ok(String::new());
    }
    if !call.world().can_read_attribute(call.player, thing, &attr) {
        return Err(SoftcodeError::PermissionDenied);
    }

    let (evaluator, caller, cause) = (call.evaluator, call.player, call.cause);
    Ok(call.ctx.with_scope(scope, |ctx| {
        evaluator.evaluate_to_string(ctx, thing, caller, cause, EV_FCHECK | EV_EVAL, &attr.value, &args)
    }))
}

fn builtin_u(call: &mut FunctionCall<'_>) -> Result<String> {
    do_ufun(call, RegisterScope::Shared)
}

fn builtin_ulocal(call: &mut FunctionCall<'_>) -> Result<String> {
    do_ufun(call, RegisterScope::Preserve)
}

fn builtin_uprivate(call: &mut FunctionCall<'_>) -> Result<String> {
    do_ufun(call, RegisterScope::Isolate)
}

/// `v(x)`: a one-character name is a `%`-substitution, anything longer an attribute
fn builtin_v(call: &mut FunctionCall<'_>) -> Result<String> {
    let name = call.arg(0).trim().to_string();
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(String::new()),
        (Some(c), None) => Ok(call.evaluate(&format!("%{}", c), EV_FCHECK | EV_EVAL)),
        _ => {
            let Some(attr) = call
                .world()
                .get_attribute_inherited(call.player, &name.to_ascii_uppercase())
            else {
                return Ok(String::new());
            };
            if !call.world().can_read_attribute(call.player, call.player, &attr) {
                return Ok(String::new());
            }
            Ok(attr.value)
        }
    }
}

fn builtin_get(call: &mut FunctionCall<'_>) -> Result<String> {
    let spec = call.arg(0).to_string();
    if !spec.contains('/') {
        return Err(SoftcodeError::NoMatch);
    }
    let (thing, attr) = resolve_attr(call, &spec)?;
    match attr {
        Some(attr) if call.world().can_read_attribute(call.player, thing, &attr) => Ok(attr.value),
        Some(_) => Err(SoftcodeError::PermissionDenied),
        None => Ok(String::new()),
    }
}

fn builtin_name(call: &mut FunctionCall<'_>) -> Result<String> {
    let thing = match_object(call, call.arg(0))?;
    Ok(call.world().name(thing))
}

fn builtin_num(call: &mut FunctionCall<'_>) -> Result<String> {
    Ok(call
        .world()
        .match_thing(call.player, call.arg(0).trim())
        .unwrap_or(Dbref::NOTHING)
        .to_string())
}

fn builtin_loc(call: &mut FunctionCall<'_>) -> Result<String> {
    let thing = match_object(call, call.arg(0))?;
    Ok(call.world().location(thing).to_string())
}

fn builtin_owner(call: &mut FunctionCall<'_>) -> Result<String> {
    let thing = match_object(call, call.arg(0))?;
    Ok(call.world().owner(thing).to_string())
}
