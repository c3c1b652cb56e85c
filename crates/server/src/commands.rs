//! Console command handling
//!
//! The [`Engine`] owns the world, the evaluator and the scheduler. Lines
//! typed at the console run straight away as the console player; commands
//! that come off the queue go through the same [`execute`] path.

use mush_config::EngineConfig;
use mush_core::{Dbref, World};
use mush_queue::{CommandRunner, NotifySwitch, PsMode, QueueEntry, QueueRequest, Scheduler};
use mush_softcode::flags::{EV_EVAL, EV_FCHECK, EV_STRIP, EV_TOP};
use mush_softcode::{Cursor, EvalContext, Evaluator, UserFunction};
use mush_world::MemoryWorld;
use std::sync::Arc;
use tracing::debug;

/// Flags for evaluating command arguments
const CMD_EVAL: u32 = EV_EVAL | EV_FCHECK | EV_STRIP | EV_TOP;

/// World, evaluator and queue behind one lock
pub struct Engine {
    world: Arc<MemoryWorld>,
    evaluator: Evaluator,
    scheduler: Scheduler,
    last_second: i64,
}

impl Engine {
    pub fn new(world: Arc<MemoryWorld>, config: Arc<EngineConfig>) -> Self {
        let shared: Arc<dyn World> = world.clone();
        let evaluator = Evaluator::new(Arc::clone(&shared), Arc::clone(&config));
        let scheduler = Scheduler::new(shared, config);
        let last_second = scheduler.now();
        Self {
            world,
            evaluator,
            scheduler,
            last_second,
        }
    }

    pub fn world(&self) -> &Arc<MemoryWorld> {
        &self.world
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[cfg(test)]
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Run a line typed by `player`
    pub fn submit(&mut self, player: Dbref, line: &str) {
        let mut ctx = EvalContext::for_command(line, None);
        ctx.start_command(line);
        execute_list(&self.evaluator, &mut self.scheduler, &mut ctx, player, player, line, &[]);
    }

    /// Advance the queue clock to `now` and run up to `chunk` commands
    ///
    /// # Returns
    /// Number of entries taken off the player queue
    pub fn tick(&mut self, now: i64, chunk: usize) -> usize {
        if now != self.last_second {
            self.last_second = now;
            self.scheduler.run_second(now);
        }
        let mut runner = Dispatcher {
            evaluator: &self.evaluator,
        };
        self.scheduler.run_top(chunk, &mut runner)
    }

    /// Messages sent since the last call
    pub fn drain_output(&self) -> Vec<(Dbref, String)> {
        self.world.take_all_messages()
    }
}

/// Runs dequeued commands through [`execute`]
struct Dispatcher<'a> {
    evaluator: &'a Evaluator,
}

impl CommandRunner for Dispatcher<'_> {
    fn run(&mut self, scheduler: &mut Scheduler, ctx: &mut EvalContext, entry: &QueueEntry) {
        debug!("Running PID {} for {}", entry.pid, entry.player);
        execute_list(
            self.evaluator,
            scheduler,
            ctx,
            entry.player,
            entry.cause,
            &entry.command,
            &entry.args,
        );
    }
}

/// Remove one level of surrounding braces
fn strip_braces(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(text)
}

/// Split `@name/sw1/sw2 rest` into its pieces
fn parse_command(line: &str) -> (String, Vec<String>, &str) {
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    let mut parts = head.split('/');
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    let switches = parts.map(str::to_ascii_lowercase).collect();
    (name, switches, rest.trim())
}

/// Run a `;`-separated list of commands
#[allow(clippy::too_many_arguments)]
fn execute_list(
    evaluator: &Evaluator,
    scheduler: &mut Scheduler,
    ctx: &mut EvalContext,
    player: Dbref,
    cause: Dbref,
    list: &str,
    args: &[String],
) {
    let mut cursor = Cursor::new(list);
    while let Some(command) = evaluator.tokenizer().split_at(&mut cursor, Some(b';'), 0) {
        let command = command.trim();
        if !command.is_empty() {
            execute(evaluator, scheduler, ctx, player, cause, command, args);
        }
    }
}

/// Run one command as `player` on behalf of `cause`
#[allow(clippy::too_many_arguments)]
pub fn execute(
    evaluator: &Evaluator,
    scheduler: &mut Scheduler,
    ctx: &mut EvalContext,
    player: Dbref,
    cause: Dbref,
    command: &str,
    args: &[String],
) {
    let world = evaluator.world();
    let eval = |ctx: &mut EvalContext, text: &str| {
        evaluator.evaluate_to_string(ctx, player, player, cause, CMD_EVAL, text, args)
    };

    if let Some(rest) = command.strip_prefix('&') {
        let (attr, rest) = rest.split_once(' ').unwrap_or((rest, ""));
        let (target, value) = rest.split_once('=').unwrap_or((rest, ""));
        let target = eval(ctx, target);
        let Some(thing) = world.match_thing(player, &target) else {
            world.notify(player, "I don't see that here.");
            return;
        };
        if !world.can_set_attribute(player, thing, attr) {
            world.notify(player, "Permission denied.");
            return;
        }
        world.set_attribute(thing, attr, value.trim(), world.owner(player));
        world.notify(player, "Set.");
        return;
    }

    let (name, switches, rest) = parse_command(command);
    let has = |sw: &str| switches.iter().any(|s| s == sw);

    match name.as_str() {
        "think" => {
            let result = eval(ctx, rest);
            world.notify(player, &result);
        }
        "@wait" => {
            let (event, action) = rest.split_once('=').unwrap_or((rest, ""));
            let event = eval(ctx, event);
            if has("pid") {
                let time = eval(ctx, action);
                let _ = scheduler.adjust_wait(player, &event, &time, has("until"));
                return;
            }
            let registers = ctx.registers.clone();
            let req = QueueRequest::new(player, cause, strip_braces(action))
                .with_args(args)
                .with_registers(&registers);
            let _ = scheduler.do_wait(req, &event, has("until"));
        }
        "@notify" => {
            let (what, count) = match rest.split_once('=') {
                Some((what, count)) => (eval(ctx, what), Some(eval(ctx, count))),
                None => (eval(ctx, rest), None),
            };
            let switch = if has("all") {
                NotifySwitch::All
            } else if has("drain") {
                NotifySwitch::Drain
            } else {
                NotifySwitch::Notify
            };
            let _ = scheduler.do_notify(player, &what, count.as_deref(), switch);
        }
        "@halt" => {
            let target = eval(ctx, rest);
            if has("pid") {
                let _ = scheduler.halt_pid(player, &target);
            } else {
                let target = (!target.is_empty()).then_some(target.as_str());
                let _ = scheduler.do_halt(player, target, has("all"));
            }
        }
        "@ps" => {
            let mode = if has("long") {
                PsMode::Long
            } else if has("summary") {
                PsMode::Summary
            } else {
                PsMode::Brief
            };
            let target = eval(ctx, rest);
            let target = (!target.is_empty()).then_some(target.as_str());
            let _ = scheduler.list(player, target, mode, has("all"));
        }
        "@kick" | "@warp" if !world.can_halt(player) => {
            world.notify(player, "Permission denied.");
        }
        "@kick" => {
            let n = eval(ctx, rest).trim().parse::<usize>().unwrap_or(0);
            let mut runner = Dispatcher { evaluator };
            scheduler.kick(player, n, &mut runner);
        }
        "@warp" => {
            let secs = eval(ctx, rest).trim().parse::<i64>().unwrap_or(0);
            scheduler.warp(player, secs);
        }
        "@function" => define_function(evaluator, player, rest),
        _ => {
            let result = eval(ctx, command);
            if !result.is_empty() {
                world.notify(player, &result);
            }
        }
    }
}

/// `@function name=obj/attr`
fn define_function(evaluator: &Evaluator, player: Dbref, rest: &str) {
    let world = evaluator.world();
    if !world.is_wizard(player) {
        world.notify(player, "Permission denied.");
        return;
    }
    let Some((fname, target)) = rest.split_once('=') else {
        world.notify(player, "Usage: @function <name>=<obj>/<attr>");
        return;
    };
    let (obj, attr) = target.split_once('/').unwrap_or((target, ""));
    let fname = fname.trim();
    let attr = attr.trim();
    if fname.is_empty() || attr.is_empty() {
        world.notify(player, "Usage: @function <name>=<obj>/<attr>");
        return;
    }
    let Some(thing) = world.match_thing(player, obj) else {
        world.notify(player, "I don't see that here.");
        return;
    };
    let readable = world
        .get_attribute(thing, attr)
        .is_some_and(|a| world.can_read_attribute(player, thing, &a));
    if !readable {
        world.notify(player, "No such attribute.");
        return;
    }

    let func = UserFunction::new(fname, thing, attr);
    let upper = func.name.clone();
    if evaluator.functions().define_user(func) {
        world.notify(player, &format!("Function {} defined.", upper));
    } else {
        world.notify(player, &format!("Function {} is a builtin.", upper));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        engine: Engine,
        wizard: Dbref,
        alice: Dbref,
        widget: Dbref,
    }

    fn harness() -> Harness {
        let world = Arc::new(MemoryWorld::new());
        let wizard = world.create_player("Wizard", true);
        let alice = world.create_player("Alice", false);
        let widget = world.create_thing("Widget", alice);
        let config = EngineConfig {
            machinecost: 0,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(world, Arc::new(config));
        engine.scheduler_mut().set_time(5000);
        engine.last_second = 5000;
        Harness {
            engine,
            wizard,
            alice,
            widget,
        }
    }

    impl Harness {
        fn said(&self, who: Dbref) -> Vec<String> {
            self.engine.world().take_messages(who)
        }
    }

    #[test]
    fn test_parse_command() {
        let (name, switches, rest) = parse_command("@PS/Long/all  me");
        assert_eq!(name, "@ps");
        assert_eq!(switches, vec!["long", "all"]);
        assert_eq!(rest, "me");
        assert_eq!(strip_braces(" {say hi} "), "say hi");
        assert_eq!(strip_braces("say hi"), "say hi");
    }

    #[test]
    fn test_think_and_echo() {
        let mut h = harness();
        h.engine.submit(h.alice, "think add(1,2)");
        assert_eq!(h.said(h.alice), vec!["3"]);

        h.engine.submit(h.alice, "[mul(2,3)]");
        assert_eq!(h.said(h.alice), vec!["6"]);
    }

    #[test]
    fn test_command_list() {
        let mut h = harness();
        h.engine.submit(h.alice, "think one; think two");
        assert_eq!(h.said(h.alice), vec!["one", "two"]);
    }

    #[test]
    fn test_set_attribute() {
        let mut h = harness();
        h.engine.submit(h.alice, "&greeting Widget=hello");
        assert_eq!(h.said(h.alice), vec!["Set."]);
        assert_eq!(
            h.engine.world().get_attribute(h.widget, "GREETING").unwrap().value,
            "hello"
        );

        h.engine.submit(h.wizard, "&other Widget=x");
        assert_eq!(h.said(h.wizard), vec!["Set."]);
    }

    #[test]
    fn test_wait_then_tick() {
        let mut h = harness();
        h.engine.submit(h.alice, "@wait 2={think later}");
        assert!(h.said(h.alice).is_empty());

        assert_eq!(h.engine.tick(5001, 10), 0);
        assert_eq!(h.engine.tick(5002, 10), 1);
        assert_eq!(h.said(h.alice), vec!["later"]);
    }

    #[test]
    fn test_wait_keeps_registers() {
        let mut h = harness();
        h.engine
            .submit(h.alice, "think setq(0,kept); @wait 1=think %q0");
        h.engine.tick(5001, 10);
        assert_eq!(h.said(h.alice), vec!["", "kept"]);
    }

    #[test]
    fn test_semaphore_round_trip() {
        let mut h = harness();
        h.engine.submit(h.alice, "@wait Widget=think released");
        h.engine.tick(5000, 10);
        assert!(h.said(h.alice).is_empty());

        h.engine.submit(h.alice, "@notify Widget");
        h.engine.tick(5000, 10);
        assert_eq!(h.said(h.alice), vec!["Notified.", "released"]);
    }

    #[test]
    fn test_halt_and_ps() {
        let mut h = harness();
        h.engine.submit(h.alice, "@wait 100=think never");
        h.engine.submit(h.alice, "@ps/summary");
        assert_eq!(
            h.said(h.alice),
            vec!["Totals: Player...0/0  Object...0/0  Wait...1/1  Semaphore...0/0"]
        );

        h.engine.submit(h.alice, "@halt");
        assert_eq!(h.said(h.alice), vec!["1 queue entries removed."]);
        assert!(h.engine.scheduler().is_empty());
    }

    #[test]
    fn test_kick_and_warp_need_privileges() {
        let mut h = harness();
        h.engine.submit(h.alice, "@kick 5");
        h.engine.submit(h.alice, "@warp 5");
        assert_eq!(h.said(h.alice), vec!["Permission denied.", "Permission denied."]);

        h.engine.submit(h.alice, "@wait 10=think warped");
        h.engine.submit(h.wizard, "@warp 10");
        h.engine.submit(h.wizard, "@kick 5");
        assert_eq!(
            h.said(h.wizard),
            vec!["WaitQ timer advanced 10 seconds.", "1 commands processed."]
        );
        assert_eq!(h.said(h.alice), vec!["warped"]);
    }

    #[test]
    fn test_function_definition() {
        let mut h = harness();
        h.engine.world().set_attr(h.widget, "DOUBLE", "[mul(%0,2)]");

        h.engine.submit(h.alice, "@function double=Widget/DOUBLE");
        assert_eq!(h.said(h.alice), vec!["Permission denied."]);

        h.engine.submit(h.wizard, "@function double=Widget/DOUBLE");
        assert_eq!(h.said(h.wizard), vec!["Function DOUBLE defined."]);

        h.engine.submit(h.alice, "think double(21)");
        assert_eq!(h.said(h.alice), vec!["42"]);

        h.engine.submit(h.wizard, "@function add=Widget/DOUBLE");
        assert_eq!(h.said(h.wizard), vec!["Function ADD is a builtin."]);
    }
}
