//! Command scheduler
//!
//! Four queues hold PIDs into one entry table:
//!
//! - the player queue, run a few commands per tick;
//! - the object queue, appended to the player queue once a second so that
//!   object-driven loops cannot starve players;
//! - the wait queue, kept sorted by wake time;
//! - the semaphore queue, released by `@notify` or by a timeout.
//!
//! Every queued command is paid for up front and refunded when it runs or
//! is halted. An owner who goes over their quota has everything halted.

use crate::entry::{QueueEntry, QueueKind, Semaphore};
use crate::error::{QueueError, Result};
use mush_config::EngineConfig;
use mush_core::{Dbref, ObjectType, PidAllocator, World, A_SEMAPHORE};
use mush_softcode::{EvalContext, RegisterData};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in whole seconds since the epoch
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Layout of `@ps` output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsMode {
    /// One line per entry
    Brief,
    /// Totals only
    Summary,
    /// Entry lines plus enactor and arguments
    Long,
}

/// What a semaphore signal does with its waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreMode {
    /// Release up to `n` waiters and lower the count by `n`
    Notify(i64),
    /// Release every waiter and clear the count
    NotifyAll,
    /// Discard every waiter and clear the count
    Drain,
}

/// `@notify` switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifySwitch {
    Notify,
    All,
    Drain,
}

/// Runs a dequeued command
///
/// The scheduler is handed back so the command can queue or halt further
/// work while it runs.
pub trait CommandRunner {
    fn run(&mut self, scheduler: &mut Scheduler, ctx: &mut EvalContext, entry: &QueueEntry);
}

/// Who wants what queued
#[derive(Debug, Clone, Copy)]
pub struct QueueRequest<'a> {
    /// Executor
    pub player: Dbref,
    /// Enactor
    pub cause: Dbref,
    pub command: &'a str,
    pub args: &'a [String],
    pub registers: Option<&'a RegisterData>,
}

impl<'a> QueueRequest<'a> {
    pub fn new(player: Dbref, cause: Dbref, command: &'a str) -> Self {
        Self {
            player,
            cause,
            command,
            args: &[],
            registers: None,
        }
    }

    pub fn with_args(mut self, args: &'a [String]) -> Self {
        self.args = args;
        self
    }

    pub fn with_registers(mut self, registers: &'a RegisterData) -> Self {
        self.registers = Some(registers);
        self
    }
}

/// Whether an entry passes the owner and object filters
fn que_want(world: &dyn World, entry: &QueueEntry, owner: Option<Dbref>, object: Option<Dbref>) -> bool {
    if !world.is_valid(entry.player) {
        return false;
    }
    if owner.is_some_and(|o| o != world.owner(entry.player)) {
        return false;
    }
    if object.is_some_and(|o| o != entry.player) {
        return false;
    }
    true
}

/// Optional sign followed by digits
fn is_integer(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Integer with an optional fractional part
fn is_number(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    match body.split_once('.') {
        Some((int, frac)) => {
            !(int.is_empty() && frac.is_empty())
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Leading integer of `text`, 0 when there is none
fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (sign, body) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let end = body.bytes().take_while(u8::is_ascii_digit).count();
    body[..end].parse::<i64>().map_or(0, |n| sign * n)
}

fn valid_attr_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '#' | '`'))
}

/// The command queue
pub struct Scheduler {
    world: Arc<dyn World>,
    config: Arc<EngineConfig>,
    /// Key: PID, Value: entry
    entries: HashMap<u32, QueueEntry>,
    player_queue: VecDeque<u32>,
    object_queue: VecDeque<u32>,
    wait_queue: VecDeque<u32>,
    semaphore_queue: VecDeque<u32>,
    pids: PidAllocator,
    /// Entries currently charged to each owner
    queued: HashMap<Dbref, i64>,
    now: i64,
}

impl Scheduler {
    pub fn new(world: Arc<dyn World>, config: Arc<EngineConfig>) -> Self {
        tracing::debug!("Creating scheduler (max PID {})", config.max_qpid);
        Self {
            pids: PidAllocator::new(config.max_qpid),
            world,
            config,
            entries: HashMap::new(),
            player_queue: VecDeque::new(),
            object_queue: VecDeque::new(),
            wait_queue: VecDeque::new(),
            semaphore_queue: VecDeque::new(),
            queued: HashMap::new(),
            now: now_secs(),
        }
    }

    pub fn world(&self) -> &Arc<dyn World> {
        &self.world
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The scheduler's notion of the current time
    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn set_time(&mut self, now: i64) {
        self.now = now;
    }

    pub fn entry(&self, pid: u32) -> Option<&QueueEntry> {
        self.entries.get(&pid)
    }

    /// PIDs in one queue, front first
    pub fn pids_in(&self, kind: QueueKind) -> Vec<u32> {
        self.queue(kind).iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries currently charged to `owner`
    pub fn queued(&self, owner: Dbref) -> i64 {
        self.queued.get(&owner).copied().unwrap_or(0)
    }

    fn queue(&self, kind: QueueKind) -> &VecDeque<u32> {
        match kind {
            QueueKind::Player => &self.player_queue,
            QueueKind::Object => &self.object_queue,
            QueueKind::Wait => &self.wait_queue,
            QueueKind::Semaphore => &self.semaphore_queue,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut VecDeque<u32> {
        match kind {
            QueueKind::Player => &mut self.player_queue,
            QueueKind::Object => &mut self.object_queue,
            QueueKind::Wait => &mut self.wait_queue,
            QueueKind::Semaphore => &mut self.semaphore_queue,
        }
    }

    fn adjust_queued(&mut self, owner: Dbref, delta: i64) -> i64 {
        let count = self.queued.entry(owner).or_insert(0);
        *count += delta;
        if *count < 0 {
            tracing::warn!("Queue count for {} went negative", owner);
            *count = 0;
        }
        *count
    }

    fn quota(&self, owner: Dbref) -> usize {
        if self.world.is_wizard(owner) {
            usize::MAX
        } else {
            self.config.queuemax
        }
    }

    /// Send a failed command's message to `player`
    ///
    /// Failures inside [`setup_que`](Self::setup_que) have already told the owner.
    fn report<T>(&self, player: Dbref, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            let already_told = matches!(
                err,
                QueueError::ExecutorHalted
                    | QueueError::EntryTooLarge
                    | QueueError::QueueFull
                    | QueueError::NotEnoughMoney
                    | QueueError::RunAway
            );
            if !already_told {
                self.world.notify(player, &err.to_string());
            }
        }
        result
    }

    /// Adjust the count stored in `attr` on `thing`, returning the new value
    fn add_to(&self, doer: Dbref, thing: Dbref, attr: &str, amount: i64) -> i64 {
        let current = self
            .world
            .get_attribute(thing, attr)
            .map_or(0, |a| leading_int(&a.value));
        let num = current.saturating_add(amount);
        let value = if num != 0 { num.to_string() } else { String::new() };
        self.world
            .set_attribute(thing, attr, &value, self.world.owner(doer));
        num
    }

    // ========== Construction ==========

    /// Build an entry after the halt, size, PID, payment and quota checks
    ///
    /// The entry is not linked into any queue yet.
    pub fn setup_que(&mut self, req: QueueRequest<'_>) -> Result<QueueEntry> {
        let player = req.player;
        if self.world.is_halted(player) {
            return Err(QueueError::ExecutorHalted);
        }
        let owner = self.world.owner(player);

        if QueueEntry::required_size(req.command, req.args, req.registers).is_none() {
            tracing::warn!("Queue entry for {} is too large to copy", player);
            self.world.notify(owner, &QueueError::EntryTooLarge.to_string());
            return Err(QueueError::EntryTooLarge);
        }
        if self.pids.peek().is_none() {
            self.world.notify(owner, &QueueError::QueueFull.to_string());
            return Err(QueueError::QueueFull);
        }

        let mut cost = self.config.waitcost;
        if cost > 0
            && self.config.machinecost > 0
            && rand::thread_rng().gen_range(0..self.config.machinecost) == 0
        {
            cost += 1;
        }
        if !self.world.charge(player, cost) {
            self.world.notify(owner, &QueueError::NotEnoughMoney.to_string());
            return Err(QueueError::NotEnoughMoney);
        }

        let count = self.adjust_queued(owner, 1);
        if count as u64 > self.quota(owner) as u64 {
            self.world.notify(owner, &QueueError::RunAway.to_string());
            tracing::debug!("Runaway queue for {}, halting", owner);
            self.halt(Some(owner), None);
            self.world.set_halted(player, true);
            self.world.set_halted(owner, true);
            return Err(QueueError::RunAway);
        }

        let Some(pid) = self.pids.allocate() else {
            self.adjust_queued(owner, -1);
            self.world.refund(player, cost);
            self.world.notify(owner, &QueueError::QueueFull.to_string());
            return Err(QueueError::QueueFull);
        };

        tracing::debug!("Queued PID {} for {}: {}", pid, player, req.command);
        Ok(QueueEntry::new(
            pid,
            player,
            req.cause,
            req.command,
            req.args,
            req.registers,
        ))
    }

    /// Put an entry on the player or object queue, by enactor type
    fn give_que(&mut self, mut entry: QueueEntry) {
        entry.wait_until = 0;
        entry.queue = if self.world.object_type(entry.cause) == Some(ObjectType::Player) {
            QueueKind::Player
        } else {
            QueueKind::Object
        };
        self.link(entry);
    }

    /// Store an entry and append (or for waits, insert) its PID
    fn link(&mut self, entry: QueueEntry) {
        let pid = entry.pid;
        let kind = entry.queue;
        if kind == QueueKind::Wait {
            let when = entry.wait_until;
            let pos = self
                .wait_queue
                .iter()
                .position(|id| self.entries.get(id).is_some_and(|e| e.wait_until > when))
                .unwrap_or(self.wait_queue.len());
            self.wait_queue.insert(pos, pid);
        } else {
            self.queue_mut(kind).push_back(pid);
        }
        self.entries.insert(pid, entry);
    }

    fn unlink(&mut self, pid: u32, kind: QueueKind) {
        self.queue_mut(kind).retain(|&id| id != pid);
    }

    /// Drop an entry and free its PID
    fn free(&mut self, pid: u32) -> Option<QueueEntry> {
        self.pids.release(pid);
        self.entries.remove(&pid)
    }

    /// Queue a command to run as soon as possible
    pub fn queue_immediate(&mut self, req: QueueRequest<'_>) -> Result<u32> {
        let entry = self.setup_que(req)?;
        let pid = entry.pid;
        self.give_que(entry);
        Ok(pid)
    }

    /// Queue a command to run `delay` seconds from now
    pub fn queue_delayed(&mut self, delay: i64, req: QueueRequest<'_>) -> Result<u32> {
        if delay <= 0 {
            return self.queue_immediate(req);
        }
        let mut entry = self.setup_que(req)?;
        let pid = entry.pid;
        entry.wait_until = self.now.saturating_add(delay);
        entry.queue = QueueKind::Wait;
        self.link(entry);
        Ok(pid)
    }

    /// Queue a command behind the semaphore `attr` on `sem`
    ///
    /// A positive `timeout` releases the entry after that many seconds even
    /// if nobody signals the semaphore.
    pub fn queue_on_semaphore(&mut self, sem: Dbref, attr: &str, timeout: i64, req: QueueRequest<'_>) -> Result<u32> {
        let mut entry = self.setup_que(req)?;
        let pid = entry.pid;
        entry.semaphore = Some(Semaphore::new(sem, attr));
        if timeout > 0 {
            entry.wait_until = self.now.saturating_add(timeout);
        }
        entry.queue = QueueKind::Semaphore;
        self.link(entry);
        Ok(pid)
    }

    /// `@wait`: a timed wait, or a wait on `obj[/attr-or-timeout]`
    pub fn do_wait(&mut self, req: QueueRequest<'_>, event: &str, until: bool) -> Result<u32> {
        let result = self.try_wait(req, event, until);
        self.report(req.player, result)
    }

    fn try_wait(&mut self, req: QueueRequest<'_>, event: &str, until: bool) -> Result<u32> {
        let player = req.player;
        let event = event.trim();
        let howlong = |n: i64, now: i64| if until { (n - now).max(0) } else { n };

        if is_number(event) {
            let delay = howlong(leading_int(event), self.now);
            return self.queue_delayed(delay, req);
        }

        let (what, rest) = event.split_once('/').unwrap_or((event, ""));
        let thing = self
            .world
            .match_thing(player, what)
            .filter(|&t| self.world.is_valid(t))
            .ok_or(QueueError::NoMatch)?;
        if !self.world.controls(player, thing) && !self.world.is_link_ok(thing) {
            return Err(QueueError::PermissionDenied);
        }

        let rest = rest.trim();
        let (attr, timeout) = if rest.is_empty() {
            (A_SEMAPHORE.to_string(), 0)
        } else if is_number(rest) {
            (A_SEMAPHORE.to_string(), howlong(leading_int(rest), self.now))
        } else {
            if !valid_attr_name(rest) {
                return Err(QueueError::InvalidAttribute);
            }
            if !self.world.can_set_attribute(player, thing, rest) {
                return Err(QueueError::PermissionDenied);
            }
            (rest.to_ascii_uppercase(), 0)
        };

        if self.add_to(player, thing, &attr, 1) <= 0 {
            // Over-notified: the command runs right away.
            return self.queue_immediate(req);
        }
        self.queue_on_semaphore(thing, &attr, timeout, req)
    }

    // ========== Halting ==========

    /// Halt every entry matching the owner and object filters
    ///
    /// Entries in the player and object queues are only flagged and get
    /// dropped when they reach the front. Waiting entries are removed at once.
    ///
    /// # Returns
    /// Number of entries halted
    pub fn halt(&mut self, owner: Option<Dbref>, object: Option<Dbref>) -> usize {
        let halt_all = owner.is_none() && object.is_none();
        let mut per_owner: HashMap<Dbref, i64> = HashMap::new();
        let mut halted = 0usize;
        let world = Arc::clone(&self.world);

        for id in self.player_queue.iter().chain(self.object_queue.iter()) {
            let Some(entry) = self.entries.get_mut(id) else {
                continue;
            };
            if que_want(world.as_ref(), entry, owner, object) {
                halted += 1;
                if halt_all {
                    *per_owner.entry(world.owner(entry.player)).or_insert(0) += 1;
                }
                entry.player = Dbref::NOTHING;
            }
        }

        let mut removed = Vec::new();
        for kind in [QueueKind::Wait, QueueKind::Semaphore] {
            let entries = &self.entries;
            let queue = match kind {
                QueueKind::Wait => &mut self.wait_queue,
                _ => &mut self.semaphore_queue,
            };
            queue.retain(|id| {
                let want = entries
                    .get(id)
                    .is_some_and(|e| que_want(world.as_ref(), e, owner, object));
                if want {
                    removed.push(*id);
                }
                !want
            });
        }

        for id in removed {
            let Some(entry) = self.free(id) else {
                continue;
            };
            halted += 1;
            if halt_all {
                *per_owner.entry(world.owner(entry.player)).or_insert(0) += 1;
            }
            if let Some(sem) = &entry.semaphore {
                self.add_to(entry.player, sem.object, &sem.attr, -1);
            }
        }

        let waitcost = self.config.waitcost;
        if halt_all {
            for (who, count) in per_owner {
                world.refund(who, waitcost.saturating_mul(count as i32));
                self.queued.insert(who, 0);
            }
        } else {
            let payee = owner.unwrap_or_else(|| object.map_or(Dbref::NOTHING, |o| world.owner(o)));
            world.refund(payee, waitcost.saturating_mul(halted as i32));
            if object.is_none() {
                self.queued.insert(payee, 0);
            } else {
                self.adjust_queued(payee, -(halted as i64));
            }
        }

        tracing::debug!("Halted {} queue entries", halted);
        halted
    }

    fn parse_pid(&self, text: &str) -> Result<u32> {
        let text = text.trim();
        if !is_integer(text) {
            return Err(QueueError::InvalidPid);
        }
        let pid = leading_int(text);
        if pid < 1 || pid > i64::from(self.config.max_qpid) {
            return Err(QueueError::InvalidPid);
        }
        Ok(pid as u32)
    }

    /// `@halt/pid`: halt one entry
    pub fn halt_pid(&mut self, requester: Dbref, pid: &str) -> Result<()> {
        let result = self.try_halt_pid(requester, pid);
        self.report(requester, result)
    }

    fn try_halt_pid(&mut self, requester: Dbref, pid_text: &str) -> Result<()> {
        let pid = self.parse_pid(pid_text)?;
        let entry = self.entries.get(&pid).ok_or(QueueError::NoSuchPid)?;
        if entry.is_halted() {
            return Err(QueueError::AlreadyHalted);
        }
        if !(self.world.controls(requester, entry.player) || self.world.can_halt(requester)) {
            return Err(QueueError::PermissionDenied);
        }

        let victim = self.world.owner(entry.player);
        let executor = entry.player;
        let kind = entry.queue;
        match kind {
            QueueKind::Player | QueueKind::Object => {
                if let Some(entry) = self.entries.get_mut(&pid) {
                    entry.player = Dbref::NOTHING;
                }
            }
            kind => {
                self.unlink(pid, kind);
                if let Some(sem) = self.free(pid).and_then(|e| e.semaphore) {
                    self.add_to(executor, sem.object, &sem.attr, -1);
                }
            }
        }

        self.world.refund(victim, self.config.waitcost);
        self.adjust_queued(victim, -1);
        tracing::debug!("Halted PID {} for {}", pid, requester);
        self.world
            .notify(requester, &format!("Halted queue entry PID {}.", pid));
        Ok(())
    }

    /// Work out the `(owner, object)` filter for `@halt` and `@ps`
    ///
    /// No target selects the player's own entries, or only the object's
    /// when an object is asking. `privileged` skips the control check.
    fn resolve_target(
        &self,
        player: Dbref,
        target: Option<&str>,
        all: bool,
        privileged: bool,
    ) -> Result<(Option<Dbref>, Option<Dbref>)> {
        match target.map(str::trim).filter(|t| !t.is_empty()) {
            None if all => Ok((None, None)),
            None => {
                let object = (!self.world.is_player(player)).then_some(player);
                Ok((Some(self.world.owner(player)), object))
            }
            Some(name) => {
                let thing = self
                    .world
                    .match_thing(player, name)
                    .filter(|&t| self.world.is_valid(t))
                    .ok_or(QueueError::NoMatch)?;
                if !privileged && !self.world.controls(player, thing) {
                    return Err(QueueError::PermissionDenied);
                }
                if all {
                    return Err(QueueError::TargetWithAll);
                }
                if self.world.is_player(thing) {
                    Ok((Some(thing), None))
                } else {
                    Ok((None, Some(thing)))
                }
            }
        }
    }

    /// `@halt [target]` and `@halt/all`
    pub fn do_halt(&mut self, player: Dbref, target: Option<&str>, all: bool) -> Result<usize> {
        let result = self.try_halt(player, target, all);
        self.report(player, result)
    }

    fn try_halt(&mut self, player: Dbref, target: Option<&str>, all: bool) -> Result<usize> {
        let can_halt = self.world.can_halt(player);
        if all && !can_halt {
            return Err(QueueError::PermissionDenied);
        }

        let (owner, object) = self.resolve_target(player, target, all, can_halt)?;

        let halted = self.halt(owner, object);
        self.world.notify(
            self.world.owner(player),
            &format!("{} queue entries removed.", halted),
        );
        Ok(halted)
    }

    // ========== Semaphores ==========

    /// Release or discard the waiters on `thing`
    ///
    /// With `attr` set, nothing is released unless the stored count is
    /// positive. Without it, waiters on any attribute of `thing` match and
    /// the default semaphore count is updated.
    ///
    /// # Returns
    /// Number of waiters released or discarded
    pub fn signal_semaphore(&mut self, doer: Dbref, thing: Dbref, attr: Option<&str>, mode: SemaphoreMode) -> usize {
        let attr = attr.map(str::to_ascii_uppercase);
        let live = match &attr {
            Some(name) => {
                self.world
                    .get_attribute(thing, name)
                    .map_or(0, |a| leading_int(&a.value))
                    > 0
            }
            None => true,
        };

        let mut released = 0;
        if live {
            let limit = match mode {
                SemaphoreMode::Notify(n) => n.max(0) as usize,
                _ => usize::MAX,
            };
            let matching: Vec<u32> = self
                .semaphore_queue
                .iter()
                .copied()
                .filter(|id| {
                    self.entries
                        .get(id)
                        .and_then(|e| e.semaphore.as_ref())
                        .is_some_and(|s| s.object == thing && attr.as_ref().map_or(true, |a| &s.attr == a))
                })
                .take(limit)
                .collect();

            for id in matching {
                self.unlink(id, QueueKind::Semaphore);
                if mode == SemaphoreMode::Drain {
                    if let Some(entry) = self.free(id) {
                        self.world.refund(entry.player, self.config.waitcost);
                        let owner = self.world.owner(entry.player);
                        self.adjust_queued(owner, -1);
                    }
                } else if let Some(mut entry) = self.entries.remove(&id) {
                    entry.semaphore = None;
                    self.give_que(entry);
                }
                released += 1;
            }
        }

        let attr = attr.unwrap_or_else(|| A_SEMAPHORE.to_string());
        match mode {
            SemaphoreMode::Notify(n) => {
                self.add_to(doer, thing, &attr, -n);
            }
            SemaphoreMode::NotifyAll | SemaphoreMode::Drain => {
                self.world
                    .set_attribute(thing, &attr, "", self.world.owner(doer));
            }
        }

        tracing::debug!("Released {} waiters on {}/{}", released, thing, attr);
        released
    }

    /// `@notify[/all|/drain] obj[/attr][=count]`
    pub fn do_notify(&mut self, player: Dbref, what: &str, count: Option<&str>, switch: NotifySwitch) -> Result<usize> {
        let result = self.try_notify(player, what, count, switch);
        self.report(player, result)
    }

    fn try_notify(&mut self, player: Dbref, what: &str, count: Option<&str>, switch: NotifySwitch) -> Result<usize> {
        let (obj, attr) = what.split_once('/').unwrap_or((what, ""));
        let thing = self
            .world
            .match_thing(player, obj.trim())
            .filter(|&t| self.world.is_valid(t))
            .ok_or(QueueError::NoMatch)?;
        if !self.world.controls(player, thing) && !self.world.is_link_ok(thing) {
            return Err(QueueError::PermissionDenied);
        }

        let attr = attr.trim();
        let attr = if attr.is_empty() || !valid_attr_name(attr) {
            A_SEMAPHORE.to_string()
        } else if self.world.can_set_attribute(player, thing, attr) {
            attr.to_ascii_uppercase()
        } else {
            return Err(QueueError::PermissionDenied);
        };

        let count = match count.map(str::trim).filter(|c| !c.is_empty()) {
            Some(text) => leading_int(text),
            None => 1,
        };
        if count <= 0 {
            return Ok(0);
        }

        let mode = match switch {
            NotifySwitch::Notify => SemaphoreMode::Notify(count),
            NotifySwitch::All => SemaphoreMode::NotifyAll,
            NotifySwitch::Drain => SemaphoreMode::Drain,
        };
        let released = self.signal_semaphore(player, thing, Some(&attr), mode);
        let message = if switch == NotifySwitch::Drain { "Drained." } else { "Notified." };
        self.world.notify(player, message);
        Ok(released)
    }

    /// `@wait/pid`: change when an entry runs
    ///
    /// `+n`/`-n` shift the current wake time, a bare `n` means `n` seconds
    /// from now, and with `until` the time is absolute.
    pub fn adjust_wait(&mut self, player: Dbref, pid: &str, time: &str, until: bool) -> Result<()> {
        let result = self.try_adjust_wait(player, pid, time, until);
        self.report(player, result)
    }

    fn try_adjust_wait(&mut self, player: Dbref, pid_text: &str, time: &str, until: bool) -> Result<()> {
        let time = time.trim();
        if !is_integer(time) {
            return Err(QueueError::InvalidWaitTime);
        }
        let pid = self.parse_pid(pid_text)?;
        let entry = self.entries.get(&pid).ok_or(QueueError::NoSuchPid)?;
        if entry.is_halted() {
            return Err(QueueError::EntryHalted);
        }
        if !self.world.controls(player, entry.player) {
            return Err(QueueError::PermissionDenied);
        }
        if entry.semaphore.is_some() && !entry.is_timed() {
            return Err(QueueError::NoWaitTime);
        }

        let secs = leading_int(time);
        let now = self.now;
        let when = if until {
            if secs < 0 {
                now
            } else {
                secs
            }
        } else if time.starts_with(['+', '-']) {
            entry.wait_until.saturating_add(secs)
        } else {
            now.saturating_add(secs)
        };
        let when = match (until, when < 0) {
            (false, true) if time.starts_with('-') => now,
            (false, true) => i64::MAX,
            _ => when,
        };

        let kind = entry.queue;
        if kind == QueueKind::Semaphore {
            if let Some(entry) = self.entries.get_mut(&pid) {
                entry.wait_until = when;
            }
        } else {
            self.unlink(pid, kind);
            if let Some(mut entry) = self.entries.remove(&pid) {
                entry.wait_until = when;
                entry.queue = QueueKind::Wait;
                self.link(entry);
            }
        }

        self.world.notify(
            player,
            &format!("Adjusted wait time for queue entry PID {}.", pid),
        );
        Ok(())
    }

    // ========== Running ==========

    /// Once-a-second housekeeping
    ///
    /// Appends the object queue to the player queue, then moves due timed
    /// waits and expired semaphore waits onto the immediate queues.
    pub fn run_second(&mut self, now: i64) {
        self.now = now;

        for id in std::mem::take(&mut self.object_queue) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.queue = QueueKind::Player;
            }
            self.player_queue.push_back(id);
        }

        while let Some(&id) = self.wait_queue.front() {
            let due = self.entries.get(&id).map_or(true, |e| e.wait_until <= now);
            if !due {
                break;
            }
            self.wait_queue.pop_front();
            match self.entries.remove(&id) {
                Some(entry) => self.give_que(entry),
                None => tracing::warn!("Stale PID {} in wait queue", id),
            }
        }

        let expired: Vec<u32> = self
            .semaphore_queue
            .iter()
            .copied()
            .filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|e| e.is_timed() && e.wait_until <= now)
            })
            .collect();
        for id in expired {
            self.unlink(id, QueueKind::Semaphore);
            if let Some(mut entry) = self.entries.remove(&id) {
                if let Some(sem) = entry.semaphore.take() {
                    self.add_to(entry.player, sem.object, &sem.attr, -1);
                }
                self.give_que(entry);
            }
        }
    }

    /// Run up to `n` commands from the front of the player queue
    ///
    /// Halted entries and entries whose executor is being destroyed are
    /// dropped without running.
    ///
    /// # Returns
    /// Number of entries taken off the queue
    pub fn run_top(&mut self, n: usize, runner: &mut dyn CommandRunner) -> usize {
        let mut count = 0;
        while count < n {
            let Some(pid) = self.player_queue.pop_front() else {
                break;
            };
            count += 1;

            let Some(entry) = self.free(pid) else {
                tracing::warn!("Stale PID {} in player queue", pid);
                continue;
            };
            let player = entry.player;
            if entry.is_halted() || !self.world.is_valid(player) || self.world.is_going(player) {
                continue;
            }

            self.world.refund(player, self.config.waitcost);
            let owner = self.world.owner(player);
            self.adjust_queued(owner, -1);

            if self.world.is_halted(player) {
                continue;
            }

            let mut ctx = EvalContext::for_command(&entry.command, entry.registers.clone());
            ctx.start_command(&entry.command);
            runner.run(self, &mut ctx, &entry);
        }
        count
    }

    /// Seconds until the queue next needs attention
    pub fn next_wake(&self, now: i64) -> i64 {
        if !self.player_queue.is_empty() {
            return 0;
        }
        if !self.object_queue.is_empty() {
            return 1;
        }

        let mut min = 1000;
        let timed = self
            .wait_queue
            .iter()
            .chain(self.semaphore_queue.iter())
            .filter_map(|id| self.entries.get(id))
            .filter(|e| e.is_timed());
        for entry in timed {
            let left = entry.wait_until - now;
            if left <= 2 {
                return 1;
            }
            min = min.min(left);
        }
        min - 1
    }

    /// `@queue/warp`: move every timer forward by `secs`
    pub fn warp(&mut self, player: Dbref, secs: i64) {
        for id in &self.wait_queue {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.wait_until = entry.wait_until.saturating_sub(secs);
            }
        }
        for id in &self.semaphore_queue {
            if let Some(entry) = self.entries.get_mut(id) {
                if entry.wait_until > 0 {
                    entry.wait_until = entry.wait_until.saturating_sub(secs);
                    if entry.wait_until <= 0 {
                        entry.wait_until = -1;
                    }
                }
            }
        }
        self.run_second(self.now);

        let message = match secs.signum() {
            1 => format!("WaitQ timer advanced {} seconds.", secs),
            -1 => format!("WaitQ timer set back {} seconds.", secs),
            _ => "Object queue appended to player queue.".to_string(),
        };
        self.world.notify(player, &message);
    }

    /// `@queue/kick`: run `n` commands now
    pub fn kick(&mut self, player: Dbref, n: usize, runner: &mut dyn CommandRunner) -> usize {
        let processed = self.run_top(n, runner);
        self.world
            .notify(player, &format!("{} commands processed.", processed));
        processed
    }

    // ========== Listing ==========

    /// `@ps`: list queued commands
    pub fn list(&self, requester: Dbref, target: Option<&str>, mode: PsMode, all: bool) -> Result<()> {
        let result = self.try_list(requester, target, mode, all);
        self.report(requester, result)
    }

    fn try_list(&self, requester: Dbref, target: Option<&str>, mode: PsMode, all: bool) -> Result<()> {
        let see_all = self.world.can_see_queue(requester);
        if all && !see_all {
            return Err(QueueError::PermissionDenied);
        }

        let (owner, object) = self.resolve_target(requester, target, all, see_all)?;

        let mut totals = Vec::new();
        for kind in [
            QueueKind::Player,
            QueueKind::Object,
            QueueKind::Wait,
            QueueKind::Semaphore,
        ] {
            totals.push(self.show_queue(requester, kind, mode, owner, object));
        }
        let [(pe, pt, pd), (oe, ot, od), (we, wt, _), (se, st, _)] = [totals[0], totals[1], totals[2], totals[3]];

        let line = if see_all {
            format!(
                "Totals: Player...{}/{}[{}del]  Object...{}/{}[{}del]  Wait...{}/{}  Semaphore...{}/{}",
                pe, pt, pd, oe, ot, od, we, wt, se, st
            )
        } else {
            format!(
                "Totals: Player...{}/{}  Object...{}/{}  Wait...{}/{}  Semaphore...{}/{}",
                pe, pt, oe, ot, we, wt, se, st
            )
        };
        self.world.notify(requester, &line);
        Ok(())
    }

    fn unparse(&self, thing: Dbref) -> String {
        format!("{}({})", self.world.name(thing), thing)
    }

    /// Print one queue
    ///
    /// # Returns
    /// `(shown, total, halted)` counts
    fn show_queue(
        &self,
        requester: Dbref,
        kind: QueueKind,
        mode: PsMode,
        owner: Option<Dbref>,
        object: Option<Dbref>,
    ) -> (usize, usize, usize) {
        let (mut shown, mut total, mut halted) = (0, 0, 0);

        for entry in self.queue(kind).iter().filter_map(|id| self.entries.get(id)) {
            total += 1;
            if !que_want(self.world.as_ref(), entry, owner, object) {
                if entry.is_halted() {
                    halted += 1;
                }
                continue;
            }
            shown += 1;
            if mode == PsMode::Summary {
                continue;
            }
            if shown == 1 {
                self.world
                    .notify(requester, &format!("----- {} Queue -----", kind.as_str()));
            }

            let who = self.unparse(entry.player);
            let left = entry.wait_until - self.now;
            let line = match &entry.semaphore {
                Some(sem) if entry.wait_until > 0 => {
                    format!("[{}/{}] {}:{}:{}", sem.object, left, entry.pid, who, entry.command)
                }
                None if entry.wait_until > 0 => {
                    format!("[{}] {}:{}:{}", left, entry.pid, who, entry.command)
                }
                Some(sem) if sem.is_default() => {
                    format!("[{}] {}:{}:{}", sem.object, entry.pid, who, entry.command)
                }
                Some(sem) => format!(
                    "[{}/{}] {}:{}:{}",
                    sem.object, sem.attr, entry.pid, who, entry.command
                ),
                None => format!("{}:{}:{}", entry.pid, who, entry.command),
            };
            self.world.notify(requester, &line);

            if mode == PsMode::Long {
                let args: String = entry
                    .args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| format!("; Arg{}='{}'", i, arg))
                    .collect();
                self.world.notify(
                    requester,
                    &format!("   Enactor: {}{}", self.unparse(entry.cause), args),
                );
            }
        }

        (shown, total, halted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mush_world::{MemoryWorld, START_MONEY};

    struct Recorder {
        ran: Vec<String>,
        registers: Vec<Option<String>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                ran: Vec::new(),
                registers: Vec::new(),
            }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&mut self, _scheduler: &mut Scheduler, ctx: &mut EvalContext, entry: &QueueEntry) {
            self.ran.push(entry.command.clone());
            self.registers.push(ctx.registers.get(0).map(String::from));
        }
    }

    struct Harness {
        world: Arc<MemoryWorld>,
        sched: Scheduler,
        alice: Dbref,
        bob: Dbref,
        wizard: Dbref,
        widget: Dbref,
    }

    fn harness_with(queuemax: usize) -> Harness {
        let world = Arc::new(MemoryWorld::new());
        let alice = world.create_player("Alice", false);
        let bob = world.create_player("Bob", false);
        let wizard = world.create_player("Wizard", true);
        let widget = world.create_thing("Widget", alice);
        let config = EngineConfig {
            machinecost: 0,
            queuemax,
            ..EngineConfig::default()
        };
        let mut sched = Scheduler::new(world.clone(), Arc::new(config));
        sched.set_time(1000);
        Harness {
            world,
            sched,
            alice,
            bob,
            wizard,
            widget,
        }
    }

    fn harness() -> Harness {
        harness_with(100)
    }

    #[test]
    fn test_wait_queue_order() {
        let mut h = harness();
        for (delay, cmd) in [(5, "five"), (1, "one"), (3, "three")] {
            h.sched
                .queue_delayed(delay, QueueRequest::new(h.alice, h.alice, cmd))
                .unwrap();
        }
        assert_eq!(h.sched.pids_in(QueueKind::Wait).len(), 3);

        h.sched.run_second(1002);
        assert_eq!(h.sched.pids_in(QueueKind::Wait).len(), 2);

        h.sched.run_second(1010);
        let mut runner = Recorder::new();
        assert_eq!(h.sched.run_top(10, &mut runner), 3);
        assert_eq!(runner.ran, vec!["one", "three", "five"]);
        assert!(h.sched.is_empty());
    }

    #[test]
    fn test_equal_wake_times_keep_insertion_order() {
        let mut h = harness();
        for cmd in ["a", "b", "c"] {
            h.sched
                .queue_delayed(2, QueueRequest::new(h.alice, h.alice, cmd))
                .unwrap();
        }
        h.sched.run_second(1005);
        let mut runner = Recorder::new();
        h.sched.run_top(10, &mut runner);
        assert_eq!(runner.ran, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_object_queue_runs_after_a_second() {
        let mut h = harness();
        h.sched
            .queue_immediate(QueueRequest::new(h.widget, h.widget, "from object"))
            .unwrap();
        h.sched
            .queue_immediate(QueueRequest::new(h.alice, h.alice, "from player"))
            .unwrap();
        assert_eq!(h.sched.pids_in(QueueKind::Object).len(), 1);
        assert_eq!(h.sched.next_wake(1000), 0);

        let mut runner = Recorder::new();
        h.sched.run_top(10, &mut runner);
        assert_eq!(runner.ran, vec!["from player"]);
        assert_eq!(h.sched.next_wake(1000), 1);

        h.sched.run_second(1001);
        h.sched.run_top(10, &mut runner);
        assert_eq!(runner.ran, vec!["from player", "from object"]);
    }

    #[test]
    fn test_run_top_carries_registers_and_refunds() {
        let mut h = harness();
        let mut regs = RegisterData::new();
        regs.set(0, "saved", 36);
        h.sched
            .queue_immediate(QueueRequest::new(h.alice, h.alice, "think %q0").with_registers(&regs))
            .unwrap();
        assert_eq!(h.world.money(h.alice), START_MONEY - 10);
        assert_eq!(h.sched.queued(h.alice), 1);

        let mut runner = Recorder::new();
        h.sched.run_top(1, &mut runner);
        assert_eq!(runner.registers, vec![Some("saved".to_string())]);
        assert_eq!(h.world.money(h.alice), START_MONEY);
        assert_eq!(h.sched.queued(h.alice), 0);
    }

    #[test]
    fn test_setup_refusals() {
        let mut h = harness();
        h.world.set_money(h.bob, 5);
        let err = h
            .sched
            .queue_immediate(QueueRequest::new(h.bob, h.bob, "x"))
            .unwrap_err();
        assert_eq!(err, QueueError::NotEnoughMoney);
        assert_eq!(
            h.world.take_messages(h.bob),
            vec!["Not enough money to queue command."]
        );

        h.world.set_halted(h.alice, true);
        let err = h
            .sched
            .queue_immediate(QueueRequest::new(h.alice, h.alice, "x"))
            .unwrap_err();
        assert_eq!(err, QueueError::ExecutorHalted);
        assert_eq!(h.world.money(h.alice), START_MONEY);
    }

    #[test]
    fn test_pid_exhaustion_charges_nothing() {
        let world = Arc::new(MemoryWorld::new());
        let alice = world.create_player("Alice", false);
        let config = EngineConfig {
            machinecost: 0,
            max_qpid: 2,
            ..EngineConfig::default()
        };
        let mut sched = Scheduler::new(world.clone(), Arc::new(config));
        sched.queue_delayed(5, QueueRequest::new(alice, alice, "a")).unwrap();
        sched.queue_delayed(5, QueueRequest::new(alice, alice, "b")).unwrap();
        let before = world.money(alice);

        let err = sched
            .queue_delayed(5, QueueRequest::new(alice, alice, "c"))
            .unwrap_err();
        assert_eq!(err, QueueError::QueueFull);
        assert_eq!(world.money(alice), before);
        assert_eq!(sched.queued(alice), 2);
    }

    #[test]
    fn test_runaway_quota_halts_owner() {
        let mut h = harness_with(2);
        let req = QueueRequest::new(h.widget, h.widget, "loop");
        h.sched.queue_delayed(10, req).unwrap();
        h.sched.queue_immediate(req).unwrap();

        let err = h.sched.queue_delayed(10, req).unwrap_err();
        assert_eq!(err, QueueError::RunAway);
        assert_eq!(h.sched.queued(h.alice), 0);
        assert!(h.world.is_halted(h.alice));
        assert!(h.world.is_halted(h.widget));
        assert!(h.sched.pids_in(QueueKind::Wait).is_empty());

        let flagged = h.sched.pids_in(QueueKind::Object);
        assert_eq!(flagged.len(), 1);
        assert!(h.sched.entry(flagged[0]).unwrap().is_halted());
        assert!(h
            .world
            .take_messages(h.alice)
            .contains(&"Run away objects: too many commands queued.  Halted.".to_string()));
    }

    #[test]
    fn test_wizards_have_no_quota() {
        let mut h = harness_with(1);
        for _ in 0..5 {
            h.sched
                .queue_delayed(5, QueueRequest::new(h.wizard, h.wizard, "x"))
                .unwrap();
        }
        assert_eq!(h.sched.queued(h.wizard), 5);
    }

    #[test]
    fn test_halt_pid() {
        let mut h = harness();
        let req = QueueRequest::new(h.alice, h.alice, "wait");
        let first = h.sched.queue_delayed(5, req).unwrap();
        let middle = h.sched.queue_delayed(6, req).unwrap();
        let last = h.sched.queue_delayed(7, req).unwrap();
        let money = h.world.money(h.alice);

        h.sched.halt_pid(h.alice, &middle.to_string()).unwrap();
        assert_eq!(h.sched.pids_in(QueueKind::Wait), vec![first, last]);
        assert_eq!(h.world.money(h.alice), money + 10);
        assert_eq!(h.sched.queued(h.alice), 2);
        assert_eq!(
            h.world.take_messages(h.alice),
            vec![format!("Halted queue entry PID {}.", middle)]
        );

        assert_eq!(
            h.sched.halt_pid(h.alice, &middle.to_string()),
            Err(QueueError::NoSuchPid)
        );
        assert_eq!(h.sched.halt_pid(h.alice, "abc"), Err(QueueError::InvalidPid));
        assert_eq!(h.sched.halt_pid(h.alice, "0"), Err(QueueError::InvalidPid));
        assert_eq!(
            h.world.take_messages(h.alice),
            vec![
                "That PID is not associated with an active queue entry.",
                "That is not a valid PID.",
                "That is not a valid PID.",
            ]
        );
    }

    #[test]
    fn test_halt_pid_permissions_and_flagging() {
        let mut h = harness();
        let pid = h
            .sched
            .queue_immediate(QueueRequest::new(h.alice, h.alice, "now"))
            .unwrap();

        assert_eq!(
            h.sched.halt_pid(h.bob, &pid.to_string()),
            Err(QueueError::PermissionDenied)
        );
        h.sched.halt_pid(h.wizard, &pid.to_string()).unwrap();
        assert!(h.sched.entry(pid).unwrap().is_halted());
        assert_eq!(
            h.sched.halt_pid(h.wizard, &pid.to_string()),
            Err(QueueError::AlreadyHalted)
        );

        let mut runner = Recorder::new();
        assert_eq!(h.sched.run_top(5, &mut runner), 1);
        assert!(runner.ran.is_empty());
        assert_eq!(h.world.money(h.alice), START_MONEY);
    }

    #[test]
    fn test_halt_pid_releases_semaphore_count() {
        let mut h = harness();
        let pid = h
            .sched
            .do_wait(QueueRequest::new(h.alice, h.alice, "blocked"), "Widget", false)
            .unwrap();
        assert_eq!(h.world.get_attribute(h.widget, A_SEMAPHORE).unwrap().value, "1");

        h.sched.halt_pid(h.alice, &pid.to_string()).unwrap();
        assert!(h.world.get_attribute(h.widget, A_SEMAPHORE).is_none());
        assert!(h.sched.pids_in(QueueKind::Semaphore).is_empty());
    }

    #[test]
    fn test_halt_all_refunds_each_owner() {
        let mut h = harness();
        h.sched
            .queue_delayed(5, QueueRequest::new(h.alice, h.alice, "a1"))
            .unwrap();
        h.sched
            .queue_immediate(QueueRequest::new(h.widget, h.widget, "a2"))
            .unwrap();
        h.sched
            .queue_delayed(5, QueueRequest::new(h.bob, h.bob, "b1"))
            .unwrap();
        assert_eq!(h.world.money(h.alice), START_MONEY - 20);

        let halted = h.sched.do_halt(h.wizard, None, true).unwrap();
        assert_eq!(halted, 3);
        assert_eq!(h.world.money(h.alice), START_MONEY);
        assert_eq!(h.world.money(h.bob), START_MONEY);
        assert_eq!(h.sched.queued(h.alice), 0);
        assert_eq!(h.sched.queued(h.bob), 0);
        assert_eq!(h.world.take_messages(h.wizard), vec!["3 queue entries removed."]);

        assert_eq!(
            h.sched.do_halt(h.alice, None, true),
            Err(QueueError::PermissionDenied)
        );
    }

    #[test]
    fn test_halt_one_object_leaves_others() {
        let mut h = harness();
        h.sched
            .queue_delayed(5, QueueRequest::new(h.widget, h.widget, "thing"))
            .unwrap();
        let keep = h
            .sched
            .queue_delayed(5, QueueRequest::new(h.alice, h.alice, "player"))
            .unwrap();

        assert_eq!(h.sched.do_halt(h.alice, Some("Widget"), false), Ok(1));
        assert_eq!(h.sched.pids_in(QueueKind::Wait), vec![keep]);
        assert_eq!(h.sched.queued(h.alice), 1);
        assert_eq!(
            h.sched.do_halt(h.bob, Some("Widget"), false),
            Err(QueueError::PermissionDenied)
        );
    }

    #[test]
    fn test_notify_releases_in_order() {
        let mut h = harness();
        for cmd in ["first", "second", "third"] {
            h.sched
                .do_wait(QueueRequest::new(h.alice, h.alice, cmd), "Widget", false)
                .unwrap();
        }
        assert_eq!(h.world.get_attribute(h.widget, A_SEMAPHORE).unwrap().value, "3");

        assert_eq!(h.sched.do_notify(h.alice, "Widget", None, NotifySwitch::Notify), Ok(1));
        assert_eq!(h.world.get_attribute(h.widget, A_SEMAPHORE).unwrap().value, "2");
        assert_eq!(h.world.take_messages(h.alice), vec!["Notified."]);

        assert_eq!(h.sched.do_notify(h.alice, "Widget", None, NotifySwitch::All), Ok(2));
        assert!(h.world.get_attribute(h.widget, A_SEMAPHORE).is_none());

        let mut runner = Recorder::new();
        h.sched.run_top(10, &mut runner);
        assert_eq!(runner.ran, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_notify_ahead_of_wait_runs_immediately() {
        let mut h = harness();
        assert_eq!(h.sched.do_notify(h.alice, "Widget", None, NotifySwitch::Notify), Ok(0));
        assert_eq!(h.world.get_attribute(h.widget, A_SEMAPHORE).unwrap().value, "-1");

        h.sched
            .do_wait(QueueRequest::new(h.alice, h.alice, "go"), "Widget", false)
            .unwrap();
        assert!(h.sched.pids_in(QueueKind::Semaphore).is_empty());
        assert_eq!(h.sched.pids_in(QueueKind::Player).len(), 1);
        assert!(h.world.get_attribute(h.widget, A_SEMAPHORE).is_none());
    }

    #[test]
    fn test_drain_refunds_waiters() {
        let mut h = harness();
        for _ in 0..2 {
            h.sched
                .do_wait(QueueRequest::new(h.alice, h.alice, "never"), "Widget/LOCK", false)
                .unwrap();
        }
        assert_eq!(h.world.money(h.alice), START_MONEY - 20);

        assert_eq!(
            h.sched.do_notify(h.alice, "Widget/LOCK", None, NotifySwitch::Drain),
            Ok(2)
        );
        assert_eq!(h.world.money(h.alice), START_MONEY);
        assert_eq!(h.sched.queued(h.alice), 0);
        assert!(h.sched.is_empty());
        assert!(h.world.get_attribute(h.widget, "LOCK").is_none());
        assert_eq!(h.world.take_messages(h.alice), vec!["Drained."]);
    }

    #[test]
    fn test_timed_semaphore_expires() {
        let mut h = harness();
        h.sched
            .do_wait(QueueRequest::new(h.alice, h.alice, "late"), "Widget/10", false)
            .unwrap();
        assert_eq!(h.sched.next_wake(1000), 9);

        h.sched.run_second(1005);
        assert_eq!(h.sched.pids_in(QueueKind::Semaphore).len(), 1);

        h.sched.run_second(1010);
        assert!(h.sched.pids_in(QueueKind::Semaphore).is_empty());
        assert!(h.world.get_attribute(h.widget, A_SEMAPHORE).is_none());

        let mut runner = Recorder::new();
        h.sched.run_top(1, &mut runner);
        assert_eq!(runner.ran, vec!["late"]);
    }

    #[test]
    fn test_wait_errors() {
        let mut h = harness();
        let req = QueueRequest::new(h.bob, h.bob, "x");
        assert_eq!(h.sched.do_wait(req, "Nowhere", false), Err(QueueError::NoMatch));
        assert_eq!(
            h.sched.do_wait(req, "Widget", false),
            Err(QueueError::PermissionDenied)
        );
        assert_eq!(
            h.world.take_messages(h.bob),
            vec!["No match.", "Permission denied."]
        );

        h.world.set_link_ok(h.widget, true);
        assert!(h.sched.do_wait(req, "Widget", false).is_ok());
    }

    #[test]
    fn test_wait_until_absolute_time() {
        let mut h = harness();
        let pid = h
            .sched
            .do_wait(QueueRequest::new(h.alice, h.alice, "x"), "1030", true)
            .unwrap();
        assert_eq!(h.sched.entry(pid).unwrap().wait_until, 1030);
    }

    #[test]
    fn test_adjust_wait() {
        let mut h = harness();
        let req = QueueRequest::new(h.alice, h.alice, "x");
        let a = h.sched.queue_delayed(10, req).unwrap();
        let b = h.sched.queue_delayed(20, req).unwrap();

        h.sched.adjust_wait(h.alice, &b.to_string(), "-15", false).unwrap();
        assert_eq!(h.sched.entry(b).unwrap().wait_until, 1005);
        assert_eq!(h.sched.pids_in(QueueKind::Wait), vec![b, a]);

        h.sched.adjust_wait(h.alice, &b.to_string(), "2000", true).unwrap();
        assert_eq!(h.sched.pids_in(QueueKind::Wait), vec![a, b]);

        h.sched.adjust_wait(h.alice, &a.to_string(), "3", false).unwrap();
        assert_eq!(h.sched.entry(a).unwrap().wait_until, 1003);

        assert_eq!(
            h.sched.adjust_wait(h.alice, &a.to_string(), "soon", false),
            Err(QueueError::InvalidWaitTime)
        );
        assert_eq!(
            h.sched.adjust_wait(h.bob, &a.to_string(), "5", false),
            Err(QueueError::PermissionDenied)
        );

        let sem = h.sched.do_wait(req, "Widget", false).unwrap();
        assert_eq!(
            h.sched.adjust_wait(h.alice, &sem.to_string(), "5", false),
            Err(QueueError::NoWaitTime)
        );
    }

    #[test]
    fn test_next_wake() {
        let mut h = harness();
        assert_eq!(h.sched.next_wake(1000), 999);
        h.sched
            .queue_delayed(30, QueueRequest::new(h.alice, h.alice, "x"))
            .unwrap();
        assert_eq!(h.sched.next_wake(1000), 29);
        assert_eq!(h.sched.next_wake(1028), 1);
    }

    #[test]
    fn test_warp_and_kick() {
        let mut h = harness();
        h.sched
            .queue_delayed(30, QueueRequest::new(h.alice, h.alice, "later"))
            .unwrap();
        h.sched.warp(h.wizard, 30);
        assert_eq!(h.sched.pids_in(QueueKind::Player).len(), 1);

        let mut runner = Recorder::new();
        assert_eq!(h.sched.kick(h.wizard, 5, &mut runner), 1);
        assert_eq!(
            h.world.take_messages(h.wizard),
            vec!["WaitQ timer advanced 30 seconds.", "1 commands processed."]
        );
    }

    #[test]
    fn test_ps_listing() {
        let mut h = harness();
        let args = vec!["arg".to_string()];
        let timed = h
            .sched
            .queue_delayed(5, QueueRequest::new(h.alice, h.alice, "say later").with_args(&args))
            .unwrap();
        let blocked = h
            .sched
            .do_wait(QueueRequest::new(h.alice, h.alice, "say blocked"), "Widget", false)
            .unwrap();

        h.sched.list(h.alice, None, PsMode::Long, false).unwrap();
        let lines = h.world.take_messages(h.alice);
        assert_eq!(
            lines,
            vec![
                "----- Wait Queue -----".to_string(),
                format!("[5] {}:Alice({}):say later", timed, h.alice),
                format!("   Enactor: Alice({}); Arg0='arg'", h.alice),
                "----- Semaphore Queue -----".to_string(),
                format!("[{}] {}:Alice({}):say blocked", h.widget, blocked, h.alice),
                format!("   Enactor: Alice({})", h.alice),
                "Totals: Player...0/0  Object...0/0  Wait...1/1  Semaphore...1/1".to_string(),
            ]
        );

        h.sched.list(h.wizard, None, PsMode::Summary, true).unwrap();
        assert_eq!(
            h.world.take_messages(h.wizard),
            vec!["Totals: Player...0/0[0del]  Object...0/0[0del]  Wait...1/1  Semaphore...1/1"]
        );

        assert_eq!(
            h.sched.list(h.alice, None, PsMode::Brief, true),
            Err(QueueError::PermissionDenied)
        );
    }

    #[test]
    fn test_target_resolution() {
        let h = harness();
        assert_eq!(h.sched.resolve_target(h.wizard, None, true, true), Ok((None, None)));
        assert_eq!(
            h.sched.resolve_target(h.alice, None, false, false),
            Ok((Some(h.alice), None))
        );
        assert_eq!(
            h.sched.resolve_target(h.widget, None, false, false),
            Ok((Some(h.alice), Some(h.widget)))
        );
        assert_eq!(
            h.sched.resolve_target(h.alice, Some(" Widget "), false, false),
            Ok((None, Some(h.widget)))
        );
        assert_eq!(
            h.sched.resolve_target(h.wizard, Some("Bob"), false, true),
            Ok((Some(h.bob), None))
        );
        assert_eq!(
            h.sched.resolve_target(h.bob, Some("Widget"), false, false),
            Err(QueueError::PermissionDenied)
        );
        assert_eq!(
            h.sched.resolve_target(h.wizard, Some("Widget"), true, true),
            Err(QueueError::TargetWithAll)
        );
        assert_eq!(
            h.sched.resolve_target(h.alice, Some("Nobody"), false, false),
            Err(QueueError::NoMatch)
        );
    }

    #[test]
    fn test_number_helpers() {
        assert!(is_integer("-12") && is_integer("+3") && !is_integer("1.5"));
        assert!(is_number("1.5") && is_number("7") && !is_number("abc") && !is_number("."));
        assert_eq!(leading_int("12abc"), 12);
        assert_eq!(leading_int("-4"), -4);
        assert_eq!(leading_int("x"), 0);
    }
}
