//! # In-Memory World
//!
//! A complete [`World`] backed by concurrent maps. It is used by the
//! console binary and as the collaborator in evaluator and scheduler tests.
//!
//! Notifications are not delivered anywhere; they are buffered per target
//! and drained with [`MemoryWorld::take_messages`] or
//! [`MemoryWorld::take_all_messages`].

use crate::object::*;
use dashmap::DashMap;
use mush_core::{Attribute, Dbref, ObjectType, World, AF_MDARK, AF_PRIVATE};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Deepest parent chain followed for attribute inheritance
const MAX_PARENT_DEPTH: usize = 10;

/// Dbref of the starting room every player is placed in
pub const LIMBO: Dbref = Dbref(0);

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Object database held entirely in memory
pub struct MemoryWorld {
    /// Key: dbref, Value: object record
    objects: DashMap<Dbref, Object>,
    next_id: AtomicI32,
    /// Global `%_` variables
    variables: DashMap<String, String>,
    /// Pending notifications in send order
    messages: Mutex<Vec<(Dbref, String)>>,
}

impl MemoryWorld {
    /// Create a world holding only the starting room
    pub fn new() -> Self {
        let world = Self {
            objects: DashMap::new(),
            next_id: AtomicI32::new(0),
            variables: DashMap::new(),
            messages: Mutex::new(Vec::new()),
        };
        let limbo = world.create_room("Limbo");
        tracing::debug!("Created starting room {}", limbo);
        world
    }

    fn insert(&self, make: impl FnOnce(Dbref) -> Object) -> Dbref {
        let id = Dbref(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.objects.insert(id, make(id));
        id
    }

    /// Create a room that owns itself
    pub fn create_room(&self, name: &str) -> Dbref {
        self.insert(|id| Object::new(name, ObjectType::Room, id, Dbref::NOTHING, now_secs()))
    }

    /// Create a player standing in [`LIMBO`]
    pub fn create_player(&self, name: &str, wizard: bool) -> Dbref {
        let id = self.insert(|id| {
            let mut obj = Object::new(name, ObjectType::Player, id, LIMBO, now_secs());
            obj.money = START_MONEY;
            obj.set_flag(OF_WIZARD, wizard);
            obj
        });
        tracing::debug!("Created player {} ({})", name, id);
        id
    }

    /// Create a thing carried by `owner`
    pub fn create_thing(&self, name: &str, owner: Dbref) -> Dbref {
        self.insert(|_| Object::new(name, ObjectType::Thing, owner, owner, now_secs()))
    }

    fn read<R>(&self, thing: Dbref, f: impl FnOnce(&Object) -> R) -> Option<R> {
        self.objects.get(&thing).map(|obj| f(&obj))
    }

    fn update(&self, thing: Dbref, f: impl FnOnce(&mut Object)) -> bool {
        match self.objects.get_mut(&thing) {
            Some(mut obj) => {
                f(&mut obj);
                true
            }
            None => {
                tracing::warn!("Update of missing object {}", thing);
                false
            }
        }
    }

    fn has_flag(&self, thing: Dbref, flag: ObjectFlags) -> bool {
        self.read(thing, |obj| obj.has_flag(flag)).unwrap_or(false)
    }

    fn set_flag(&self, thing: Dbref, flag: ObjectFlags, on: bool) {
        self.update(thing, |obj| obj.set_flag(flag, on));
    }

    // ========== Test and console helpers ==========

    /// Store an attribute owned by the object's owner
    pub fn set_attr(&self, thing: Dbref, name: &str, value: &str) {
        let owner = World::owner(self, thing);
        World::set_attribute(self, thing, name, value, owner);
    }

    /// Store an attribute with explicit flags
    pub fn set_attr_flags(&self, thing: Dbref, name: &str, value: &str, flags: u32) {
        let owner = World::owner(self, thing);
        let mut attr = Attribute::new(value, owner);
        attr.flags = flags;
        self.update(thing, |obj| {
            obj.attrs.insert(name.to_ascii_uppercase(), attr);
        });
    }

    pub fn set_variable(&self, key: &str, value: &str) {
        if value.is_empty() {
            self.variables.remove(key);
        } else {
            self.variables.insert(key.to_string(), value.to_string());
        }
    }

    pub fn set_tracing(&self, thing: Dbref, on: bool) {
        self.set_flag(thing, OF_TRACE, on);
    }

    pub fn set_going(&self, thing: Dbref, on: bool) {
        self.set_flag(thing, OF_GOING, on);
    }

    pub fn set_wizard(&self, thing: Dbref, on: bool) {
        self.set_flag(thing, OF_WIZARD, on);
    }

    pub fn set_link_ok(&self, thing: Dbref, on: bool) {
        self.set_flag(thing, OF_LINK_OK, on);
    }

    pub fn set_parent(&self, thing: Dbref, parent: Option<Dbref>) {
        self.update(thing, |obj| obj.parent = parent);
    }

    pub fn set_location(&self, thing: Dbref, location: Dbref) {
        self.update(thing, |obj| obj.location = location);
    }

    /// Send `thing`'s trace output to `target` instead of its owner
    pub fn set_redirect(&self, thing: Dbref, target: Option<Dbref>) {
        self.update(thing, |obj| obj.redirect = target);
    }

    pub fn set_money(&self, thing: Dbref, amount: i32) {
        self.update(thing, |obj| obj.money = amount);
    }

    pub fn money(&self, thing: Dbref) -> i32 {
        self.read(thing, |obj| obj.money).unwrap_or(0)
    }

    /// Drain the messages sent to `target`, oldest first
    pub fn take_messages(&self, target: Dbref) -> Vec<String> {
        let mut messages = self.messages.lock();
        let mut taken = Vec::new();
        messages.retain(|(to, text)| {
            if *to == target {
                taken.push(text.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    /// Drain every pending message
    pub fn take_all_messages(&self) -> Vec<(Dbref, String)> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl World for MemoryWorld {
    fn is_valid(&self, thing: Dbref) -> bool {
        self.objects.contains_key(&thing)
    }

    fn object_type(&self, thing: Dbref) -> Option<ObjectType> {
        self.read(thing, |obj| obj.kind)
    }

    fn owner(&self, thing: Dbref) -> Dbref {
        self.read(thing, |obj| obj.owner).unwrap_or(Dbref::NOTHING)
    }

    fn name(&self, thing: Dbref) -> String {
        self.read(thing, |obj| obj.name.clone()).unwrap_or_default()
    }

    fn location(&self, thing: Dbref) -> Dbref {
        self.read(thing, |obj| obj.location).unwrap_or(Dbref::NOTHING)
    }

    fn creation_time(&self, thing: Dbref) -> i64 {
        self.read(thing, |obj| obj.created).unwrap_or(0)
    }

    fn is_going(&self, thing: Dbref) -> bool {
        self.has_flag(thing, OF_GOING)
    }

    fn is_halted(&self, thing: Dbref) -> bool {
        self.has_flag(thing, OF_HALTED)
    }

    fn set_halted(&self, thing: Dbref, halted: bool) {
        self.set_flag(thing, OF_HALTED, halted);
    }

    fn is_tracing(&self, thing: Dbref) -> bool {
        self.has_flag(thing, OF_TRACE)
    }

    fn redirect_target(&self, thing: Dbref) -> Option<Dbref> {
        self.read(thing, |obj| obj.redirect).flatten()
    }

    fn is_wizard(&self, thing: Dbref) -> bool {
        let owner = self.owner(thing);
        self.has_flag(thing, OF_WIZARD) || self.has_flag(owner, OF_WIZARD)
    }

    fn get_attribute(&self, thing: Dbref, name: &str) -> Option<Attribute> {
        let key = name.to_ascii_uppercase();
        self.read(thing, |obj| obj.attrs.get(&key).cloned()).flatten()
    }

    fn get_attribute_inherited(&self, thing: Dbref, name: &str) -> Option<Attribute> {
        let key = name.to_ascii_uppercase();
        let mut current = thing;
        for depth in 0..MAX_PARENT_DEPTH {
            let (attr, parent) = self.read(current, |obj| (obj.attrs.get(&key).cloned(), obj.parent))?;
            match attr {
                Some(attr) if depth == 0 || attr.flags & AF_PRIVATE == 0 => return Some(attr),
                _ => {}
            }
            current = parent?;
        }
        None
    }

    fn set_attribute(&self, thing: Dbref, name: &str, value: &str, owner: Dbref) {
        let key = name.to_ascii_uppercase();
        self.update(thing, |obj| {
            if value.is_empty() {
                obj.attrs.remove(&key);
            } else {
                let flags = obj.attrs.get(&key).map_or(0, |a| a.flags);
                let mut attr = Attribute::new(value, owner);
                attr.flags = flags;
                obj.attrs.insert(key, attr);
            }
        });
    }

    fn can_read_attribute(&self, player: Dbref, _thing: Dbref, attr: &Attribute) -> bool {
        attr.flags & AF_MDARK == 0 || self.is_wizard(player)
    }

    fn can_set_attribute(&self, player: Dbref, thing: Dbref, _name: &str) -> bool {
        self.controls(player, thing)
    }

    fn get_variable(&self, key: &str) -> Option<String> {
        self.variables.get(key).map(|v| v.clone())
    }

    fn may_use(&self, player: Dbref, perms: u32) -> bool {
        perms == 0 || self.is_wizard(player)
    }

    fn controls(&self, player: Dbref, thing: Dbref) -> bool {
        if !self.is_valid(thing) {
            return false;
        }
        self.is_wizard(player) || self.owner(player) == self.owner(thing)
    }

    fn can_halt(&self, player: Dbref) -> bool {
        self.is_wizard(player)
    }

    fn can_see_queue(&self, player: Dbref) -> bool {
        self.is_wizard(player)
    }

    fn is_link_ok(&self, thing: Dbref) -> bool {
        self.has_flag(thing, OF_LINK_OK)
    }

    fn match_thing(&self, player: Dbref, name: &str) -> Option<Dbref> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("me") {
            return Some(player);
        }
        if name.eq_ignore_ascii_case("here") {
            let here = self.location(player);
            return self.is_valid(here).then_some(here);
        }
        if name.starts_with('#') {
            return Dbref::parse(name).filter(|&d| self.is_valid(d));
        }
        self.objects
            .iter()
            .filter(|entry| entry.name.eq_ignore_ascii_case(name) && !entry.has_flag(OF_GOING))
            .map(|entry| *entry.key())
            .min()
    }

    fn charge(&self, thing: Dbref, amount: i32) -> bool {
        let owner = self.owner(thing);
        if self.has_flag(owner, OF_WIZARD) {
            return true;
        }
        let mut paid = false;
        self.update(owner, |obj| {
            if obj.money >= amount {
                obj.money -= amount;
                paid = true;
            }
        });
        paid
    }

    fn refund(&self, thing: Dbref, amount: i32) {
        let owner = self.owner(thing);
        self.update(owner, |obj| obj.money = obj.money.saturating_add(amount));
    }

    fn notify(&self, target: Dbref, message: &str) {
        tracing::trace!("notify {}: {}", target, message);
        self.messages.lock().push((target, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_creation() {
        let world = MemoryWorld::new();
        assert_eq!(world.object_count(), 1);
        assert_eq!(world.object_type(LIMBO), Some(ObjectType::Room));

        let alice = world.create_player("Alice", false);
        assert_eq!(world.owner(alice), alice);
        assert_eq!(world.location(alice), LIMBO);
        assert_eq!(world.money(alice), START_MONEY);
        assert!(world.is_player(alice));

        let widget = world.create_thing("Widget", alice);
        assert_eq!(world.owner(widget), alice);
        assert_eq!(world.location(widget), alice);
    }

    #[test]
    fn test_match_thing() {
        let world = MemoryWorld::new();
        let alice = world.create_player("Alice", false);
        let widget = world.create_thing("Widget", alice);

        assert_eq!(world.match_thing(alice, "me"), Some(alice));
        assert_eq!(world.match_thing(alice, "here"), Some(LIMBO));
        assert_eq!(world.match_thing(alice, "widget"), Some(widget));
        assert_eq!(world.match_thing(alice, &widget.to_string()), Some(widget));
        assert_eq!(world.match_thing(alice, "#999"), None);
        assert_eq!(world.match_thing(alice, "nothing"), None);
    }

    #[test]
    fn test_attributes_and_inheritance() {
        let world = MemoryWorld::new();
        let alice = world.create_player("Alice", false);
        let parent = world.create_thing("Parent", alice);
        let child = world.create_thing("Child", alice);
        world.set_parent(child, Some(parent));

        world.set_attr(parent, "greet", "hello");
        world.set_attr_flags(parent, "SECRET", "hidden", AF_PRIVATE);

        assert!(world.get_attribute(child, "GREET").is_none());
        assert_eq!(world.get_attribute_inherited(child, "GREET").unwrap().value, "hello");
        assert!(world.get_attribute_inherited(child, "SECRET").is_none());
        assert!(world.get_attribute_inherited(parent, "SECRET").is_some());

        world.set_attr(parent, "GREET", "");
        assert!(world.get_attribute(parent, "GREET").is_none());
    }

    #[test]
    fn test_permissions() {
        let world = MemoryWorld::new();
        let wiz = world.create_player("Wizard", true);
        let alice = world.create_player("Alice", false);
        let bob = world.create_player("Bob", false);
        let widget = world.create_thing("Widget", alice);

        assert!(world.controls(alice, widget));
        assert!(!world.controls(bob, widget));
        assert!(world.controls(wiz, widget));
        assert!(world.is_wizard(wiz));
        assert!(world.can_halt(wiz) && !world.can_halt(alice));
        assert!(world.may_use(alice, 0));
        assert!(!world.may_use(alice, 1));

        let mut dark = Attribute::new("x", alice);
        dark.flags = AF_MDARK;
        assert!(!world.can_read_attribute(alice, widget, &dark));
        assert!(world.can_read_attribute(wiz, widget, &dark));
    }

    #[test]
    fn test_economy() {
        let world = MemoryWorld::new();
        let alice = world.create_player("Alice", false);
        let widget = world.create_thing("Widget", alice);
        world.set_money(alice, 15);

        assert!(world.charge(widget, 10));
        assert_eq!(world.money(alice), 5);
        assert!(!world.charge(widget, 10));
        world.refund(widget, 10);
        assert_eq!(world.money(alice), 15);

        let wiz = world.create_player("Wizard", true);
        world.set_money(wiz, 0);
        assert!(world.charge(wiz, 100));
    }

    #[test]
    fn test_messages() {
        let world = MemoryWorld::new();
        let alice = world.create_player("Alice", false);
        let bob = world.create_player("Bob", false);

        world.notify(alice, "one");
        world.notify(bob, "two");
        world.notify(alice, "three");

        assert_eq!(world.take_messages(alice), vec!["one", "three"]);
        assert!(world.take_messages(alice).is_empty());
        assert_eq!(world.take_all_messages(), vec![(bob, "two".to_string())]);
    }
}
