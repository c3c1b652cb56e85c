//! External collaborator interface
//!
//! The evaluator and scheduler never touch object storage directly. Every
//! lookup, permission check, payment and notification goes through this
//! trait, so storage engines and test doubles can be swapped freely.
//!
//! All methods take `&self`; implementations are expected to use interior
//! mutability for the few mutating calls (attributes, flags, money).

use crate::{Attribute, Dbref, ObjectType};

/// Access to the object database and the surrounding server
pub trait World: Send + Sync {
    // ========== Object identity ==========

    /// Whether `thing` refers to a live object
    fn is_valid(&self, thing: Dbref) -> bool;

    /// Type of the object, `None` when invalid
    fn object_type(&self, thing: Dbref) -> Option<ObjectType>;

    /// Owning player; `NOTHING` when invalid
    fn owner(&self, thing: Dbref) -> Dbref;

    /// Display name
    fn name(&self, thing: Dbref) -> String;

    /// Current location (`where_is` semantics)
    fn location(&self, thing: Dbref) -> Dbref;

    /// Creation timestamp, used by `%:`
    fn creation_time(&self, thing: Dbref) -> i64;

    // ========== Flags ==========

    /// Object is being destroyed
    fn is_going(&self, thing: Dbref) -> bool;

    /// Object may not run queued commands
    fn is_halted(&self, thing: Dbref) -> bool;

    fn set_halted(&self, thing: Dbref, halted: bool);

    /// Object has tracing enabled
    fn is_tracing(&self, thing: Dbref) -> bool;

    /// Where trace output for `thing` should go instead of its owner
    fn redirect_target(&self, thing: Dbref) -> Option<Dbref>;

    /// Wizard-level privileges (unlimited queue quota)
    fn is_wizard(&self, thing: Dbref) -> bool;

    // ========== Attributes ==========

    /// Attribute stored directly on `thing`
    fn get_attribute(&self, thing: Dbref, name: &str) -> Option<Attribute>;

    /// Attribute on `thing` or the first parent that has it
    fn get_attribute_inherited(&self, thing: Dbref, name: &str) -> Option<Attribute>;

    /// Store (or with an empty value, clear) an attribute
    fn set_attribute(&self, thing: Dbref, name: &str, value: &str, owner: Dbref);

    /// Whether `player` may read `attr` on `thing`
    fn can_read_attribute(&self, player: Dbref, thing: Dbref, attr: &Attribute) -> bool;

    /// Whether `player` may write the named attribute on `thing`
    fn can_set_attribute(&self, player: Dbref, thing: Dbref, name: &str) -> bool;

    /// Global variable table used by `%_`
    fn get_variable(&self, key: &str) -> Option<String>;

    // ========== Permissions ==========

    /// Permission oracle for function invocation
    fn may_use(&self, player: Dbref, perms: u32) -> bool;

    /// `player` controls `thing`
    fn controls(&self, player: Dbref, thing: Dbref) -> bool;

    /// `player` may halt anything
    fn can_halt(&self, player: Dbref) -> bool;

    /// `player` may list the whole queue
    fn can_see_queue(&self, player: Dbref) -> bool;

    /// Objects others may link to or notify
    fn is_link_ok(&self, thing: Dbref) -> bool;

    /// Resolve a name (`me`, `here`, `#12`, a name) from `player`'s view
    fn match_thing(&self, player: Dbref, name: &str) -> Option<Dbref>;

    // ========== Economy ==========

    /// Charge `thing`'s owner; false when they cannot afford it
    fn charge(&self, thing: Dbref, amount: i32) -> bool;

    /// Pay `amount` back to `thing`'s owner
    fn refund(&self, thing: Dbref, amount: i32);

    // ========== Output ==========

    /// Send a line of text to `target`
    fn notify(&self, target: Dbref, message: &str);

    // ========== Convenience ==========

    /// Whether `thing` is a player object
    fn is_player(&self, thing: Dbref) -> bool {
        self.object_type(thing) == Some(ObjectType::Player)
    }
}
