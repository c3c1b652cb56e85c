//! # Stored Objects
//!
//! The record kept for every room, thing and player in a [`MemoryWorld`](crate::MemoryWorld).

use mush_core::{Attribute, Dbref, ObjectType};
use std::collections::HashMap;

/// Object flag bits
pub type ObjectFlags = u32;

/// Object is being destroyed
pub const OF_GOING: ObjectFlags = 0x0001;

/// Object may not run queued commands
pub const OF_HALTED: ObjectFlags = 0x0002;

/// Evaluations are traced
pub const OF_TRACE: ObjectFlags = 0x0004;

/// Wizard privileges
pub const OF_WIZARD: ObjectFlags = 0x0008;

/// Others may link to or notify it
pub const OF_LINK_OK: ObjectFlags = 0x0010;

/// Starting balance for new players
pub const START_MONEY: i32 = 1000;

/// One database object
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub kind: ObjectType,
    pub owner: Dbref,
    pub location: Dbref,
    pub parent: Option<Dbref>,
    pub redirect: Option<Dbref>,
    pub flags: ObjectFlags,
    pub money: i32,
    /// Creation time, seconds since the epoch
    pub created: i64,
    /// Attributes keyed by uppercased name
    pub attrs: HashMap<String, Attribute>,
}

impl Object {
    pub fn new(name: &str, kind: ObjectType, owner: Dbref, location: Dbref, created: i64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            owner,
            location,
            parent: None,
            redirect: None,
            flags: 0,
            money: 0,
            created,
            attrs: HashMap::new(),
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: ObjectFlags) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: ObjectFlags, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_toggle() {
        let mut obj = Object::new("Widget", ObjectType::Thing, Dbref(1), Dbref(0), 0);
        assert!(!obj.has_flag(OF_HALTED));
        obj.set_flag(OF_HALTED, true);
        obj.set_flag(OF_TRACE, true);
        assert!(obj.has_flag(OF_HALTED));
        obj.set_flag(OF_HALTED, false);
        assert!(!obj.has_flag(OF_HALTED));
        assert!(obj.has_flag(OF_TRACE));
    }
}
