//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Database reference (signed 32-bit object number)
///
/// Negative values are sentinels; [`Dbref::NOTHING`] marks "no object",
/// and is also what a halted queue entry's executor is cleared to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dbref(pub i32);

impl Dbref {
    /// No object
    pub const NOTHING: Dbref = Dbref(-1);
    /// Ambiguous match
    pub const AMBIGUOUS: Dbref = Dbref(-2);
    /// Player's home
    pub const HOME: Dbref = Dbref(-3);

    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i32 {
        self.0
    }

    /// True for the `NOTHING` sentinel
    pub fn is_nothing(&self) -> bool {
        *self == Self::NOTHING
    }

    /// Parse `#123` or `123` into a dbref.
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.trim().strip_prefix('#').unwrap_or(text.trim());
        digits.parse::<i32>().ok().map(Self)
    }
}

impl From<i32> for Dbref {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for Dbref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    Room = 0,
    Thing = 1,
    Exit = 2,
    Player = 3,
}

impl ObjectType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Room),
            1 => Some(Self::Thing),
            2 => Some(Self::Exit),
            3 => Some(Self::Player),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Room => "ROOM",
            Self::Thing => "THING",
            Self::Exit => "EXIT",
            Self::Player => "PLAYER",
        }
    }
}

/// Attribute flags as stored alongside the value
pub type AttrFlags = u32;

/// Attribute is hidden from non-wizards
pub const AF_MDARK: AttrFlags = 0x0001;

/// Only wizards may change it
pub const AF_WIZARD: AttrFlags = 0x0002;

/// Not inherited by children
pub const AF_PRIVATE: AttrFlags = 0x0004;

/// Trace evaluations of this attribute
pub const AF_TRACE: AttrFlags = 0x0008;

/// A stored attribute value with its owner and flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Raw text
    pub value: String,
    /// Owner of the attribute (may differ from the object owner)
    pub owner: Dbref,
    /// Attribute flags
    pub flags: AttrFlags,
}

impl Attribute {
    pub fn new(value: impl Into<String>, owner: Dbref) -> Self {
        Self {
            value: value.into(),
            owner,
            flags: 0,
        }
    }
}

/// Name of the default semaphore attribute
pub const A_SEMAPHORE: &str = "SEMAPHORE";

/// Name of the gender attribute used by pronoun substitution
pub const A_SEX: &str = "SEX";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbref_display() {
        assert_eq!(Dbref::new(42).to_string(), "#42");
        assert_eq!(Dbref::NOTHING.to_string(), "#-1");
    }

    #[test]
    fn test_dbref_parse() {
        assert_eq!(Dbref::parse("#7"), Some(Dbref(7)));
        assert_eq!(Dbref::parse(" 12 "), Some(Dbref(12)));
        assert_eq!(Dbref::parse("me"), None);
    }

    #[test]
    fn test_object_type_roundtrip() {
        assert_eq!(ObjectType::from_u8(3), Some(ObjectType::Player));
        assert_eq!(ObjectType::Thing.as_str(), "THING");
        assert_eq!(ObjectType::from_u8(9), None);
    }
}
