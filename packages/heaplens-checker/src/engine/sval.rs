//! Symbolic values
//!
//! An [`SVal`] is the engine's opaque handle for "the value of an expression
//! along this path": a concrete integer, an unknown, an undefined (garbage)
//! value, a non-location symbol (sizes, flags, status codes), or a memory
//! location described by a [`Region`](super::Region).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::region::Region;

/// Identity of a path symbol.
///
/// Symbols are conjured by the [`SymbolManager`](super::SymbolManager);
/// identity is the only property the checker relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SymbolId(pub u64);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

/// Symbolic value of an expression on the current path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SVal {
    /// The engine cannot say anything about this value.
    Unknown,
    /// Read of uninitialized storage.
    Undefined,
    /// A concrete integer (also covers the null pointer constant 0).
    ConcreteInt(i64),
    /// A non-location symbol: size argument, flags word, return status.
    Sym(SymbolId),
    /// A location value.
    Loc(Region),
}

impl SVal {
    /// Null pointer constant.
    pub fn null() -> Self {
        SVal::ConcreteInt(0)
    }

    pub fn is_unknown_or_undef(&self) -> bool {
        matches!(self, SVal::Unknown | SVal::Undefined)
    }

    /// True for the concrete constant `0`.
    pub fn is_zero_constant(&self) -> bool {
        matches!(self, SVal::ConcreteInt(0))
    }

    pub fn as_concrete_int(&self) -> Option<i64> {
        match self {
            SVal::ConcreteInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The region, if this is a location value.
    pub fn as_region(&self) -> Option<&Region> {
        match self {
            SVal::Loc(r) => Some(r),
            _ => None,
        }
    }

    /// True if the value is a location (a pointer the program can follow).
    pub fn is_loc(&self) -> bool {
        matches!(self, SVal::Loc(_) | SVal::ConcreteInt(_))
    }

    /// Symbol of the base region for location values.
    pub fn as_loc_symbol(&self) -> Option<SymbolId> {
        match self {
            SVal::Loc(r) => r.base_region().base_symbol(),
            _ => None,
        }
    }

    /// Any underlying symbol: a non-location symbol directly, or the base
    /// symbol of a location.
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            SVal::Sym(s) => Some(*s),
            SVal::Loc(r) => r.base_region().base_symbol(),
            _ => None,
        }
    }

    /// Symbol of the *innermost* symbolic base, for use-site checks on
    /// loads/stores through derived regions (fields, elements).
    pub fn loc_symbol_in_base(&self) -> Option<SymbolId> {
        self.as_loc_symbol()
    }
}

impl fmt::Display for SVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SVal::Unknown => write!(f, "Unknown"),
            SVal::Undefined => write!(f, "Undefined"),
            SVal::ConcreteInt(v) => write!(f, "{}", v),
            SVal::Sym(s) => write!(f, "{}", s),
            SVal::Loc(r) => write!(f, "&{}", r),
        }
    }
}
