//! Allocation families
//!
//! A family is the allocator lineage of a symbol. Pairing is enforced per
//! family: `free()` releases malloc-family memory, `delete` releases
//! new-family memory, and mixing the two is a diagnosable defect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Allocator lineage of a tracked symbol.
///
/// A `None`-like sentinel is deliberately absent: classification returns
/// `Option<AllocationFamily>` and stored records always carry a real family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationFamily {
    /// `malloc`/`free` and relatives (glib, kernel allocators, dup-ers).
    Malloc,
    /// Scalar `operator new` / `delete`.
    CxxNew,
    /// Array `operator new[]` / `delete[]`.
    CxxNewArray,
    /// POSIX `if_nameindex` / `if_freenameindex`.
    IfNameIndex,
    /// Stack allocation via `alloca`; must never be deallocated.
    Alloca,
    /// Buffer owned by a container object, invalidated by its methods.
    InnerBuffer,
}

impl AllocationFamily {
    /// Expected allocator name for diagnostics.
    pub fn expected_alloc_name(self) -> &'static str {
        match self {
            AllocationFamily::Malloc => "malloc()",
            AllocationFamily::CxxNew => "'new'",
            AllocationFamily::CxxNewArray => "'new[]'",
            AllocationFamily::IfNameIndex => "'if_nameindex()'",
            AllocationFamily::InnerBuffer => "container-specific allocator",
            // Not a deallocation pairing; the caller filters alloca earlier.
            AllocationFamily::Alloca => "alloca()",
        }
    }

    /// Expected deallocator name for diagnostics.
    pub fn expected_dealloc_name(self) -> &'static str {
        match self {
            AllocationFamily::Malloc => "free()",
            AllocationFamily::CxxNew => "'delete'",
            AllocationFamily::CxxNewArray => "'delete[]'",
            AllocationFamily::IfNameIndex => "'if_freenameindex()'",
            AllocationFamily::InnerBuffer => "container-specific deallocator",
            AllocationFamily::Alloca => "alloca()",
        }
    }

    pub fn is_cxx_new(self) -> bool {
        matches!(
            self,
            AllocationFamily::CxxNew | AllocationFamily::CxxNewArray
        )
    }
}

impl fmt::Display for AllocationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationFamily::Malloc => "Malloc",
            AllocationFamily::CxxNew => "CxxNew",
            AllocationFamily::CxxNewArray => "CxxNewArray",
            AllocationFamily::IfNameIndex => "IfNameIndex",
            AllocationFamily::Alloca => "Alloca",
            AllocationFamily::InnerBuffer => "InnerBuffer",
        };
        write!(f, "{}", s)
    }
}
