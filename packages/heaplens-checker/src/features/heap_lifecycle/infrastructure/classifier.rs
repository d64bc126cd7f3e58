//! Allocation-family classification
//!
//! Maps callees onto allocation families by identifier, plus the
//! "standard operator new/delete" predicate (an operator counts only when
//! its definition site is in a system header; a user-defined operator is
//! somebody else's semantics). With optimistic mode on, user functions
//! annotated with `ownership_returns` / `ownership_takes` /
//! `ownership_holds` participate as malloc-family members.
//!
//! The identifier tables are interned eagerly into static hash sets; the
//! membership test is a single lookup.

use lazy_static::lazy_static;
use rustc_hash::FxHashSet;

use crate::engine::{CallEvent, CallKind, FnDecl, OpKind, OwnKind};

use super::super::domain::AllocationFamily;

/// Which side of the allocate/free pairing a query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOperation {
    Allocate,
    Free,
    Any,
}

lazy_static! {
    static ref MALLOC_ALLOC_NAMES: FxHashSet<&'static str> = [
        "malloc",
        "realloc",
        "reallocf",
        "calloc",
        "valloc",
        "strdup",
        "_strdup",
        "strndup",
        "wcsdup",
        "_wcsdup",
        "kmalloc",
        "g_malloc",
        "g_malloc0",
        "g_realloc",
        "g_try_malloc",
        "g_try_malloc0",
        "g_try_realloc",
        "g_memdup",
        "g_malloc_n",
        "g_malloc0_n",
        "g_realloc_n",
        "g_try_malloc_n",
        "g_try_malloc0_n",
        "g_try_realloc_n",
    ]
    .into_iter()
    .collect();
    static ref MALLOC_FREE_NAMES: FxHashSet<&'static str> =
        ["free", "realloc", "reallocf", "g_free", "kfree"]
            .into_iter()
            .collect();
    static ref ALLOCA_NAMES: FxHashSet<&'static str> = ["alloca", "_alloca"].into_iter().collect();
}

/// Name/operator/attribute classifier for allocation families.
#[derive(Debug, Clone, Copy)]
pub struct AllocClassifier {
    optimistic: bool,
}

impl AllocClassifier {
    pub fn new(optimistic: bool) -> Self {
        Self { optimistic }
    }

    /// Whether this function allocates or frees memory the checker models.
    pub fn is_mem_function(&self, decl: &FnDecl) -> bool {
        self.is_c_mem_function(decl, AllocationFamily::Malloc, MemOperation::Any)
            || self.is_c_mem_function(decl, AllocationFamily::IfNameIndex, MemOperation::Any)
            || self.is_c_mem_function(decl, AllocationFamily::Alloca, MemOperation::Any)
            || self.is_standard_new_delete(decl)
    }

    /// Membership of `decl` in the C-style tables of `family`, filtered by
    /// operation kind.
    pub fn is_c_mem_function(
        &self,
        decl: &FnDecl,
        family: AllocationFamily,
        op: MemOperation,
    ) -> bool {
        let check_free = matches!(op, MemOperation::Any | MemOperation::Free);
        let check_alloc = matches!(op, MemOperation::Any | MemOperation::Allocate);
        let name = decl.name.as_str();

        match family {
            AllocationFamily::Malloc => {
                if check_free && MALLOC_FREE_NAMES.contains(name) {
                    return true;
                }
                if check_alloc && MALLOC_ALLOC_NAMES.contains(name) {
                    return true;
                }
            }
            AllocationFamily::IfNameIndex => {
                if check_free && name == "if_freenameindex" {
                    return true;
                }
                if check_alloc && name == "if_nameindex" {
                    return true;
                }
            }
            AllocationFamily::Alloca => {
                if check_alloc && ALLOCA_NAMES.contains(name) {
                    return true;
                }
            }
            _ => return false,
        }

        if family != AllocationFamily::Malloc {
            return false;
        }

        // Ownership annotations make user functions part of the malloc
        // family, but only in optimistic mode.
        if self.optimistic {
            for attr in decl.ownership_attrs() {
                match attr.kind {
                    OwnKind::Takes | OwnKind::Holds => {
                        if check_free {
                            return true;
                        }
                    }
                    OwnKind::Returns => {
                        if check_alloc {
                            return true;
                        }
                    }
                }
            }
        }

        false
    }

    /// Whether `decl` is one of the four overloaded allocation operators in
    /// its standard (system-header) form.
    pub fn is_standard_new_delete(&self, decl: &FnDecl) -> bool {
        decl.operator.is_some() && decl.in_system_header
    }

    /// Allocation family of a whole call event, for deallocator pairing.
    pub fn family_of_call(&self, call: &CallEvent) -> Option<AllocationFamily> {
        match &call.kind {
            CallKind::Function(decl) | CallKind::Method { decl, .. } => self.family_of_decl(decl),
            CallKind::New { array, .. } => Some(if *array {
                AllocationFamily::CxxNewArray
            } else {
                AllocationFamily::CxxNew
            }),
            CallKind::Delete { array, .. } => Some(if *array {
                AllocationFamily::CxxNewArray
            } else {
                AllocationFamily::CxxNew
            }),
            // Ownership-transferring message sends promise free() semantics.
            CallKind::Message(_) => Some(AllocationFamily::Malloc),
            CallKind::Block { .. } => None,
        }
    }

    fn family_of_decl(&self, decl: &FnDecl) -> Option<AllocationFamily> {
        if self.is_c_mem_function(decl, AllocationFamily::Malloc, MemOperation::Any) {
            return Some(AllocationFamily::Malloc);
        }
        if self.is_standard_new_delete(decl) {
            return decl.operator.map(|op| match op {
                OpKind::New | OpKind::Delete => AllocationFamily::CxxNew,
                OpKind::ArrayNew | OpKind::ArrayDelete => AllocationFamily::CxxNewArray,
            });
        }
        if self.is_c_mem_function(decl, AllocationFamily::IfNameIndex, MemOperation::Any) {
            return Some(AllocationFamily::IfNameIndex);
        }
        if self.is_c_mem_function(decl, AllocationFamily::Alloca, MemOperation::Any) {
            return Some(AllocationFamily::Alloca);
        }
        None
    }
}
