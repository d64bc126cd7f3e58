//! Lifecycle records
//!
//! One [`RefState`] per tracked symbol, stored in the per-path region-state
//! table. The state machine:
//!
//! ```text
//!      (none) ──allocate──▶ Allocated ──size==0 assumed──▶ AllocatedOfSizeZero
//!                               │              │
//!                               │              └──free──▶ Released
//!                               ├── free (matching) ──▶ Released
//!                               ├── ownership transfer ──▶ Relinquished
//!                               ├── escape (opaque call) ──▶ Escaped
//!                               └── assumed NULL ──▶ (untracked)
//! ```
//!
//! `Released`, `Relinquished` and `Escaped` are fine at symbol death;
//! `Allocated` / `AllocatedOfSizeZero` at death is a leak.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::Stmt;

use super::family::AllocationFamily;

/// Lifecycle state of a tracked symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleKind {
    /// Live, size believed non-zero.
    Allocated,
    /// Live, size was assumed equal to zero on this path.
    AllocatedOfSizeZero,
    /// Freed by a matching deallocator.
    Released,
    /// Responsibility handed off to code the checker does not model.
    Relinquished,
    /// Reachable through an opaque path; no further strong claims.
    Escaped,
}

/// Per-symbol lifecycle record: state, allocator family, and the statement
/// that caused the most recent state entry (used by diagnostics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefState {
    kind: LifecycleKind,
    family: AllocationFamily,
    stmt: Stmt,
}

impl RefState {
    pub fn allocated(family: AllocationFamily, stmt: Stmt) -> Self {
        Self {
            kind: LifecycleKind::Allocated,
            family,
            stmt,
        }
    }

    /// Retag an allocated record as zero-sized, keeping family and origin.
    pub fn allocated_of_size_zero(prev: &RefState) -> Self {
        Self {
            kind: LifecycleKind::AllocatedOfSizeZero,
            family: prev.family,
            stmt: prev.stmt.clone(),
        }
    }

    pub fn released(family: AllocationFamily, stmt: Stmt) -> Self {
        Self {
            kind: LifecycleKind::Released,
            family,
            stmt,
        }
    }

    pub fn relinquished(family: AllocationFamily, stmt: Stmt) -> Self {
        Self {
            kind: LifecycleKind::Relinquished,
            family,
            stmt,
        }
    }

    /// Move to `Escaped`, keeping family and origin.
    pub fn escaped(prev: &RefState) -> Self {
        Self {
            kind: LifecycleKind::Escaped,
            family: prev.family,
            stmt: prev.stmt.clone(),
        }
    }

    pub fn kind(&self) -> LifecycleKind {
        self.kind
    }

    pub fn family(&self) -> AllocationFamily {
        self.family
    }

    pub fn stmt(&self) -> &Stmt {
        &self.stmt
    }

    pub fn is_allocated(&self) -> bool {
        self.kind == LifecycleKind::Allocated
    }

    pub fn is_allocated_of_size_zero(&self) -> bool {
        self.kind == LifecycleKind::AllocatedOfSizeZero
    }

    /// Live in either allocated flavor.
    pub fn is_live(&self) -> bool {
        self.is_allocated() || self.is_allocated_of_size_zero()
    }

    pub fn is_released(&self) -> bool {
        self.kind == LifecycleKind::Released
    }

    pub fn is_relinquished(&self) -> bool {
        self.kind == LifecycleKind::Relinquished
    }

    pub fn is_escaped(&self) -> bool {
        self.kind == LifecycleKind::Escaped
    }
}

impl fmt::Display for RefState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LifecycleKind::Allocated => "Allocated",
            LifecycleKind::AllocatedOfSizeZero => "AllocatedOfSizeZero",
            LifecycleKind::Released => "Released",
            LifecycleKind::Relinquished => "Relinquished",
            LifecycleKind::Escaped => "Escaped",
        };
        write!(f, "{} ({})", kind, self.family)
    }
}
