//! Heap-lifecycle checking
//!
//! A per-symbol finite-state machine over heap allocations, driven by the
//! host engine's callbacks. Symbols enter the region-state table at
//! allocation calls, move through `Allocated` → `Released` /
//! `Relinquished` / `Escaped`, and must not die while still allocated;
//! that is the leak condition.
//!
//! ## Diagnosed defects
//!
//! Double free, double delete, use-after-free, free of non-heap memory,
//! mismatched allocator/deallocator pairing, offset free, use of
//! zero-sized allocations, and leaks.
//!
//! ## Layers
//!
//! - [`domain`]: families, lifecycle records, realloc bookkeeping, the
//!   bug taxonomy and front-end routing
//! - [`infrastructure`]: classifier, modelers, escape policy, reports,
//!   path visitor
//! - [`application`]: [`HeapLifecycleChecker`], the callback wiring
//!
//! ## Usage
//!
//! ```rust,ignore
//! use heaplens_checker::config::CheckerConfig;
//! use heaplens_checker::features::heap_lifecycle::HeapLifecycleChecker;
//!
//! let checker = HeapLifecycleChecker::new(CheckerConfig::default());
//! // The engine dispatches CheckerCallbacks hooks against it.
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::HeapLifecycleChecker;
pub use domain::{
    check_if_tracked, AllocationFamily, BugKind, CheckKind, LifecycleKind, OwnershipAfterRealloc,
    ReallocPair, RefState, Report,
};
pub use infrastructure::{
    run_visitor, AllocClassifier, LifecycleBugVisitor, MemOperation, PathDiagnostic,
};
