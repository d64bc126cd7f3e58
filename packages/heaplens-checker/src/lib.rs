/*
 * heaplens-checker - Symbolic Heap-Lifecycle Analysis
 *
 * A path-sensitive checker for memory-management defects: double free,
 * use-after-free, mismatched allocator/deallocator pairing, free of
 * non-heap memory, offset free, use of zero-sized allocations, and leaks.
 *
 * The checker is a state extension riding on a symbolic execution engine:
 * the engine owns path exploration, constraint solving and diagnostics
 * rendering; this crate owns a per-symbol lifecycle machine, the
 * transitions driven by call patterns, and the bug reports with their
 * allocation-site path visitor.
 *
 * Layout:
 * - engine/    : host-engine contracts (state, values, regions, callbacks)
 * - features/  : the heap_lifecycle feature (domain / infrastructure /
 *                application layers)
 * - config/    : diagnostic front-end toggles, optimistic mode, platform
 */

#![allow(dead_code)] // Engine contracts carry API surface a host would use
#![allow(clippy::too_many_arguments)] // Modeling entry points mirror the hook shapes
#![allow(clippy::collapsible_if)] // Rule chains read better uncollapsed

pub mod config;
pub mod engine;
pub mod errors;
pub mod features;

pub use config::{CheckerConfig, Platform};
pub use errors::{CheckerError, Result};
pub use features::heap_lifecycle::{
    AllocationFamily, BugKind, CheckKind, HeapLifecycleChecker, LifecycleKind, RefState, Report,
};
