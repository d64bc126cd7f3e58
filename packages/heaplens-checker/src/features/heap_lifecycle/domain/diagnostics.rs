//! Bug taxonomy and reports
//!
//! Every defect the lifecycle machine can diagnose, each routed to the
//! diagnostic front-end that may emit it. Reports carry the interesting
//! symbol so the path visitor can annotate state changes, and leaks carry a
//! uniqueing statement (the allocation site) so identical leaks reached
//! through different prefixes collapse into one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::CheckerConfig;
use crate::engine::{StmtId, SymbolId};

use super::family::AllocationFamily;

/// The diagnostic front-ends. The modeling core is shared; each front-end
/// only decides which reports are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    Malloc,
    NewDelete,
    NewDeleteLeaks,
    MismatchedDeallocator,
    InnerPointer,
}

impl CheckKind {
    pub fn name(self) -> &'static str {
        match self {
            CheckKind::Malloc => "unix.Malloc",
            CheckKind::NewDelete => "cplusplus.NewDelete",
            CheckKind::NewDeleteLeaks => "cplusplus.NewDeleteLeaks",
            CheckKind::MismatchedDeallocator => "unix.MismatchedDeallocator",
            CheckKind::InnerPointer => "cplusplus.InnerPointer",
        }
    }

    pub fn is_enabled(self, config: &CheckerConfig) -> bool {
        match self {
            CheckKind::Malloc => config.malloc_enabled(),
            CheckKind::NewDelete => config.new_delete_enabled(),
            CheckKind::NewDeleteLeaks => config.new_delete_leaks_enabled(),
            CheckKind::MismatchedDeallocator => config.mismatched_deallocator_enabled(),
            CheckKind::InnerPointer => config.inner_pointer_enabled(),
        }
    }
}

/// Which front-end is responsible for a symbol of the given family.
/// Returns `None` when the responsible front-end is disabled.
pub fn check_if_tracked(
    family: AllocationFamily,
    is_leak_check: bool,
    config: &CheckerConfig,
) -> Option<CheckKind> {
    match family {
        AllocationFamily::Malloc | AllocationFamily::Alloca | AllocationFamily::IfNameIndex => {
            config.malloc_enabled().then_some(CheckKind::Malloc)
        }
        AllocationFamily::CxxNew | AllocationFamily::CxxNewArray => {
            if is_leak_check {
                config
                    .new_delete_leaks_enabled()
                    .then_some(CheckKind::NewDeleteLeaks)
            } else {
                config.new_delete_enabled().then_some(CheckKind::NewDelete)
            }
        }
        AllocationFamily::InnerBuffer => config
            .inner_pointer_enabled()
            .then_some(CheckKind::InnerPointer),
    }
}

/// Kinds of memory-management defects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BugKind {
    DoubleFree,
    DoubleDelete,
    UseAfterFree,
    BadFree,
    FreeAlloca,
    MismatchedDeallocator,
    OffsetFree,
    UseZeroAllocated,
    Leak,
}

impl BugKind {
    /// Short bug-type name.
    pub fn name(self) -> &'static str {
        match self {
            BugKind::DoubleFree => "Double free",
            BugKind::DoubleDelete => "Double delete",
            BugKind::UseAfterFree => "Use-after-free",
            BugKind::BadFree => "Bad free",
            BugKind::FreeAlloca => "Free alloca()",
            BugKind::MismatchedDeallocator => "Bad deallocator",
            BugKind::OffsetFree => "Offset free",
            BugKind::UseZeroAllocated => "Use of zero allocated",
            BugKind::Leak => "Memory leak",
        }
    }

    pub fn category(self) -> &'static str {
        "Memory error"
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A diagnosed defect on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub kind: BugKind,
    pub check: CheckKind,
    pub message: String,
    /// The tracked symbol the report is about, when there is one. The path
    /// visitor follows it through the execution graph.
    pub sym: Option<SymbolId>,
    /// Additional symbols worth following (e.g. a failed free's status).
    pub also_interesting: Vec<SymbolId>,
    /// Leak reports are uniqued at their allocation site, not the cleanup
    /// point.
    pub uniqueing_stmt: Option<StmtId>,
    pub is_leak: bool,
    /// Leaks survive path pruning but not sinks (noreturn paths).
    pub suppress_on_sink: bool,
}

impl Report {
    pub fn new(kind: BugKind, check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            check,
            message: message.into(),
            sym: None,
            also_interesting: Vec::new(),
            uniqueing_stmt: None,
            is_leak: false,
            suppress_on_sink: false,
        }
    }

    pub fn with_symbol(mut self, sym: SymbolId) -> Self {
        self.sym = Some(sym);
        self
    }

    pub fn with_also_interesting(mut self, sym: SymbolId) -> Self {
        self.also_interesting.push(sym);
        self
    }

    pub fn leak(mut self, uniqueing_stmt: Option<StmtId>) -> Self {
        self.is_leak = true;
        self.suppress_on_sink = true;
        self.uniqueing_stmt = uniqueing_stmt;
        self
    }
}
