//! Symbol management
//!
//! Conjures fresh path symbols and tracks cross-symbol liveness
//! dependencies. `add_symbol_dependency(primary, dependent)` keeps
//! `dependent` alive for as long as `primary` is alive. This is how a
//! reallocated-from symbol outlives its reallocated-to symbol, and a
//! deallocator's status symbol outlives the freed symbol.

use rustc_hash::{FxHashMap, FxHashSet};

use super::region::{MemSpace, Region};
use super::stmt::StmtId;
use super::sval::{SVal, SymbolId};

/// Allocates symbol identities and records liveness dependencies.
#[derive(Debug, Default)]
pub struct SymbolManager {
    next: u64,
    known: FxHashSet<SymbolId>,
    /// primary → dependents kept alive by it.
    dependents: FxHashMap<SymbolId, Vec<SymbolId>>,
    /// Symbols whose declared type is a function pointer.
    fn_pointer_syms: FxHashSet<SymbolId>,
}

impl SymbolManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self) -> SymbolId {
        let sym = SymbolId(self.next);
        self.next += 1;
        self.known.insert(sym);
        sym
    }

    /// A fresh non-location symbol (sizes, flags, status codes).
    pub fn conjure_symbol(&mut self) -> SymbolId {
        self.fresh()
    }

    /// A fresh symbol naming the heap block conjured for a call expression.
    /// `_stmt` and `_block_count` individualize the symbol per program
    /// point and visit; identity is all that matters here.
    pub fn conjure_heap_symbol(&mut self, _stmt: StmtId, _block_count: u64) -> (SymbolId, SVal) {
        let sym = self.fresh();
        // Conjured pointers land in unknown space: the engine cannot prove
        // the memory is heap, and deallocation must stay permitted.
        (sym, SVal::Loc(Region::symbolic(sym, MemSpace::Unknown)))
    }

    /// Register a symbol minted outside this manager (test fixtures).
    pub fn register(&mut self, sym: SymbolId) {
        self.known.insert(sym);
        if sym.0 >= self.next {
            self.next = sym.0 + 1;
        }
    }

    /// Record that `sym`'s declared type is a function pointer.
    pub fn mark_function_pointer(&mut self, sym: SymbolId) {
        self.fn_pointer_syms.insert(sym);
    }

    pub fn is_function_pointer(&self, sym: SymbolId) -> bool {
        self.fn_pointer_syms.contains(&sym)
    }

    /// Keep `dependent` alive while `primary` is alive.
    pub fn add_symbol_dependency(&mut self, primary: SymbolId, dependent: SymbolId) {
        self.dependents.entry(primary).or_default().push(dependent);
    }

    pub fn has_dependency(&self, primary: SymbolId, dependent: SymbolId) -> bool {
        self.dependents
            .get(&primary)
            .is_some_and(|deps| deps.contains(&dependent))
    }

    /// Compute the dead set given the roots the program still references.
    /// Dependencies are transitive: anything reachable from a live root
    /// stays alive.
    pub fn reap(&self, live_roots: &[SymbolId]) -> SymbolReaper {
        let mut live: FxHashSet<SymbolId> = FxHashSet::default();
        let mut work: Vec<SymbolId> = live_roots.to_vec();
        while let Some(sym) = work.pop() {
            if !live.insert(sym) {
                continue;
            }
            if let Some(deps) = self.dependents.get(&sym) {
                work.extend(deps.iter().copied());
            }
        }
        let dead = self
            .known
            .iter()
            .copied()
            .filter(|s| !live.contains(s))
            .collect();
        SymbolReaper { dead }
    }
}

/// The engine's report of which symbols died at a cleanup point.
#[derive(Debug, Clone, Default)]
pub struct SymbolReaper {
    dead: FxHashSet<SymbolId>,
}

impl SymbolReaper {
    pub fn from_dead(dead: impl IntoIterator<Item = SymbolId>) -> Self {
        Self {
            dead: dead.into_iter().collect(),
        }
    }

    pub fn is_dead(&self, sym: SymbolId) -> bool {
        self.dead.contains(&sym)
    }

    pub fn is_live(&self, sym: SymbolId) -> bool {
        !self.is_dead(sym)
    }

    pub fn dead_iter(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.dead.iter().copied()
    }
}
