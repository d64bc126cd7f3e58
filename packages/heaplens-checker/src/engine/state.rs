//! Per-path program state
//!
//! The state is immutable: every update clones into a new `ProgramState`.
//! All tables are persistent tries, so forking a path is O(1) and sibling
//! paths share structure. The checker must never observe or cause in-place
//! mutation: updates are pure, per the host engine's copy-on-write model.
//!
//! Besides the engine's own stores (expression bindings, region extents,
//! default-initialization records, the constraint facts), the state carries
//! the checker-registered lifecycle tables. A host engine registers such
//! trait maps dynamically; this rendering registers them statically.

use rpds::{HashTrieMap, HashTrieSet};

use crate::features::heap_lifecycle::domain::{RefState, ReallocPair};

use super::region::Region;
use super::stmt::StmtId;
use super::sval::{SVal, SymbolId};

/// A path condition the checker asks the engine to split on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `value == NULL`
    IsNull(SVal),
    /// `value == 0` over an integer
    IsZero(SVal),
    /// `(value & mask) != 0`
    MaskedNonZero(SVal, u64),
    /// `lhs == rhs`, resolved only for the concrete/symbol-vs-constant
    /// shapes the checker needs; otherwise under-constrained.
    Eq(SVal, SVal),
}

/// A recorded fact about one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Fact {
    Null,
    Zero,
    MaskNonZero(u64),
}

/// Immutable per-path state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramState {
    // Checker-registered tables.
    region_state: HashTrieMap<SymbolId, RefState>,
    realloc_pairs: HashTrieMap<SymbolId, ReallocPair>,
    free_return_value: HashTrieMap<SymbolId, SymbolId>,
    zero_realloc_syms: HashTrieSet<SymbolId>,
    // Engine stores.
    facts: HashTrieMap<(SymbolId, Fact), bool>,
    expr_bindings: HashTrieMap<StmtId, SVal>,
    extents: HashTrieMap<SymbolId, SVal>,
    default_init: HashTrieMap<SymbolId, SVal>,
    var_bindings: HashTrieMap<String, SVal>,
}

impl ProgramState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Region-state table ────────────────────────────────────────────

    pub fn region_state(&self, sym: SymbolId) -> Option<&RefState> {
        self.region_state.get(&sym)
    }

    #[must_use]
    pub fn set_region_state(&self, sym: SymbolId, rs: RefState) -> Self {
        let mut next = self.clone();
        next.region_state = self.region_state.insert(sym, rs);
        next
    }

    #[must_use]
    pub fn remove_region_state(&self, sym: SymbolId) -> Self {
        let mut next = self.clone();
        next.region_state = self.region_state.remove(&sym);
        next
    }

    pub fn region_state_iter(&self) -> impl Iterator<Item = (SymbolId, &RefState)> {
        self.region_state.iter().map(|(k, v)| (*k, v))
    }

    pub fn region_state_is_empty(&self) -> bool {
        self.region_state.is_empty()
    }

    pub fn region_state_eq(&self, other: &ProgramState) -> bool {
        self.region_state == other.region_state
    }

    // ── Realloc-pair table ────────────────────────────────────────────

    pub fn realloc_pair(&self, to_sym: SymbolId) -> Option<&ReallocPair> {
        self.realloc_pairs.get(&to_sym)
    }

    #[must_use]
    pub fn set_realloc_pair(&self, to_sym: SymbolId, pair: ReallocPair) -> Self {
        let mut next = self.clone();
        next.realloc_pairs = self.realloc_pairs.insert(to_sym, pair);
        next
    }

    #[must_use]
    pub fn remove_realloc_pair(&self, to_sym: SymbolId) -> Self {
        let mut next = self.clone();
        next.realloc_pairs = self.realloc_pairs.remove(&to_sym);
        next
    }

    pub fn realloc_pairs_iter(&self) -> impl Iterator<Item = (SymbolId, &ReallocPair)> {
        self.realloc_pairs.iter().map(|(k, v)| (*k, v))
    }

    // ── Free-return-value table ───────────────────────────────────────

    pub fn free_return_value(&self, sym: SymbolId) -> Option<SymbolId> {
        self.free_return_value.get(&sym).copied()
    }

    #[must_use]
    pub fn set_free_return_value(&self, sym: SymbolId, ret: SymbolId) -> Self {
        let mut next = self.clone();
        next.free_return_value = self.free_return_value.insert(sym, ret);
        next
    }

    #[must_use]
    pub fn remove_free_return_value(&self, sym: SymbolId) -> Self {
        let mut next = self.clone();
        next.free_return_value = self.free_return_value.remove(&sym);
        next
    }

    pub fn free_return_values_iter(&self) -> impl Iterator<Item = (SymbolId, SymbolId)> + '_ {
        self.free_return_value.iter().map(|(k, v)| (*k, *v))
    }

    // ── Zero-size reallocation symbols ────────────────────────────────

    #[must_use]
    pub fn add_zero_realloc_sym(&self, sym: SymbolId) -> Self {
        let mut next = self.clone();
        next.zero_realloc_syms = self.zero_realloc_syms.insert(sym);
        next
    }

    pub fn contains_zero_realloc_sym(&self, sym: SymbolId) -> bool {
        self.zero_realloc_syms.contains(&sym)
    }

    #[must_use]
    pub fn remove_zero_realloc_sym(&self, sym: SymbolId) -> Self {
        let mut next = self.clone();
        next.zero_realloc_syms = self.zero_realloc_syms.remove(&sym);
        next
    }

    // ── Expression/variable bindings ──────────────────────────────────

    #[must_use]
    pub fn bind_expr(&self, stmt: StmtId, value: SVal) -> Self {
        let mut next = self.clone();
        next.expr_bindings = self.expr_bindings.insert(stmt, value);
        next
    }

    pub fn expr_value(&self, stmt: StmtId) -> Option<&SVal> {
        self.expr_bindings.get(&stmt)
    }

    #[must_use]
    pub fn bind_var(&self, name: impl Into<String>, value: SVal) -> Self {
        let mut next = self.clone();
        next.var_bindings = self.var_bindings.insert(name.into(), value);
        next
    }

    pub fn var_value(&self, name: &str) -> Option<&SVal> {
        self.var_bindings.get(name)
    }

    /// Value stored in a region, as far as the engine tracks it.
    pub fn region_value(&self, region: &Region) -> Option<&SVal> {
        region.var_name().and_then(|n| self.var_value(n))
    }

    // ── Extents and default initialization ────────────────────────────

    #[must_use]
    pub fn set_extent(&self, sym: SymbolId, size: SVal) -> Self {
        let mut next = self.clone();
        next.extents = self.extents.insert(sym, size);
        next
    }

    pub fn extent(&self, sym: SymbolId) -> Option<&SVal> {
        self.extents.get(&sym)
    }

    #[must_use]
    pub fn set_default_init(&self, sym: SymbolId, init: SVal) -> Self {
        let mut next = self.clone();
        next.default_init = self.default_init.insert(sym, init);
        next
    }

    pub fn default_init(&self, sym: SymbolId) -> Option<&SVal> {
        self.default_init.get(&sym)
    }

    // ── Constraints ───────────────────────────────────────────────────

    fn fact(&self, sym: SymbolId, fact: Fact) -> Option<bool> {
        self.facts.get(&(sym, fact)).copied()
    }

    #[must_use]
    fn with_fact(&self, sym: SymbolId, fact: Fact, value: bool) -> Self {
        let mut next = self.clone();
        next.facts = self.facts.insert((sym, fact), value);
        next
    }

    /// Tri-valued nullness of a symbol under the current constraints.
    pub(crate) fn null_fact(&self, sym: SymbolId) -> Option<bool> {
        self.fact(sym, Fact::Null)
    }

    /// Split the path on `cond`.
    ///
    /// Returns `(state_if_true, state_if_false)`; a side the constraints
    /// refute comes back `None`. Values the engine cannot reason about
    /// return both sides unchanged (under-constrained).
    pub fn assume(&self, cond: &Condition) -> (Option<ProgramState>, Option<ProgramState>) {
        match cond {
            Condition::IsNull(v) => self.assume_sym_fact(v, Fact::Null, Self::eval_null),
            Condition::IsZero(v) => self.assume_sym_fact(v, Fact::Zero, Self::eval_zero),
            Condition::MaskedNonZero(v, mask) => {
                let mask = *mask;
                self.assume_sym_fact(v, Fact::MaskNonZero(mask), move |val| {
                    val.as_concrete_int().map(|c| (c as u64) & mask != 0)
                })
            }
            Condition::Eq(lhs, rhs) => self.assume_eq(lhs, rhs),
        }
    }

    fn eval_null(value: &SVal) -> Option<bool> {
        match value {
            SVal::ConcreteInt(v) => Some(*v == 0),
            // The address of a variable, a block, or code is never null;
            // a symbolic location may be (failed allocations return null).
            SVal::Loc(region) => {
                if region.base_symbol().is_some() {
                    None
                } else {
                    Some(false)
                }
            }
            _ => None,
        }
    }

    fn eval_zero(value: &SVal) -> Option<bool> {
        value.as_concrete_int().map(|c| c == 0)
    }

    fn assume_sym_fact(
        &self,
        value: &SVal,
        fact: Fact,
        eval: impl Fn(&SVal) -> Option<bool>,
    ) -> (Option<ProgramState>, Option<ProgramState>) {
        if let Some(truth) = eval(value) {
            return if truth {
                (Some(self.clone()), None)
            } else {
                (None, Some(self.clone()))
            };
        }
        match value.as_symbol() {
            Some(sym) => match self.fact(sym, fact) {
                Some(true) => (Some(self.clone()), None),
                Some(false) => (None, Some(self.clone())),
                None => (
                    Some(self.with_fact(sym, fact, true)),
                    Some(self.with_fact(sym, fact, false)),
                ),
            },
            // Unknown / undefined: both sides stay feasible.
            None => (Some(self.clone()), Some(self.clone())),
        }
    }

    fn assume_eq(
        &self,
        lhs: &SVal,
        rhs: &SVal,
    ) -> (Option<ProgramState>, Option<ProgramState>) {
        match (lhs.as_concrete_int(), rhs.as_concrete_int()) {
            (Some(a), Some(b)) => {
                if a == b {
                    (Some(self.clone()), None)
                } else {
                    (None, Some(self.clone()))
                }
            }
            (_, Some(0)) => self.assume(&Condition::IsZero(lhs.clone())),
            (Some(0), _) => self.assume(&Condition::IsZero(rhs.clone())),
            // Anything else is beyond this engine's constraint language.
            _ => (Some(self.clone()), Some(self.clone())),
        }
    }
}
