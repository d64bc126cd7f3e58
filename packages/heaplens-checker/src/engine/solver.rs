//! Constraint queries
//!
//! The checker only ever asks one question of the constraint manager:
//! "is this symbol known to be null on this path?". Tri-valued, because
//! an under-constrained symbol is neither.

use super::state::ProgramState;
use super::sval::SymbolId;

/// Tri-valued truth of a constraint query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Underconstrained,
}

impl Truth {
    pub fn is_constrained_true(self) -> bool {
        self == Truth::True
    }

    pub fn is_constrained_false(self) -> bool {
        self == Truth::False
    }
}

/// Constraint-manager façade over the state's fact store.
pub struct ConstraintSolver;

impl ConstraintSolver {
    /// Whether `sym` is null under `state`'s constraints.
    pub fn is_null(state: &ProgramState, sym: SymbolId) -> Truth {
        match state.null_fact(sym) {
            Some(true) => Truth::True,
            Some(false) => Truth::False,
            None => Truth::Underconstrained,
        }
    }
}
