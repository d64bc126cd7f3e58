//! Checker callback surface
//!
//! One trait method per engine hook, dispatched in program order for each
//! path: `pre_call` → call modeling (`post_call` / `post_message` /
//! `post_new` / `new_allocator`) → `location` → `dead_symbols` →
//! `pre_return` → `end_function`, with `eval_assume` interleaved whenever
//! the engine adds a constraint. All methods default to no-ops so checkers
//! override only what they model.

use rustc_hash::FxHashSet;

use super::call::CallEvent;
use super::context::CheckerContext;
use super::state::{Condition, ProgramState};
use super::stmt::Stmt;
use super::sval::{SVal, SymbolId};
use super::symbols::SymbolReaper;

/// How a set of symbols escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKind {
    /// Passed directly to an opaque call.
    DirectEscapeOnCall,
    /// Reachable from a region an opaque call may invalidate.
    IndirectEscapeOnCall,
    /// Stored somewhere the engine no longer tracks.
    EscapeOnBind,
    Other,
}

/// Callbacks a state-extension checker can register.
#[allow(unused_variables)]
pub trait CheckerCallbacks {
    fn check_pre_call(&self, call: &CallEvent, ctx: &mut CheckerContext) {}

    /// Post-visit of a plain call expression.
    fn check_post_call(&self, call: &CallEvent, ctx: &mut CheckerContext) {}

    /// Post-visit of a new-expression when allocator inlining is off.
    fn check_post_new(&self, call: &CallEvent, ctx: &mut CheckerContext) {}

    /// Between `operator new` and the constructor, when the engine models
    /// the allocator call.
    fn check_new_allocator(&self, call: &CallEvent, ctx: &mut CheckerContext) {}

    /// Pre-visit of a delete-expression.
    fn check_pre_delete(&self, call: &CallEvent, ctx: &mut CheckerContext) {}

    fn check_post_message(&self, call: &CallEvent, ctx: &mut CheckerContext) {}

    /// Post-visit of a block literal.
    fn check_post_block(&self, call: &CallEvent, ctx: &mut CheckerContext) {}

    /// Batch of symbols died at a scope exit.
    fn check_dead_symbols(&self, reaper: &SymbolReaper, ctx: &mut CheckerContext) {}

    fn check_pre_return(&self, ret_value: Option<&SVal>, stmt: &Stmt, ctx: &mut CheckerContext) {}

    /// Fires after automatic destructors at function exit.
    fn check_end_function(&self, ret_value: Option<&SVal>, stmt: &Stmt, ctx: &mut CheckerContext) {
    }

    /// A load or store through `loc`.
    fn check_location(&self, loc: &SVal, is_load: bool, stmt: &Stmt, ctx: &mut CheckerContext) {}

    /// The engine narrowed the path by `cond` being `assumption`; the
    /// checker may rewrite its own tables in response.
    fn eval_assume(
        &self,
        state: ProgramState,
        cond: &Condition,
        assumption: bool,
    ) -> ProgramState {
        state
    }

    fn check_pointer_escape(
        &self,
        state: ProgramState,
        escaped: &FxHashSet<SymbolId>,
        call: Option<&CallEvent>,
        kind: EscapeKind,
    ) -> ProgramState {
        state
    }

    /// Escape of a const-qualified pointer: `free` cannot take const
    /// pointers but `delete` can, so this is weaker than a full escape.
    fn check_const_pointer_escape(
        &self,
        state: ProgramState,
        escaped: &FxHashSet<SymbolId>,
        call: Option<&CallEvent>,
        kind: EscapeKind,
    ) -> ProgramState {
        state
    }

    /// Debug rendering of the checker's slice of the state.
    fn print_state(&self, out: &mut String, state: &ProgramState) {}
}
