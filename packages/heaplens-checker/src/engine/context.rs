//! Checker context
//!
//! The per-callback façade the engine hands to a checker: the current
//! state, the predecessor node, symbol conjuring, and the two output
//! channels: state transitions and bug reports.

use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use crate::features::heap_lifecycle::domain::Report;

use super::node::{ExplodedNode, LocationContext};
use super::state::ProgramState;
use super::stmt::StmtId;
use super::sval::{SVal, SymbolId};
use super::symbols::SymbolManager;

/// Context for one checker callback invocation.
pub struct CheckerContext {
    pred: ExplodedNode,
    symbols: Rc<RefCell<SymbolManager>>,
    block_count: u64,
    current_stmt: Option<crate::engine::Stmt>,
    transition: Option<ProgramState>,
    transition_pred: Option<ExplodedNode>,
    reports: Vec<Report>,
    error_nodes: Vec<ExplodedNode>,
    sink: bool,
}

impl CheckerContext {
    pub fn new(pred: ExplodedNode, symbols: Rc<RefCell<SymbolManager>>, block_count: u64) -> Self {
        Self {
            pred,
            symbols,
            block_count,
            current_stmt: None,
            transition: None,
            transition_pred: None,
            reports: Vec::new(),
            error_nodes: Vec::new(),
            sink: false,
        }
    }

    /// Attach the statement this callback is about; error nodes carry it.
    pub fn with_stmt(mut self, stmt: Option<crate::engine::Stmt>) -> Self {
        self.current_stmt = stmt;
        self
    }

    /// The state at callback entry.
    pub fn state(&self) -> ProgramState {
        self.pred.state().clone()
    }

    pub fn predecessor(&self) -> &ExplodedNode {
        &self.pred
    }

    pub fn location_context(&self) -> &LocationContext {
        self.pred.location_context()
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn symbol_manager(&self) -> RefMut<'_, SymbolManager> {
        self.symbols.borrow_mut()
    }

    /// Conjure the heap symbol for a call expression at this point.
    pub fn conjure_heap_symbol(&self, stmt: StmtId) -> (SymbolId, SVal) {
        self.symbols
            .borrow_mut()
            .conjure_heap_symbol(stmt, self.block_count)
    }

    /// Queue the state the path continues with.
    pub fn add_transition(&mut self, state: ProgramState) {
        self.transition = Some(state);
    }

    /// Queue a transition hanging off an explicit predecessor node
    /// (cleanup transitions continue from the non-fatal error node).
    pub fn add_transition_from(&mut self, state: ProgramState, pred: ExplodedNode) {
        self.transition = Some(state);
        self.transition_pred = Some(pred);
    }

    /// Generate an error sink node carrying the current state.
    pub fn generate_error_node(&mut self) -> Option<ExplodedNode> {
        self.sink = true;
        let stmt = self
            .current_stmt
            .clone()
            .or_else(|| self.pred.stmt_for_diagnostics().cloned());
        let node = self
            .pred
            .successor(self.state(), stmt, self.location_context().clone());
        self.error_nodes.push(node.clone());
        Some(node)
    }

    /// Generate a non-fatal error node over an explicit state; the path
    /// continues through it.
    pub fn generate_non_fatal_error_node(&mut self, state: ProgramState) -> Option<ExplodedNode> {
        let stmt = self
            .current_stmt
            .clone()
            .or_else(|| self.pred.stmt_for_diagnostics().cloned());
        let node = self
            .pred
            .successor(state, stmt, self.location_context().clone());
        self.error_nodes.push(node.clone());
        Some(node)
    }

    pub fn emit_report(&mut self, report: Report) {
        tracing::debug!(kind = %report.kind, message = %report.message, "emitting report");
        self.reports.push(report);
    }

    // ── Engine-side accessors (the dispatching engine drains these) ────

    pub fn take_transition(&mut self) -> Option<(ProgramState, Option<ExplodedNode>)> {
        let state = self.transition.take()?;
        Some((state, self.transition_pred.take()))
    }

    pub fn take_reports(&mut self) -> Vec<Report> {
        std::mem::take(&mut self.reports)
    }

    pub fn error_nodes(&self) -> &[ExplodedNode] {
        &self.error_nodes
    }

    pub fn generated_sink(&self) -> bool {
        self.sink
    }
}
