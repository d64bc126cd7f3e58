//! Bug-report path visitor
//!
//! Replays the reported path backwards, comparing the tracked symbol's
//! lifecycle record between consecutive states, and emits a one-line note
//! at every transition: allocation, release, ownership transfer, failed
//! reallocation.
//!
//! Two false-positive suppressions ride along, both aimed at
//! reference-counting smart pointers the checker cannot model:
//! releases inside destructors whose class name smells like a
//! ref-counting pointer invalidate the report immediately, and a release
//! destructor followed (in program order, earlier in visitation) by an
//! atomic `fetch_add`/`fetch_sub` in the same frame invalidates it softly.
//! The heuristic is name-matching by design and deliberately kept apart
//! from the lifecycle machine so it can be swapped out wholesale.

use crate::engine::{AtomicOp, ExplodedNode, FrameDecl, LocationContext, ProgramState, Stmt,
    StmtKind, SymbolId};

use super::super::domain::{AllocationFamily, RefState, Report};

/// One diagnostic event along the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNote {
    pub message: String,
}

/// Rendered path: the notes in program order, and whether the report
/// survived suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDiagnostic {
    pub notes: Vec<String>,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    ReallocationFailed,
}

/// Does this class name look like a reference-counting pointer wrapper?
fn is_reference_counting_pointer_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    (lower.contains("ptr") || lower.contains("pointer"))
        && (lower.contains("ref")
            || lower.contains("cnt")
            || lower.contains("intrusive")
            || lower.contains("shared"))
}

/// Stateful visitor for one report's interesting symbol.
pub struct LifecycleBugVisitor {
    sym: SymbolId,
    mode: Mode,
    failed_realloc_symbol: Option<SymbolId>,
    release_destructor_frame: Option<LocationContext>,
    is_leak: bool,
    invalid: bool,
    refcount_suppression: bool,
}

impl LifecycleBugVisitor {
    pub fn new(sym: SymbolId, is_leak: bool) -> Self {
        Self {
            sym,
            mode: Mode::Normal,
            failed_realloc_symbol: None,
            release_destructor_frame: None,
            is_leak,
            invalid: false,
            refcount_suppression: true,
        }
    }

    /// Disable the reference-counting suppression heuristic.
    pub fn without_refcount_suppression(mut self) -> Self {
        self.refcount_suppression = false;
        self
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalid
    }

    pub fn is_leak(&self) -> bool {
        self.is_leak
    }

    /// Did-not-track → allocated, or other state → allocated, at a call.
    fn is_allocated(curr: Option<&RefState>, prev: Option<&RefState>, stmt: Option<&Stmt>) -> bool {
        stmt.is_some_and(|s| {
            matches!(s.kind, StmtKind::Call { .. } | StmtKind::New { .. })
        }) && curr.is_some_and(|rs| rs.is_live())
            && !prev.is_some_and(|rs| rs.is_live())
    }

    /// Any state → released. The statement may be missing for container
    /// inner buffers (implicit destructor points).
    fn is_released(curr: Option<&RefState>, prev: Option<&RefState>) -> bool {
        curr.is_some_and(|rs| rs.is_released()) && !prev.is_some_and(|rs| rs.is_released())
    }

    fn is_relinquished(
        curr: Option<&RefState>,
        prev: Option<&RefState>,
        stmt: Option<&Stmt>,
    ) -> bool {
        stmt.is_some_and(|s| s.is_call_expr() || s.is_message())
            && curr.is_some_and(|rs| rs.is_relinquished())
            && !prev.is_some_and(|rs| rs.is_relinquished())
    }

    /// Released → allocated with no call statement: this is the
    /// reallocation-failure restore point, not a real allocation.
    fn has_realloc_failed(
        curr: Option<&RefState>,
        prev: Option<&RefState>,
        stmt: Option<&Stmt>,
    ) -> bool {
        !stmt.is_some_and(|s| s.is_call_expr())
            && curr.is_some_and(|rs| rs.is_live())
            && prev.is_some()
            && !prev.is_some_and(|rs| rs.is_live())
    }

    /// Which reallocated-to symbol's pair entry vanished between the
    /// previous and current state?
    fn find_failed_realloc_symbol(
        curr: &ProgramState,
        prev: &ProgramState,
    ) -> Option<SymbolId> {
        prev.realloc_pairs_iter()
            .find(|(to_sym, _)| curr.realloc_pair(*to_sym).is_none())
            .map(|(to_sym, _)| to_sym)
    }

    fn inner_buffer_note(&self, node: &ExplodedNode, curr: &RefState) -> String {
        if node.is_implicit_call() {
            "Inner buffer deallocated by call to destructor".to_string()
        } else {
            let method = curr
                .stmt()
                .callee_name()
                .unwrap_or("unknown")
                .to_string();
            format!("Inner buffer reallocated by call to '{}'", method)
        }
    }

    /// Scan the frame chain of a release point for destructors; an
    /// obvious ref-counting destructor invalidates immediately, any other
    /// innermost destructor becomes the suspect frame for the atomic
    /// confirmation.
    fn scan_release_destructors(&mut self, lctx: &LocationContext) {
        if !self.refcount_suppression {
            return;
        }
        let mut found_any = false;
        for lc in lctx.ancestors() {
            if let FrameDecl::Destructor { class_name } = lc.decl() {
                if is_reference_counting_pointer_name(class_name) {
                    self.invalid = true;
                } else if !found_any {
                    // Only the innermost destructor is a plausible release
                    // point for a smart pointer.
                    self.release_destructor_frame = Some(lc.clone());
                    found_any = true;
                }
            }
        }
    }

    /// Visit one node (walking the path backwards, error node first).
    pub fn visit_node(&mut self, node: &ExplodedNode) -> Option<PathNote> {
        let pred = node.first_pred()?;
        let state = node.state();
        let prev_state = pred.state();

        let curr = state.region_state(self.sym);
        let prev = prev_state.region_state(self.sym);

        let stmt = node.stmt_for_diagnostics();
        // Containers sometimes deserve a note with no statement at all.
        if stmt.is_none()
            && !curr.is_some_and(|rs| rs.family() == AllocationFamily::InnerBuffer)
        {
            return None;
        }

        let current_lc = node.location_context();

        // An atomic fetch_add/fetch_sub inside the destructor that
        // released the pointer (or one of its ancestors) is the signature
        // of reference counting; the report is unreliable.
        if self.refcount_suppression {
            if let Some(frame) = &self.release_destructor_frame {
                if let Some(s) = stmt {
                    if matches!(
                        s.kind,
                        StmtKind::AtomicRmw {
                            op: AtomicOp::FetchAdd | AtomicOp::FetchSub
                        }
                    ) && (frame.same_frame(current_lc) || frame.is_parent_of(current_lc))
                    {
                        self.invalid = true;
                    }
                }
            }
        }

        let message = match self.mode {
            Mode::Normal => {
                if Self::is_allocated(curr, prev, stmt) {
                    Some("Memory is allocated".to_string())
                } else if Self::is_released(curr, prev) {
                    let note = match curr {
                        Some(rs) if rs.family() == AllocationFamily::InnerBuffer => {
                            self.inner_buffer_note(node, rs)
                        }
                        _ => "Memory is released".to_string(),
                    };
                    self.scan_release_destructors(current_lc);
                    Some(note)
                } else if Self::is_relinquished(curr, prev, stmt) {
                    Some("Memory ownership is transferred".to_string())
                } else if Self::has_realloc_failed(curr, prev, stmt) {
                    self.mode = Mode::ReallocationFailed;
                    self.failed_realloc_symbol =
                        Self::find_failed_realloc_symbol(state, prev_state);
                    Some("Reallocation failed".to_string())
                } else {
                    None
                }
            }
            Mode::ReallocationFailed => {
                // First appearance (walking backwards) of the reallocated
                // symbol is the reallocation point itself.
                match self.failed_realloc_symbol {
                    Some(failed) if prev_state.region_state(failed).is_none() => {
                        self.mode = Mode::Normal;
                        self.failed_realloc_symbol = None;
                        Some("Attempt to reallocate memory".to_string())
                    }
                    _ => None,
                }
            }
        };

        message.map(|message| PathNote { message })
    }
}

/// Walk the reported path and render its notes in program order.
pub fn run_visitor(report: &Report, error_node: &ExplodedNode) -> PathDiagnostic {
    let Some(sym) = report.sym else {
        return PathDiagnostic {
            notes: Vec::new(),
            valid: true,
        };
    };
    let mut visitor = LifecycleBugVisitor::new(sym, report.is_leak);
    let mut notes = Vec::new();
    for node in error_node.path_to_root() {
        if let Some(note) = visitor.visit_node(&node) {
            notes.push(note.message);
        }
    }
    notes.reverse();
    PathDiagnostic {
        notes,
        valid: !visitor.is_invalidated(),
    }
}
