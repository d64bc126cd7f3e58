//! The heap-lifecycle checker
//!
//! Wires the modelers into the engine's callback surface: call
//! classification and allocation/deallocation/reallocation modeling,
//! use-after-free and zero-size checks on loads and calls, the escape
//! policy, the allocation-failure assumption hook, and leak detection at
//! symbol death. All diagnostics funnel through the report builders, which
//! respect the configured front-ends; the modeling itself always runs.

use std::fmt::Write as _;

use tracing::debug;

use crate::config::CheckerConfig;
use crate::engine::{
    CallEvent, CallKind, CheckerCallbacks, CheckerContext, Condition, ConstraintSolver,
    EscapeKind, ExplodedNode, FnDecl, FrameDecl, OpKind, OwnKind, OwnershipAttr, ProgramState,
    Region, SVal, Stmt, SymbolId, SymbolReaper,
};
use rustc_hash::FxHashSet;

use super::super::domain::{
    check_if_tracked, AllocationFamily, BugKind, OwnershipAfterRealloc, RefState, Report,
};
use super::super::infrastructure::allocation::{
    add_new_extent, calloc_mem, eval_mul_for_buffer_size, kernel_malloc, malloc_mem,
    malloc_mem_arg, process_zero_alloc, process_zero_alloc_arg, update_ref_state,
};
use super::super::infrastructure::classifier::{AllocClassifier, MemOperation};
use super::super::infrastructure::deallocation::free_mem_arg;
use super::super::infrastructure::escape::{
    self, apply_escape, free_when_done_arg, is_known_dealloc_message,
};
use super::super::infrastructure::reallocation::realloc_mem;
use super::super::infrastructure::reports;

/// Outcome of the callee-name dispatch.
enum NameDispatch {
    /// Not an allocator/deallocator name; fall through with the entry
    /// state (ownership annotations may still apply).
    NotRecognized,
    /// Modeled; `None` means modeling stopped (defect or no-op).
    Handled(Option<ProgramState>),
    /// Malformed shape (wrong arity) or suppressed context; skip the rest
    /// of the callback entirely.
    Abort,
}

/// Path-sensitive heap-lifecycle checker.
pub struct HeapLifecycleChecker {
    config: CheckerConfig,
    classifier: AllocClassifier,
}

impl HeapLifecycleChecker {
    pub fn new(config: CheckerConfig) -> Self {
        let classifier = AllocClassifier::new(config.optimistic());
        Self { config, classifier }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn classifier(&self) -> &AllocClassifier {
        &self.classifier
    }

    // ── Use-site checks ───────────────────────────────────────────────

    fn is_released(state: &ProgramState, sym: SymbolId) -> bool {
        state.region_state(sym).is_some_and(|rs| rs.is_released())
    }

    /// Report a use of `sym` if it was already freed. Returns whether a
    /// report was emitted.
    fn check_use_after_free(&self, sym: SymbolId, ctx: &mut CheckerContext) -> bool {
        let state = ctx.state();
        if Self::is_released(&state, sym) {
            reports::report_use_after_free(ctx, &self.config, &state, sym);
            return true;
        }
        false
    }

    fn check_use_zero_allocated(&self, sym: SymbolId, ctx: &mut CheckerContext) {
        let state = ctx.state();
        let zero_tagged = state
            .region_state(sym)
            .is_some_and(|rs| rs.is_allocated_of_size_zero())
            || state.contains_zero_realloc_sym(sym);
        if zero_tagged {
            reports::report_use_zero_allocated(ctx, &self.config, &state, sym);
        }
    }

    fn check_double_delete(&self, sym: SymbolId, ctx: &mut CheckerContext) -> bool {
        let state = ctx.state();
        if Self::is_released(&state, sym) {
            reports::report_double_delete(ctx, &self.config, &state, sym);
            return true;
        }
        false
    }

    // ── Ownership attributes ──────────────────────────────────────────

    fn malloc_mem_returns_attr(
        &self,
        ctx: &CheckerContext,
        call: &CallEvent,
        attr: &OwnershipAttr,
        state: Option<ProgramState>,
    ) -> Option<ProgramState> {
        let state = state?;
        if attr.module != "malloc" {
            return None;
        }
        match attr.arg_indices.first() {
            Some(&size_arg) => malloc_mem_arg(
                ctx,
                call,
                size_arg,
                SVal::Undefined,
                Some(state),
                AllocationFamily::Malloc,
            ),
            None => malloc_mem(
                ctx,
                call,
                SVal::Unknown,
                SVal::Undefined,
                Some(state),
                AllocationFamily::Malloc,
            ),
        }
    }

    fn free_mem_attr(
        &self,
        ctx: &mut CheckerContext,
        call: &CallEvent,
        attr: &OwnershipAttr,
        state: Option<ProgramState>,
    ) -> Option<ProgramState> {
        let mut state = state?;
        if attr.module != "malloc" {
            return None;
        }
        let hold = attr.kind == OwnKind::Holds;
        for &arg in &attr.arg_indices {
            let outcome = free_mem_arg(
                ctx,
                &self.config,
                &self.classifier,
                call,
                state.clone(),
                arg,
                hold,
                false,
            );
            if let Some(next) = outcome.state {
                state = next;
            }
        }
        Some(state)
    }

    fn process_ownership_attrs(
        &self,
        ctx: &mut CheckerContext,
        call: &CallEvent,
        decl: &FnDecl,
        mut state: Option<ProgramState>,
    ) -> Option<ProgramState> {
        if !self.config.optimistic() && !self.config.mismatched_deallocator_enabled() {
            return state;
        }
        for attr in decl.attrs.clone() {
            state = match attr.kind {
                OwnKind::Returns => self.malloc_mem_returns_attr(ctx, call, &attr, state),
                OwnKind::Takes | OwnKind::Holds => {
                    self.free_mem_attr(ctx, call, &attr, state)
                }
            };
        }
        state
    }

    // ── Retain-count API suppression ──────────────────────────────────

    /// Deallocations inside functions whose declaration carries the
    /// `__isl_` marker belong to a retain-count discipline the checker
    /// does not model; escape the arguments instead of modeling a free.
    fn suppress_deallocations_in_suspicious_contexts(
        &self,
        call: &CallEvent,
        ctx: &mut CheckerContext,
    ) -> bool {
        if call.num_args() == 0 {
            return false;
        }
        let marked = ctx.location_context().ancestors().any(|lc| {
            matches!(
                lc.decl(),
                FrameDecl::Function { declaration_marker, .. }
                    if declaration_marker.contains("__isl_")
            )
        });
        if !marked {
            return false;
        }

        let mut state = ctx.state();
        for arg in &call.args {
            if let Some(sym) = arg.as_symbol() {
                if let Some(rs) = state.region_state(sym) {
                    let escaped = RefState::escaped(rs);
                    state = state.set_region_state(sym, escaped);
                }
            }
        }
        ctx.add_transition(state);
        true
    }

    // ── Call modeling ─────────────────────────────────────────────────

    fn model_named_call(
        &self,
        ctx: &mut CheckerContext,
        call: &CallEvent,
        decl: &FnDecl,
        state: ProgramState,
    ) -> NameDispatch {
        let entry = state.clone();
        let state = Some(state);
        let handled = match decl.name.as_str() {
            "malloc" | "g_malloc" | "g_try_malloc" => match call.num_args() {
                1 => {
                    let s = malloc_mem_arg(
                        ctx,
                        call,
                        0,
                        SVal::Undefined,
                        state,
                        AllocationFamily::Malloc,
                    );
                    process_zero_alloc_arg(call, 0, s)
                }
                2 => malloc_mem_arg(ctx, call, 0, SVal::Undefined, state, AllocationFamily::Malloc),
                3 => {
                    match kernel_malloc(ctx, call, &entry, self.config.platform()) {
                        Some(s) => Some(s),
                        None => malloc_mem_arg(
                            ctx,
                            call,
                            0,
                            SVal::Undefined,
                            state,
                            AllocationFamily::Malloc,
                        ),
                    }
                }
                _ => return NameDispatch::Abort,
            },
            "kmalloc" => {
                if call.num_args() < 1 {
                    return NameDispatch::Abort;
                }
                match kernel_malloc(ctx, call, &entry, self.config.platform()) {
                    Some(s) => Some(s),
                    None => malloc_mem_arg(
                        ctx,
                        call,
                        0,
                        SVal::Undefined,
                        state,
                        AllocationFamily::Malloc,
                    ),
                }
            }
            "valloc" => {
                if call.num_args() < 1 {
                    return NameDispatch::Abort;
                }
                let s =
                    malloc_mem_arg(ctx, call, 0, SVal::Undefined, state, AllocationFamily::Malloc);
                process_zero_alloc_arg(call, 0, s)
            }
            "realloc" | "g_realloc" | "g_try_realloc" => {
                let s = state.and_then(|st| {
                    realloc_mem(ctx, &self.config, &self.classifier, call, false, st, false)
                });
                process_zero_alloc_arg(call, 1, s)
            }
            "reallocf" => {
                let s = state.and_then(|st| {
                    realloc_mem(ctx, &self.config, &self.classifier, call, true, st, false)
                });
                process_zero_alloc_arg(call, 1, s)
            }
            "calloc" => {
                let s = calloc_mem(ctx, call, state);
                let s = process_zero_alloc_arg(call, 0, s);
                process_zero_alloc_arg(call, 1, s)
            }
            "free" | "g_free" | "kfree" => {
                if self.suppress_deallocations_in_suspicious_contexts(call, ctx) {
                    return NameDispatch::Abort;
                }
                state.and_then(|st| {
                    free_mem_arg(ctx, &self.config, &self.classifier, call, st, 0, false, false)
                        .state
                })
            }
            "strdup" | "_strdup" | "wcsdup" | "_wcsdup" | "strndup" => update_ref_state(
                &call.stmt,
                state,
                AllocationFamily::Malloc,
                Some(call.ret.clone()),
            ),
            "alloca" | "_alloca" => {
                if call.num_args() < 1 {
                    return NameDispatch::Abort;
                }
                let s = malloc_mem_arg(
                    ctx,
                    call,
                    0,
                    SVal::Undefined,
                    state,
                    AllocationFamily::Alloca,
                );
                process_zero_alloc_arg(call, 0, s)
            }
            "if_nameindex" => malloc_mem(
                ctx,
                call,
                SVal::Unknown,
                SVal::Unknown,
                state,
                AllocationFamily::IfNameIndex,
            ),
            "if_freenameindex" => state.and_then(|st| {
                free_mem_arg(ctx, &self.config, &self.classifier, call, st, 0, false, false).state
            }),
            "g_malloc0" | "g_try_malloc0" => {
                if call.num_args() < 1 {
                    return NameDispatch::Abort;
                }
                let s = malloc_mem_arg(
                    ctx,
                    call,
                    0,
                    SVal::ConcreteInt(0),
                    state,
                    AllocationFamily::Malloc,
                );
                process_zero_alloc_arg(call, 0, s)
            }
            "g_memdup" => {
                if call.num_args() < 2 {
                    return NameDispatch::Abort;
                }
                let s =
                    malloc_mem_arg(ctx, call, 1, SVal::Undefined, state, AllocationFamily::Malloc);
                process_zero_alloc_arg(call, 1, s)
            }
            "g_malloc_n" | "g_try_malloc_n" | "g_malloc0_n" | "g_try_malloc0_n" => {
                if call.num_args() < 2 {
                    return NameDispatch::Abort;
                }
                let init = if matches!(decl.name.as_str(), "g_malloc0_n" | "g_try_malloc0_n") {
                    SVal::ConcreteInt(0)
                } else {
                    SVal::Undefined
                };
                let total = eval_mul_for_buffer_size(&call.arg_sval(0), &call.arg_sval(1));
                let s = malloc_mem(ctx, call, total, init, state, AllocationFamily::Malloc);
                let s = process_zero_alloc_arg(call, 0, s);
                process_zero_alloc_arg(call, 1, s)
            }
            "g_realloc_n" | "g_try_realloc_n" => {
                if call.num_args() < 3 {
                    return NameDispatch::Abort;
                }
                let s = state.and_then(|st| {
                    realloc_mem(ctx, &self.config, &self.classifier, call, false, st, true)
                });
                let s = process_zero_alloc_arg(call, 1, s);
                process_zero_alloc_arg(call, 2, s)
            }
            _ => {
                // Direct calls to the standard allocation operators.
                if !self.classifier.is_standard_new_delete(decl) {
                    return NameDispatch::NotRecognized;
                }
                match decl.operator {
                    Some(OpKind::New) => {
                        let s = malloc_mem_arg(
                            ctx,
                            call,
                            0,
                            SVal::Undefined,
                            state,
                            AllocationFamily::CxxNew,
                        );
                        process_zero_alloc_arg(call, 0, s)
                    }
                    Some(OpKind::ArrayNew) => {
                        let s = malloc_mem_arg(
                            ctx,
                            call,
                            0,
                            SVal::Undefined,
                            state,
                            AllocationFamily::CxxNewArray,
                        );
                        process_zero_alloc_arg(call, 0, s)
                    }
                    Some(OpKind::Delete) | Some(OpKind::ArrayDelete) => state.and_then(|st| {
                        free_mem_arg(
                            ctx,
                            &self.config,
                            &self.classifier,
                            call,
                            st,
                            0,
                            false,
                            false,
                        )
                        .state
                    }),
                    None => return NameDispatch::NotRecognized,
                }
            }
        };
        NameDispatch::Handled(handled)
    }

    fn process_new_allocation(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        let CallKind::New {
            array,
            operator_decl,
            element_count,
            nontrivial_ctor_with_record_ptr_arg,
            consumed,
            ..
        } = &call.kind
        else {
            return;
        };

        if !self.classifier.is_standard_new_delete(operator_decl) {
            return;
        }

        // A constructor taking a pointer-to-record may stash 'this'
        // somewhere we cannot see; skip rather than report wrongly, unless
        // the value is consumed by the surrounding expression.
        if !*consumed && *nontrivial_ctor_with_record_ptr_arg {
            return;
        }

        let family = if *array {
            AllocationFamily::CxxNewArray
        } else {
            AllocationFamily::CxxNew
        };
        let target = call.ret.clone();

        // The engine already bound the operator-new result (and ran any
        // initializer); keep that binding instead of conjuring a new one.
        let state = update_ref_state(&call.stmt, Some(ctx.state()), family, Some(target.clone()));
        let state = add_new_extent(call, state, &target);
        let state = if *array {
            let count = element_count.clone().unwrap_or(SVal::Unknown);
            process_zero_alloc(&count, &target, state)
        } else {
            state
        };
        if let Some(state) = state {
            ctx.add_transition(state);
        }
    }

    fn check_escape_on_return(&self, ret_value: Option<&SVal>, ctx: &mut CheckerContext) {
        let Some(val) = ret_value else {
            return;
        };
        let mut sym = val.as_symbol();
        if sym.is_none() {
            // Returning a field or element of tracked memory still hands
            // the whole allocation to the caller.
            if let Some(region) = val.as_region() {
                if region.is_element_or_field() {
                    sym = region.base_symbol();
                }
            }
        }
        if let Some(sym) = sym {
            self.check_use_after_free(sym, ctx);
        }
    }

    // ── Leaks ─────────────────────────────────────────────────────────

    /// Walk the execution graph backwards from `node` to the allocation
    /// site of `sym`: the last node (towards the root) that still tracks
    /// the symbol. Also picks the most recent store of the symbol into a
    /// variable of the leaking frame, for naming the leak.
    fn allocation_site(
        node: &ExplodedNode,
        sym: SymbolId,
    ) -> (ExplodedNode, Option<Region>) {
        let leak_frame = node.location_context().clone();
        let mut alloc_node = node.clone();
        let mut reference_region: Option<Region> = None;

        for n in node.path_to_root() {
            if n.state().region_state(sym).is_none() {
                break;
            }
            if reference_region.is_none() {
                if let Some(target) = n.store_target() {
                    let stored = n.state().region_value(target);
                    if stored.and_then(|v| v.as_loc_symbol()) == Some(sym) {
                        // Do not name variables of other stack frames.
                        let frame_ok = target
                            .var_frame()
                            .map_or(true, |f| f == leak_frame.frame_id());
                        if frame_ok {
                            reference_region = Some(target.clone());
                        }
                    }
                }
            }
            let n_ctx = n.location_context();
            if n_ctx.same_frame(&leak_frame) || n_ctx.is_parent_of(&leak_frame) {
                alloc_node = n.clone();
            }
        }
        (alloc_node, reference_region)
    }

    fn report_leak(&self, sym: SymbolId, node: &ExplodedNode, ctx: &mut CheckerContext) {
        if !self.config.malloc_enabled() && !self.config.new_delete_leaks_enabled() {
            return;
        }

        let state = ctx.state();
        let Some(rs) = state.region_state(sym) else {
            return;
        };
        let family = rs.family();

        // Stack reclamation takes care of alloca.
        if family == AllocationFamily::Alloca {
            return;
        }
        let Some(check) = check_if_tracked(family, true, &self.config) else {
            return;
        };

        let (alloc_node, region) = Self::allocation_site(node, sym);
        let uniqueing = alloc_node.stmt_for_diagnostics().map(|s| s.id);

        let message = match region.as_ref().and_then(|r| r.pretty_name()) {
            Some(name) => format!("Potential leak of memory pointed to by '{}'", name),
            None => "Potential memory leak".to_string(),
        };
        debug!(%sym, %family, "leak detected");
        ctx.emit_report(
            Report::new(BugKind::Leak, check, message)
                .with_symbol(sym)
                .leak(uniqueing),
        );
    }

    // ── Debug dump ────────────────────────────────────────────────────

    fn render_state(&self, out: &mut String, state: &ProgramState) {
        if state.region_state_is_empty() {
            return;
        }
        let _ = writeln!(out, "RegionState:");
        let mut rows: Vec<_> = state.region_state_iter().collect();
        rows.sort_by_key(|(sym, _)| *sym);
        for (sym, rs) in rows {
            let check = check_if_tracked(rs.family(), false, &self.config)
                .or_else(|| check_if_tracked(rs.family(), true, &self.config));
            match check {
                Some(check) => {
                    let _ = writeln!(out, "{} : {} ({})", sym, rs, check.name());
                }
                None => {
                    let _ = writeln!(out, "{} : {}", sym, rs);
                }
            }
        }
    }
}

impl CheckerCallbacks for HeapLifecycleChecker {
    fn check_pre_call(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        // Deleting through a destructor of released memory.
        if let CallKind::Method {
            this,
            is_destructor: true,
            ..
        } = &call.kind
        {
            let Some(sym) = this.as_symbol() else { return };
            if self.check_double_delete(sym, ctx) {
                return;
            }
        }

        // Deallocators are modeled (and double frees reported) post-call.
        if let Some(decl) = call.decl() {
            if self.config.malloc_enabled()
                && (self.classifier.is_c_mem_function(
                    decl,
                    AllocationFamily::Malloc,
                    MemOperation::Free,
                ) || self.classifier.is_c_mem_function(
                    decl,
                    AllocationFamily::IfNameIndex,
                    MemOperation::Free,
                ))
            {
                return;
            }
        }

        // Calling a method on released memory.
        if let CallKind::Method { this, .. } = &call.kind {
            let Some(sym) = this.as_symbol() else { return };
            if self.check_use_after_free(sym, ctx) {
                return;
            }
        }

        // Passing released memory as an argument.
        for arg in &call.args {
            if arg.is_loc() {
                if let Some(sym) = arg.as_symbol() {
                    if self.check_use_after_free(sym, ctx) {
                        return;
                    }
                }
            }
        }
    }

    fn check_post_call(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        let mut state: Option<ProgramState> = Some(ctx.state());

        // Name dispatch covers plain functions only; methods still get
        // their ownership annotations honored below.
        if let CallKind::Function(decl) = &call.kind {
            let entry = ctx.state();
            match self.model_named_call(ctx, call, decl, entry) {
                NameDispatch::Abort => return,
                NameDispatch::Handled(modeled) => state = modeled,
                NameDispatch::NotRecognized => {}
            }
        }
        if let Some(decl) = call.decl() {
            state = self.process_ownership_attrs(ctx, call, decl, state);
        }
        if let Some(state) = state {
            ctx.add_transition(state);
        }
    }

    fn check_post_new(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        self.process_new_allocation(call, ctx);
    }

    fn check_new_allocator(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        self.process_new_allocation(call, ctx);
    }

    fn check_pre_delete(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        let CallKind::Delete { operator_decl, .. } = &call.kind else {
            return;
        };

        // Even with the new/delete front-end off, deleting freed memory is
        // a use of it.
        if !self.config.new_delete_enabled() {
            if let Some(sym) = call.arg_sval(0).as_symbol() {
                self.check_use_after_free(sym, ctx);
            }
        }

        if !self.classifier.is_standard_new_delete(operator_decl) {
            return;
        }

        let entry = ctx.state();
        let outcome = free_mem_arg(
            ctx,
            &self.config,
            &self.classifier,
            call,
            entry,
            0,
            false,
            false,
        );
        if let Some(state) = outcome.state {
            ctx.add_transition(state);
        }
    }

    fn check_post_message(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        let Some(msg) = call.as_message() else { return };

        if !is_known_dealloc_message(msg) {
            return;
        }
        if free_when_done_arg(call, msg) == Some(false) {
            return;
        }
        // Callback arguments make the ownership story unknowable.
        if call.arguments_may_escape() {
            return;
        }

        let entry = ctx.state();
        let outcome = free_mem_arg(
            ctx,
            &self.config,
            &self.classifier,
            call,
            entry,
            0,
            /*hold=*/ true,
            /*returns_null_on_failure=*/ true,
        );
        if let Some(state) = outcome.state {
            ctx.add_transition(state);
        }
    }

    fn check_post_block(&self, call: &CallEvent, ctx: &mut CheckerContext) {
        let CallKind::Block { captured_regions } = &call.kind else {
            return;
        };
        if captured_regions.is_empty() {
            return;
        }

        // Captured pointers may be freed by the block at any later point;
        // stop tracking everything reachable from the captures.
        let mut state = ctx.state();
        for region in captured_regions {
            let reachable = region
                .base_symbol()
                .or_else(|| state.region_value(region).and_then(|v| v.as_symbol()));
            if let Some(sym) = reachable {
                state = state.remove_region_state(sym);
            }
        }
        ctx.add_transition(state);
    }

    fn check_dead_symbols(&self, reaper: &SymbolReaper, ctx: &mut CheckerContext) {
        let entry_state = ctx.state();

        let mut errors: Vec<SymbolId> = Vec::new();
        let mut state = entry_state.clone();
        for (sym, rs) in entry_state.region_state_iter() {
            if reaper.is_dead(sym) {
                if rs.is_live() {
                    errors.push(sym);
                }
                state = state.remove_region_state(sym);
            }
        }

        if state.region_state_eq(&entry_state) {
            return;
        }

        for (to_sym, pair) in entry_state.realloc_pairs_iter() {
            if reaper.is_dead(to_sym) || reaper.is_dead(pair.from_sym) {
                state = state.remove_realloc_pair(to_sym);
            }
        }
        for (sym, ret) in entry_state.free_return_values_iter() {
            if reaper.is_dead(sym) || reaper.is_dead(ret) {
                state = state.remove_free_return_value(sym);
            }
        }

        if errors.is_empty() {
            ctx.add_transition(state);
            return;
        }

        errors.sort();
        // Leaks hang off a non-fatal node: the path continues past them.
        let Some(leak_node) = ctx.generate_non_fatal_error_node(entry_state) else {
            ctx.add_transition(state);
            return;
        };
        for sym in errors {
            self.report_leak(sym, &leak_node, ctx);
        }
        ctx.add_transition_from(state, leak_node);
    }

    fn check_pre_return(&self, ret_value: Option<&SVal>, _stmt: &Stmt, ctx: &mut CheckerContext) {
        self.check_escape_on_return(ret_value, ctx);
    }

    fn check_end_function(
        &self,
        ret_value: Option<&SVal>,
        _stmt: &Stmt,
        ctx: &mut CheckerContext,
    ) {
        // Automatic destructors run after the return statement; memory
        // they free is caught here rather than in the pre-return check.
        self.check_escape_on_return(ret_value, ctx);
    }

    fn check_location(&self, loc: &SVal, _is_load: bool, _stmt: &Stmt, ctx: &mut CheckerContext) {
        if let Some(sym) = loc.loc_symbol_in_base() {
            self.check_use_after_free(sym, ctx);
            self.check_use_zero_allocated(sym, ctx);
        }
    }

    fn eval_assume(
        &self,
        state: ProgramState,
        _cond: &Condition,
        _assumption: bool,
    ) -> ProgramState {
        let mut state = state;

        // A symbol constrained to null is a failed allocation; drop it.
        let tracked: Vec<SymbolId> = state.region_state_iter().map(|(sym, _)| sym).collect();
        for sym in tracked {
            if ConstraintSolver::is_null(&state, sym).is_constrained_true() {
                state = state.remove_region_state(sym);
            }
        }

        // A null reallocated-to symbol means reallocation failed: restore
        // the reallocated-from symbol per its ownership policy.
        let pairs: Vec<_> = state
            .realloc_pairs_iter()
            .map(|(to_sym, pair)| (to_sym, *pair))
            .collect();
        for (to_sym, pair) in pairs {
            if !ConstraintSolver::is_null(&state, to_sym).is_constrained_true() {
                continue;
            }
            if let Some(rs) = state.region_state(pair.from_sym).cloned() {
                if rs.is_released() {
                    match pair.ownership {
                        OwnershipAfterRealloc::ToBeFreedAfterFailure => {
                            state = state.set_region_state(
                                pair.from_sym,
                                RefState::allocated(rs.family(), rs.stmt().clone()),
                            );
                        }
                        OwnershipAfterRealloc::DoNotTrackAfterFailure => {
                            state = state.remove_region_state(pair.from_sym);
                        }
                        OwnershipAfterRealloc::FreeOnFailure => {}
                    }
                }
            }
            state = state.remove_realloc_pair(to_sym);
        }

        state
    }

    fn check_pointer_escape(
        &self,
        state: ProgramState,
        escaped: &FxHashSet<SymbolId>,
        call: Option<&CallEvent>,
        kind: EscapeKind,
    ) -> ProgramState {
        self.pointer_escape_aux(state, escaped, call, kind, false)
    }

    fn check_const_pointer_escape(
        &self,
        state: ProgramState,
        escaped: &FxHashSet<SymbolId>,
        call: Option<&CallEvent>,
        kind: EscapeKind,
    ) -> ProgramState {
        self.pointer_escape_aux(state, escaped, call, kind, true)
    }

    fn print_state(&self, out: &mut String, state: &ProgramState) {
        self.render_state(out, state);
    }
}

impl HeapLifecycleChecker {
    fn pointer_escape_aux(
        &self,
        state: ProgramState,
        escaped: &FxHashSet<SymbolId>,
        call: Option<&CallEvent>,
        kind: EscapeKind,
        is_const: bool,
    ) -> ProgramState {
        let mut escaping_symbol = None;
        if kind == EscapeKind::DirectEscapeOnCall {
            if let Some(call) = call {
                let (may_free, escaping) =
                    escape::may_free_any_escaped_memory(&self.classifier, call);
                if !may_free && escaping.is_none() {
                    // The call is known not to free; keep tracking.
                    return state;
                }
                escaping_symbol = escaping;
            }
        }
        apply_escape(state, escaped, escaping_symbol, is_const)
    }
}
