//! Deallocation modeling
//!
//! Validates a free/delete call and transitions the symbol. The checks run
//! in a fixed order: null no-op, region sanity, memory-space legality,
//! double free, deallocator pairing, offset, function pointer. Any defect
//! generates an error node and leaves the state untouched; control returns
//! to the engine.

use tracing::debug;

use crate::config::CheckerConfig;
use crate::engine::{
    CallEvent, CheckerContext, Condition, ConstraintSolver, ProgramState, SVal, SymbolId,
};

use super::super::domain::{AllocationFamily, RefState};
use super::classifier::AllocClassifier;
use super::reports;

/// Result of modeling one deallocation.
pub struct FreeOutcome {
    /// New state, or `None` when modeling stopped (no-op or defect).
    pub state: Option<ProgramState>,
    /// Whether the freed symbol was registered as allocated by this
    /// checker. Distinguishes `realloc` on a pointer of unknown origin.
    pub known_to_be_allocated: bool,
}

impl FreeOutcome {
    fn stop() -> Self {
        Self {
            state: None,
            known_to_be_allocated: false,
        }
    }
}

/// Did the previous free of `sym` definitely fail? Also returns the
/// status symbol the failure was observed through.
pub fn did_previous_free_fail(
    state: &ProgramState,
    sym: SymbolId,
) -> (bool, Option<SymbolId>) {
    match state.free_return_value(sym) {
        Some(ret) => (
            ConstraintSolver::is_null(state, ret).is_constrained_true(),
            Some(ret),
        ),
        None => (false, None),
    }
}

/// Model a deallocation of argument `arg_index` of `call`.
pub fn free_mem_arg(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    classifier: &AllocClassifier,
    call: &CallEvent,
    state: ProgramState,
    arg_index: usize,
    hold: bool,
    returns_null_on_failure: bool,
) -> FreeOutcome {
    if call.num_args() < arg_index + 1 {
        return FreeOutcome::stop();
    }
    free_mem(
        ctx,
        config,
        classifier,
        &call.arg_sval(arg_index),
        call,
        state,
        hold,
        returns_null_on_failure,
    )
}

/// Model a deallocation of `arg_val`, reported against `parent_call`.
///
/// `hold` distinguishes ownership transfer (`Relinquished`) from a plain
/// free (`Released`).
#[allow(clippy::too_many_arguments)]
pub fn free_mem(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    classifier: &AllocClassifier,
    arg_val: &SVal,
    parent_call: &CallEvent,
    state: ProgramState,
    hold: bool,
    returns_null_on_failure: bool,
) -> FreeOutcome {
    // Undefined arguments are diagnosed by the engine's own undef checks.
    if matches!(arg_val, SVal::Undefined) {
        return FreeOutcome::stop();
    }
    if !arg_val.is_loc() {
        return FreeOutcome::stop();
    }

    // The explicit NULL case: freeing null is a no-op.
    let (null_state, not_null_state) = state.assume(&Condition::IsNull(arg_val.clone()));
    if null_state.is_some() && not_null_state.is_none() {
        return FreeOutcome::stop();
    }

    if arg_val.is_unknown_or_undef() {
        return FreeOutcome::stop();
    }

    let call_family = classifier.family_of_call(parent_call);

    let Some(region) = arg_val.as_region() else {
        // Non-region locations (constant addresses) can't be freed.
        reports::report_bad_free(ctx, config, call_family, arg_val, &parent_call.stmt);
        return FreeOutcome::stop();
    };

    let region = region.strip_casts();

    // Blocks may look like heap data but must never be freed.
    if region.base_region().is_block() {
        reports::report_bad_free(ctx, config, call_family, arg_val, &parent_call.stmt);
        return FreeOutcome::stop();
    }

    // Only unknown-space or heap-space memory may legally be freed;
    // parameters, locals, statics and globals may not. False negatives
    // are better than false positives, so unknown space stays permitted.
    let space = region.memory_space();
    if !matches!(
        space,
        crate::engine::MemSpace::Unknown | crate::engine::MemSpace::Heap
    ) {
        if region.is_alloca() {
            reports::report_free_alloca(ctx, config);
        } else {
            reports::report_bad_free(ctx, config, call_family, arg_val, &parent_call.stmt);
        }
        return FreeOutcome::stop();
    }

    // Various cases can produce non-symbol bases; ignore them.
    let Some(sym_base) = region.base_region().base_symbol() else {
        return FreeOutcome::stop();
    };

    let rs_base = state.region_state(sym_base).cloned();
    let mut prev_ret_status: Option<SymbolId> = None;
    let known_to_be_allocated = rs_base.as_ref().is_some_and(|rs| rs.is_live());

    if let Some(rs) = &rs_base {
        // Memory returned by alloca() shouldn't be freed.
        if rs.family() == AllocationFamily::Alloca {
            reports::report_free_alloca(ctx, config);
            return FreeOutcome::stop();
        }

        // Check for double free first.
        if rs.is_released() || rs.is_relinquished() {
            let (free_failed, ret_status) = did_previous_free_fail(&state, sym_base);
            prev_ret_status = ret_status;
            if !free_failed {
                reports::report_double_free(
                    ctx,
                    config,
                    &state,
                    rs.is_released(),
                    sym_base,
                    prev_ret_status,
                );
                return FreeOutcome::stop();
            }
        } else if rs.is_live() || rs.is_escaped() {
            // The deallocator must match the family that allocated.
            if call_family != Some(rs.family()) {
                reports::report_mismatched_dealloc(
                    ctx,
                    config,
                    rs.stmt(),
                    rs.family(),
                    &parent_call.stmt,
                    sym_base,
                    hold,
                );
                return FreeOutcome::stop();
            }

            // The freed location must be the start of the allocation.
            let offset = region.offset();
            if offset.is_valid() && !offset.has_symbolic_offset() && offset.bytes() != 0 {
                reports::report_offset_free(
                    ctx,
                    config,
                    rs.family(),
                    offset.bytes(),
                    &parent_call.stmt,
                    Some(rs.stmt()),
                );
                return FreeOutcome::stop();
            }
        }
    }

    if ctx.symbol_manager().is_function_pointer(sym_base) {
        reports::report_function_pointer_free(ctx, config, call_family, &parent_call.stmt);
        return FreeOutcome::stop();
    }

    // Clear out any info on a previous failed free of this symbol.
    let mut state = state.remove_free_return_value(sym_base);

    // Deallocators that return null on failure: remember the status
    // symbol, and keep it alive for as long as the freed symbol is.
    if returns_null_on_failure {
        if let Some(ret_status) = parent_call.ret.as_symbol() {
            ctx.symbol_manager()
                .add_symbol_dependency(sym_base, ret_status);
            state = state.set_free_return_value(sym_base, ret_status);
        }
    }

    let family = rs_base
        .as_ref()
        .map(|rs| rs.family())
        .or(call_family)
        // Defensive: an unrecognized deallocator reaching this point is
        // treated as malloc-family rather than aborting the path.
        .unwrap_or(AllocationFamily::Malloc);

    debug!(sym = %sym_base, %family, hold, "deallocation tracked");

    let record = if hold {
        RefState::relinquished(family, parent_call.stmt.clone())
    } else {
        RefState::released(family, parent_call.stmt.clone())
    };
    FreeOutcome {
        state: Some(state.set_region_state(sym_base, record)),
        known_to_be_allocated,
    }
}
