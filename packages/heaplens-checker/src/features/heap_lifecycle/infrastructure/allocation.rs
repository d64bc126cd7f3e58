//! Allocation modeling
//!
//! Binds a call's result to the heap symbol conjured for the call
//! expression, records default initialization and the region's extent, and
//! enters the symbol into the region-state table as `Allocated`. The
//! zero-size follow-up retags symbols whose size argument is provably zero.

use tracing::debug;

use crate::config::Platform;
use crate::engine::{
    CallEvent, CallKind, CheckerContext, Condition, ProgramState, SVal, Stmt,
};

use super::super::domain::{AllocationFamily, RefState};

/// The conjured return value for an allocating call.
///
/// When the engine already bound a symbolic location to the call
/// expression, conjuring again for the same program point yields the same
/// symbol; reuse it so later bookkeeping (realloc pairs) names the value
/// the program actually tests.
fn conjured_ret_for_call(ctx: &CheckerContext, call: &CallEvent) -> SVal {
    if call.ret.as_loc_symbol().is_some() {
        call.ret.clone()
    } else {
        let (_, val) = ctx.conjure_heap_symbol(call.stmt.id);
        val
    }
}

/// `blocks * block_bytes`, as far as this engine can fold it.
pub fn eval_mul_for_buffer_size(blocks: &SVal, block_bytes: &SVal) -> SVal {
    match (blocks.as_concrete_int(), block_bytes.as_concrete_int()) {
        (Some(a), Some(b)) => SVal::ConcreteInt(a.saturating_mul(b)),
        (Some(0), _) | (_, Some(0)) => SVal::ConcreteInt(0),
        _ => SVal::Unknown,
    }
}

/// Enter `sym` (the value bound to `stmt`, or the supplied `ret_val`) into
/// the region-state table as `Allocated`.
pub fn update_ref_state(
    stmt: &Stmt,
    state: Option<ProgramState>,
    family: AllocationFamily,
    ret_val: Option<SVal>,
) -> Option<ProgramState> {
    let state = state?;
    let ret = match ret_val {
        Some(v) => v,
        None => state.expr_value(stmt.id)?.clone(),
    };
    // Allocators return pointers; anything else is not ours to track.
    let sym = ret.as_loc_symbol()?;
    debug!(%sym, %family, "allocation tracked");
    Some(state.set_region_state(sym, RefState::allocated(family, stmt.clone())))
}

/// Model a memory allocation: bind the conjured heap value to the call,
/// default-initialize it with `init`, constrain the extent to `size`, and
/// track the symbol.
pub fn malloc_mem(
    ctx: &CheckerContext,
    call: &CallEvent,
    size: SVal,
    init: SVal,
    state: Option<ProgramState>,
    family: AllocationFamily,
) -> Option<ProgramState> {
    let state = state?;

    // The declared return type must be pointer-like.
    if let Some(decl) = call.decl() {
        if !decl.returns_pointer {
            return None;
        }
    }

    let ret = conjured_ret_for_call(ctx, call);
    let sym = ret.as_loc_symbol()?;

    let mut state = state.bind_expr(call.stmt.id, ret.clone());
    state = state.set_default_init(sym, init);

    // Constrain the region's extent to the evaluated size operand, when
    // there is a usable one.
    match &size {
        SVal::ConcreteInt(_) | SVal::Sym(_) => {
            state = state.set_extent(sym, size);
        }
        _ => {}
    }

    update_ref_state(&call.stmt, Some(state), family, Some(ret))
}

/// Convenience: size comes from argument `size_arg`.
pub fn malloc_mem_arg(
    ctx: &CheckerContext,
    call: &CallEvent,
    size_arg: usize,
    init: SVal,
    state: Option<ProgramState>,
    family: AllocationFamily,
) -> Option<ProgramState> {
    malloc_mem(ctx, call, call.arg_sval(size_arg), init, state, family)
}

/// `calloc(n, size)`: zero-initialized, extent `n * size`.
pub fn calloc_mem(
    ctx: &CheckerContext,
    call: &CallEvent,
    state: Option<ProgramState>,
) -> Option<ProgramState> {
    if call.num_args() < 2 {
        return None;
    }
    let total = eval_mul_for_buffer_size(&call.arg_sval(0), &call.arg_sval(1));
    malloc_mem(
        ctx,
        call,
        total,
        SVal::ConcreteInt(0),
        state,
        AllocationFamily::Malloc,
    )
}

/// Kernel allocators take a flags word; when the platform's zero flag is
/// provably set, the allocation is zero-initialized like calloc.
/// `None` means "no special handling, fall back to plain malloc modeling".
pub fn kernel_malloc(
    ctx: &CheckerContext,
    call: &CallEvent,
    state: &ProgramState,
    platform: Platform,
) -> Option<ProgramState> {
    let zero_flag = platform.kernel_zero_flag()?;

    if call.num_args() < 2 {
        return None;
    }
    let flags = call.arg_sval(call.num_args() - 1);
    // A location here means a bad header; bail out.
    if flags.as_region().is_some() || flags.is_unknown_or_undef() {
        return None;
    }

    let (set_state, unset_state) = state.assume(&Condition::MaskedNonZero(flags, zero_flag));
    if let (Some(set_state), None) = (set_state, unset_state) {
        debug!("kernel allocation with zero flag set; treating like calloc");
        return malloc_mem(
            ctx,
            call,
            call.arg_sval(0),
            SVal::ConcreteInt(0),
            Some(set_state),
            AllocationFamily::Malloc,
        );
    }
    None
}

/// Zero-size allocation follow-up.
///
/// Splits the path on `size == 0`. When the size is provably zero, a
/// tracked allocated symbol is retagged `AllocatedOfSizeZero`; an untracked
/// one (the zero-size realloc result) goes into the zero-size symbol set.
/// Otherwise the path continues on the non-zero side.
pub fn process_zero_alloc(
    size: &SVal,
    ret_val: &SVal,
    state: Option<ProgramState>,
) -> Option<ProgramState> {
    let state = state?;

    if size.is_unknown_or_undef() {
        return Some(state);
    }

    let (zero_state, nonzero_state) = state.assume(&Condition::IsZero(size.clone()));
    match (zero_state, nonzero_state) {
        (Some(zero_state), None) => {
            let Some(sym) = ret_val.as_loc_symbol() else {
                return Some(state);
            };
            match state.region_state(sym) {
                Some(rs) if rs.is_allocated() => {
                    Some(zero_state.set_region_state(sym, RefState::allocated_of_size_zero(rs)))
                }
                Some(_) => Some(state),
                // Zero-size realloc: the result is untracked, but uses of
                // it still deserve a zero-allocation diagnosis.
                None => Some(zero_state.add_zero_realloc_sym(sym)),
            }
        }
        // Assume the size is non-zero going forward.
        (_, Some(nonzero_state)) => Some(nonzero_state),
        (None, None) => Some(state),
    }
}

/// Zero-size follow-up keyed by a size argument index of the call.
pub fn process_zero_alloc_arg(
    call: &CallEvent,
    size_arg: usize,
    state: Option<ProgramState>,
) -> Option<ProgramState> {
    let state = state?;
    let ret = state
        .expr_value(call.stmt.id)
        .cloned()
        .unwrap_or_else(|| call.ret.clone());
    process_zero_alloc(&call.arg_sval(size_arg), &ret, Some(state))
}

/// Extent of a new-expression: element count times element size, attached
/// to the cast-stripped target region.
pub fn add_new_extent(
    call: &CallEvent,
    state: Option<ProgramState>,
    target: &SVal,
) -> Option<ProgramState> {
    let state = state?;
    let CallKind::New {
        array,
        element_count,
        element_size_bytes,
        ..
    } = &call.kind
    else {
        return Some(state);
    };

    let sym = match target.as_region() {
        Some(region) => region.strip_casts().base_symbol(),
        None => None,
    };
    let Some(sym) = sym else {
        return Some(state);
    };

    let count = if *array {
        element_count.clone().unwrap_or(SVal::Unknown)
    } else {
        SVal::ConcreteInt(1)
    };
    match count.as_concrete_int() {
        Some(n) => {
            let bytes = n.saturating_mul(*element_size_bytes as i64);
            Some(state.set_extent(sym, SVal::ConcreteInt(bytes)))
        }
        None => Some(state),
    }
}
