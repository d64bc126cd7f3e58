//! Reallocation modeling
//!
//! `toPtr = realloc(fromPtr, size)` decomposes into the null-pointer /
//! zero-size quadrant the constraints leave feasible:
//!
//! - `fromPtr` null, size non-zero → plain malloc
//! - `fromPtr` null, size zero → no-op
//! - `fromPtr` non-null, size zero → free
//! - otherwise → free + allocate, with a pair-table entry describing what
//!   failure means for `fromPtr`
//!
//! The general case intentionally sequences the free and the allocation
//! from the *unsplit* entry state, exactly as the reference behavior does;
//! see the regression test pinning this.

use tracing::debug;

use crate::config::CheckerConfig;
use crate::engine::{CallEvent, CheckerContext, Condition, ProgramState, SVal};

use super::super::domain::{AllocationFamily, OwnershipAfterRealloc, ReallocPair};
use super::allocation::{eval_mul_for_buffer_size, malloc_mem};
use super::classifier::AllocClassifier;
use super::deallocation::free_mem_arg;

/// Model `realloc`-shaped calls. `should_free_on_fail` marks the
/// `reallocf` variant; `suffix_with_n` marks the three-argument
/// `g_realloc_n` shape whose size is `arg1 * arg2`.
pub fn realloc_mem(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    classifier: &AllocClassifier,
    call: &CallEvent,
    should_free_on_fail: bool,
    state: ProgramState,
    suffix_with_n: bool,
) -> Option<ProgramState> {
    if suffix_with_n {
        if call.num_args() < 3 {
            return None;
        }
    } else if call.num_args() < 2 {
        return None;
    }

    let arg0 = call.arg_sval(0);
    if matches!(arg0, SVal::Undefined) {
        return None;
    }

    let total_size = if suffix_with_n {
        eval_mul_for_buffer_size(&call.arg_sval(1), &call.arg_sval(2))
    } else {
        call.arg_sval(1)
    };
    if matches!(total_size, SVal::Undefined) {
        return None;
    }

    let (ptr_null_state, ptr_not_null_state) = state.assume(&Condition::IsNull(arg0.clone()));
    let (size_zero_state, size_not_zero_state) =
        state.assume(&Condition::IsZero(total_size.clone()));

    // Only take the exceptional branches when they are definitely true;
    // under-constrained paths get regular realloc behavior.
    let ptr_is_null = ptr_null_state.is_some() && ptr_not_null_state.is_none();
    let size_is_zero = size_zero_state.is_some() && size_not_zero_state.is_none();

    // realloc(NULL, n) is malloc(n).
    if ptr_is_null && !size_is_zero {
        return malloc_mem(
            ctx,
            call,
            total_size,
            SVal::Undefined,
            ptr_null_state,
            AllocationFamily::Malloc,
        );
    }

    // realloc(NULL, 0): implementation-defined, nothing to model.
    if ptr_is_null && size_is_zero {
        return Some(state);
    }

    let from_sym = arg0.as_symbol()?;
    let to_sym = call.ret.as_symbol()?;

    // realloc(ptr, 0) frees; the return value stays unconstrained.
    if size_is_zero {
        let outcome = free_mem_arg(
            ctx,
            config,
            classifier,
            call,
            size_zero_state.unwrap_or_else(|| state.clone()),
            0,
            false,
            false,
        );
        if let Some(freed) = outcome.state {
            return Some(freed);
        }
    }

    // General case: free then allocate, from the unsplit entry state.
    let outcome = free_mem_arg(ctx, config, classifier, call, state, 0, false, false);
    let freed = outcome.state?;
    let reallocated = malloc_mem(
        ctx,
        call,
        total_size,
        SVal::Unknown,
        Some(freed),
        AllocationFamily::Malloc,
    )?;

    let ownership = if should_free_on_fail {
        OwnershipAfterRealloc::FreeOnFailure
    } else if outcome.known_to_be_allocated {
        OwnershipAfterRealloc::ToBeFreedAfterFailure
    } else {
        OwnershipAfterRealloc::DoNotTrackAfterFailure
    };
    debug!(%from_sym, %to_sym, ?ownership, "realloc pair recorded");

    let reallocated =
        reallocated.set_realloc_pair(to_sym, ReallocPair::new(from_sym, ownership));
    // The reallocated-from symbol must stay alive as long as the new one.
    ctx.symbol_manager().add_symbol_dependency(to_sym, from_sym);
    Some(reallocated)
}
