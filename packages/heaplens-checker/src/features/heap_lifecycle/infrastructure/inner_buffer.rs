//! Inner-buffer entry points
//!
//! Container-modeling checkers own the knowledge of *which* methods
//! invalidate a container's inner buffer; they hand the resulting symbols
//! to the lifecycle machine through this module. The records they create
//! use the `InnerBuffer` family, which routes diagnostics to the
//! inner-pointer front-end and switches the visitor to container wording.

use crate::engine::{ProgramState, Stmt, SymbolId};

use super::super::domain::{AllocationFamily, RefState};

/// Mark a container's inner buffer as released by `origin`
/// (the method call or destructor that invalidated it).
pub fn mark_released(state: &ProgramState, sym: SymbolId, origin: Stmt) -> ProgramState {
    state.set_region_state(
        sym,
        RefState::released(AllocationFamily::InnerBuffer, origin),
    )
}
