//! Escape policy
//!
//! When tracked pointers reach an opaque call, the checker must decide:
//! does the callee possibly free the memory (stop making claims, move to
//! `Escaped`), or is it known to leave ownership with the caller? The
//! rules are ordered pessimism: anything that is not a plain function call
//! or message send may free; messages and library calls are filtered
//! through selector and name heuristics before escaping.

use rustc_hash::FxHashSet;

use crate::engine::{CallEvent, CallKind, MsgCall, ProgramState, SymbolId};

use super::super::domain::RefState;
use super::classifier::AllocClassifier;

/// Message sends that take ownership of the passed buffer, promising to
/// free() it eventually.
pub fn is_known_dealloc_message(msg: &MsgCall) -> bool {
    matches!(
        msg.first_slot(),
        "dataWithBytesNoCopy" | "initWithBytesNoCopy" | "initWithCharactersNoCopy"
    )
}

/// Value of a `freeWhenDone:` argument, if the selector carries one.
pub fn free_when_done_arg(call: &CallEvent, msg: &MsgCall) -> Option<bool> {
    let idx = msg.arg_index_for_slot("freeWhenDone")?;
    Some(!call.arg_sval(idx).is_zero_constant())
}

/// Library functions that wrap the pointer into another object or take
/// ownership outright; always an escape.
const ESCAPING_LIBRARY_FNS: [&str; 5] = [
    "CGBitmapContextCreate",
    "CGBitmapContextCreateWithData",
    "CVPixelBufferCreateWithBytes",
    "CVPixelBufferCreateWithPlanarBytes",
    "OSAtomicEnqueue",
];

/// Whether `call` may free escaped memory, or is modeled explicitly by the
/// checker. Returns `(may_free, escaping_symbol)`; when `escaping_symbol`
/// is set, only that one symbol escapes even though more were invalidated.
pub fn may_free_any_escaped_memory(
    classifier: &AllocClassifier,
    call: &CallEvent,
) -> (bool, Option<SymbolId>) {
    // Anything that is not a plain function call or a message send
    // (C++ methods, blocks, operators) pessimistically may free memory.
    let msg = match &call.kind {
        CallKind::Function(_) => None,
        CallKind::Message(m) => Some(m),
        _ => return (true, None),
    };

    if let Some(msg) = msg {
        // Not a framework call, or takes a callback: may free.
        if !call.is_in_system_header() || call.arguments_may_escape() {
            return (true, None);
        }

        // Methods we model explicitly are handled post-call.
        if is_known_dealloc_message(msg) {
            return (false, None);
        }

        // A freeWhenDone: argument on an unknown method decides escape
        // but cannot be modeled as an explicit free.
        if let Some(fwd) = free_when_done_arg(call, msg) {
            return (fwd, None);
        }

        // "...NoCopy" without freeWhenDone transfers ownership.
        if msg.first_slot().ends_with("NoCopy") {
            return (true, None);
        }

        // Pointer-container methods; the pointers live on in the
        // container.
        let first = msg.first_slot();
        if first.starts_with("addPointer")
            || first.starts_with("insertPointer")
            || first.starts_with("replacePointer")
            || first == "valueWithPointer"
        {
            return (true, None);
        }

        // init consumes its receiver specifically.
        if first.starts_with("init") {
            return (true, msg.receiver.as_symbol());
        }

        // Most framework methods do not free memory.
        return (false, None);
    }

    let Some(decl) = call.decl() else {
        return (true, None);
    };

    // Allocators and deallocators we model explicitly.
    if classifier.is_mem_function(decl) {
        return (false, None);
    }

    // Unknown user code may free anything it sees.
    if !call.is_in_system_header() {
        return (true, None);
    }

    let name = decl.name.as_str();

    // "...NoCopy" functions transfer ownership unless the deallocator
    // argument is the named null allocator.
    if name.ends_with("NoCopy") {
        for i in 1..call.num_args() {
            if let Some(region) = call.arg_sval(i).as_region() {
                if region.var_name() == Some("kCFAllocatorNull") {
                    return (false, None);
                }
            }
        }
        return (true, None);
    }

    // Streams over malloced buffers: the pointer escapes only through a
    // close function.
    if name == "funopen" && call.num_args() > 4 && call.arg_sval(4).is_zero_constant() {
        return (false, None);
    }

    // Buffers handed to setvbuf and friends for the std streams leak by
    // design; treat as escaped rather than warn.
    if matches!(name, "setbuf" | "setbuffer" | "setlinebuf" | "setvbuf")
        && call.num_args() >= 1
    {
        if let Some(region) = call.arg_sval(0).as_region() {
            if region.var_name().is_some_and(|n| n.contains("std")) {
                return (true, None);
            }
        }
    }

    if ESCAPING_LIBRARY_FNS.contains(&name) {
        return (true, None);
    }

    let qualified = decl.qualified_name.as_deref();
    if name == "postEvent" && qualified == Some("QCoreApplication::postEvent") {
        return (true, None);
    }
    if name == "connectImpl" && qualified == Some("QObject::connectImpl") {
        return (true, None);
    }

    // A buffer's address escaping by argument type.
    if call.arguments_may_escape() {
        return (true, None);
    }

    // Most system calls do not free memory.
    (false, None)
}

/// Transition the escaped symbols that are currently live to `Escaped`.
///
/// A const-pointer escape only applies to new-family symbols: `delete`
/// accepts const pointers, `free` does not.
pub fn apply_escape(
    state: ProgramState,
    escaped: &FxHashSet<SymbolId>,
    escaping_symbol: Option<SymbolId>,
    is_const_escape: bool,
) -> ProgramState {
    let mut state = state;
    for &sym in escaped {
        if escaping_symbol.is_some_and(|only| only != sym) {
            continue;
        }
        if let Some(rs) = state.region_state(sym) {
            if rs.is_live() && (!is_const_escape || rs.family().is_cxx_new()) {
                let escaped_rs = RefState::escaped(rs);
                state = state.set_region_state(sym, escaped_rs);
            }
        }
    }
    state
}
