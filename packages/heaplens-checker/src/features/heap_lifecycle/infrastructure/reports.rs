//! Report construction
//!
//! One function per bug kind. Every function checks the responsible
//! diagnostic front-end before generating an error node, so disabled
//! front-ends cost nothing and leave no sink in the graph.

use crate::config::CheckerConfig;
use crate::engine::{CheckerContext, ProgramState, SVal, Stmt, SymbolId};

use super::super::domain::{
    check_if_tracked, AllocationFamily, BugKind, CheckKind, Report,
};

/// Front-end routing for a tracked symbol (zero-size realloc results are
/// malloc-family by construction).
pub fn check_for_symbol(
    state: &ProgramState,
    sym: SymbolId,
    is_leak_check: bool,
    config: &CheckerConfig,
) -> Option<CheckKind> {
    if state.contains_zero_realloc_sym(sym) {
        return config.malloc_enabled().then_some(CheckKind::Malloc);
    }
    let rs = state.region_state(sym)?;
    check_if_tracked(rs.family(), is_leak_check, config)
}

fn summarize_arg(arg_val: &SVal) -> Option<String> {
    match arg_val {
        SVal::ConcreteInt(addr) => Some(format!("a constant address ({})", addr)),
        SVal::Loc(region) => region.summarize(),
        _ => None,
    }
}

fn dealloc_name(stmt: &Stmt) -> String {
    stmt.alloc_dealloc_name()
        .unwrap_or_else(|| "deallocator".to_string())
}

/// "Argument to free() is …, which is not memory allocated by malloc()"
pub fn report_bad_free(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    family: Option<AllocationFamily>,
    arg_val: &SVal,
    dealloc_stmt: &Stmt,
) {
    if !config.malloc_enabled() && !config.new_delete_enabled() {
        return;
    }
    let family = family.unwrap_or(AllocationFamily::Malloc);
    let Some(check) = check_if_tracked(family, false, config) else {
        return;
    };
    if ctx.generate_error_node().is_none() {
        return;
    }

    let mut msg = format!("Argument to {} is ", dealloc_name(dealloc_stmt));
    match summarize_arg(arg_val) {
        Some(summary) => {
            msg.push_str(&summary);
            msg.push_str(", which is not memory allocated by ");
        }
        None => msg.push_str("not memory allocated by "),
    }
    msg.push_str(family.expected_alloc_name());

    ctx.emit_report(Report::new(BugKind::BadFree, check, msg));
}

/// "Argument to free() is a function pointer"
pub fn report_function_pointer_free(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    family: Option<AllocationFamily>,
    dealloc_stmt: &Stmt,
) {
    if !config.malloc_enabled() {
        return;
    }
    let Some(check) = check_if_tracked(family.unwrap_or(AllocationFamily::Malloc), false, config)
    else {
        return;
    };
    if ctx.generate_error_node().is_none() {
        return;
    }
    let msg = format!(
        "Argument to {} is a function pointer",
        dealloc_name(dealloc_stmt)
    );
    ctx.emit_report(Report::new(BugKind::BadFree, check, msg));
}

/// "Memory allocated by alloca() should not be deallocated"
pub fn report_free_alloca(ctx: &mut CheckerContext, config: &CheckerConfig) {
    let check = if config.malloc_enabled() {
        CheckKind::Malloc
    } else if config.mismatched_deallocator_enabled() {
        CheckKind::MismatchedDeallocator
    } else {
        return;
    };
    if ctx.generate_error_node().is_none() {
        return;
    }
    ctx.emit_report(Report::new(
        BugKind::FreeAlloca,
        check,
        "Memory allocated by alloca() should not be deallocated",
    ));
}

/// "Memory allocated by malloc() should be deallocated by free(), not 'delete'"
pub fn report_mismatched_dealloc(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    alloc_stmt: &Stmt,
    alloc_family: AllocationFamily,
    dealloc_stmt: &Stmt,
    sym: SymbolId,
    ownership_transferred: bool,
) {
    if !config.mismatched_deallocator_enabled() {
        return;
    }
    if ctx.generate_error_node().is_none() {
        return;
    }

    let alloc_name = alloc_stmt.alloc_dealloc_name();
    let msg = if ownership_transferred {
        let mut msg = match dealloc_stmt.alloc_dealloc_name() {
            Some(name) => format!("{} cannot", name),
            None => "Cannot".to_string(),
        };
        msg.push_str(" take ownership of memory");
        if let Some(alloc_name) = alloc_name {
            msg.push_str(&format!(" allocated by {}", alloc_name));
        }
        msg
    } else {
        let mut msg = "Memory".to_string();
        if let Some(alloc_name) = alloc_name {
            msg.push_str(&format!(" allocated by {}", alloc_name));
        }
        msg.push_str(&format!(
            " should be deallocated by {}",
            alloc_family.expected_dealloc_name()
        ));
        msg.push_str(&format!(", not {}", dealloc_name(dealloc_stmt)));
        msg
    };

    ctx.emit_report(
        Report::new(BugKind::MismatchedDeallocator, CheckKind::MismatchedDeallocator, msg)
            .with_symbol(sym),
    );
}

/// "Argument to free() is offset by N bytes from the start of memory
/// allocated by malloc()"
pub fn report_offset_free(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    family: AllocationFamily,
    offset_bytes: i64,
    dealloc_stmt: &Stmt,
    alloc_stmt: Option<&Stmt>,
) {
    if !config.malloc_enabled() && !config.new_delete_enabled() {
        return;
    }
    let Some(check) = check_if_tracked(family, false, config) else {
        return;
    };
    if ctx.generate_error_node().is_none() {
        return;
    }

    let unit = if offset_bytes.abs() > 1 { "bytes" } else { "byte" };
    let mut msg = format!(
        "Argument to {} is offset by {} {} from the start of ",
        dealloc_name(dealloc_stmt),
        offset_bytes,
        unit
    );
    match alloc_stmt.and_then(|s| s.alloc_dealloc_name()) {
        Some(name) => msg.push_str(&format!("memory allocated by {}", name)),
        None => msg.push_str("allocated memory"),
    }

    ctx.emit_report(Report::new(BugKind::OffsetFree, check, msg));
}

/// "Use of memory after it is freed"
pub fn report_use_after_free(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    state: &ProgramState,
    sym: SymbolId,
) {
    if !config.malloc_enabled() && !config.new_delete_enabled() && !config.inner_pointer_enabled()
    {
        return;
    }
    let Some(check) = check_for_symbol(state, sym, false, config) else {
        return;
    };
    if ctx.generate_error_node().is_none() {
        return;
    }

    let family = state.region_state(sym).map(|rs| rs.family());
    let msg = if family == Some(AllocationFamily::InnerBuffer) {
        "Inner pointer of container used after re/deallocation"
    } else {
        "Use of memory after it is freed"
    };
    ctx.emit_report(Report::new(BugKind::UseAfterFree, check, msg).with_symbol(sym));
}

/// "Attempt to free released memory" / "Attempt to free non-owned memory"
pub fn report_double_free(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    state: &ProgramState,
    released: bool,
    sym: SymbolId,
    prev_ret_status: Option<SymbolId>,
) {
    if !config.malloc_enabled() && !config.new_delete_enabled() {
        return;
    }
    let Some(check) = check_for_symbol(state, sym, false, config) else {
        return;
    };
    if ctx.generate_error_node().is_none() {
        return;
    }

    let msg = if released {
        "Attempt to free released memory"
    } else {
        "Attempt to free non-owned memory"
    };
    let mut report = Report::new(BugKind::DoubleFree, check, msg).with_symbol(sym);
    if let Some(prev) = prev_ret_status {
        report = report.with_also_interesting(prev);
    }
    ctx.emit_report(report);
}

/// "Attempt to delete released memory"
pub fn report_double_delete(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    state: &ProgramState,
    sym: SymbolId,
) {
    if !config.new_delete_enabled() {
        return;
    }
    if check_for_symbol(state, sym, false, config).is_none() {
        return;
    }
    if ctx.generate_error_node().is_none() {
        return;
    }
    ctx.emit_report(
        Report::new(
            BugKind::DoubleDelete,
            CheckKind::NewDelete,
            "Attempt to delete released memory",
        )
        .with_symbol(sym),
    );
}

/// "Use of zero-allocated memory"
pub fn report_use_zero_allocated(
    ctx: &mut CheckerContext,
    config: &CheckerConfig,
    state: &ProgramState,
    sym: SymbolId,
) {
    if !config.malloc_enabled() && !config.new_delete_enabled() {
        return;
    }
    let Some(check) = check_for_symbol(state, sym, false, config) else {
        return;
    };
    if ctx.generate_error_node().is_none() {
        return;
    }
    ctx.emit_report(
        Report::new(BugKind::UseZeroAllocated, check, "Use of zero-allocated memory")
            .with_symbol(sym),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        ExplodedNode, LocationContext, MemSpace, Region, StmtId, SymbolManager,
    };
    use crate::features::heap_lifecycle::domain::RefState;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ctx_over(state: ProgramState) -> CheckerContext {
        let node = ExplodedNode::root(state, LocationContext::top_level());
        CheckerContext::new(node, Rc::new(RefCell::new(SymbolManager::new())), 0)
    }

    #[test]
    fn test_bad_free_message_with_local_variable() {
        let mut ctx = ctx_over(ProgramState::new());
        let config = CheckerConfig::default();
        let arg = SVal::Loc(Region::var("buf", MemSpace::StackLocals, 0));
        let stmt = Stmt::call(StmtId(9), "free");
        report_bad_free(&mut ctx, &config, Some(AllocationFamily::Malloc), &arg, &stmt);
        let reports = ctx.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].message,
            "Argument to free() is the address of the local variable 'buf', \
             which is not memory allocated by malloc()"
        );
    }

    #[test]
    fn test_double_free_gated_by_frontend() {
        let sym = crate::engine::SymbolId(1);
        let state = ProgramState::new().set_region_state(
            sym,
            RefState::released(AllocationFamily::Malloc, Stmt::call(StmtId(1), "free")),
        );
        let config = CheckerConfig::modeling_only().with_new_delete(true);
        let mut ctx = ctx_over(state.clone());
        report_double_free(&mut ctx, &config, &state, true, sym, None);
        // Malloc-family double free with only the new/delete front-end on:
        // nothing may be emitted.
        assert!(ctx.take_reports().is_empty());
    }

    #[test]
    fn test_offset_free_singular_byte() {
        let mut ctx = ctx_over(ProgramState::new());
        let config = CheckerConfig::default();
        let dealloc = Stmt::call(StmtId(2), "free");
        let alloc = Stmt::call(StmtId(1), "malloc");
        report_offset_free(
            &mut ctx,
            &config,
            AllocationFamily::Malloc,
            1,
            &dealloc,
            Some(&alloc),
        );
        let reports = ctx.take_reports();
        assert_eq!(
            reports[0].message,
            "Argument to free() is offset by 1 byte from the start of memory allocated by malloc()"
        );
    }
}
