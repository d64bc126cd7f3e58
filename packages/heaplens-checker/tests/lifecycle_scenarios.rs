//! End-to-end lifecycle scenarios: allocation, deallocation, misuse.

mod common;

use common::Driver;
use heaplens_checker::config::{CheckerConfig, Platform};
use heaplens_checker::engine::{FnDecl, MemSpace, OwnKind, OwnershipAttr, Region, SVal, StmtId};
use heaplens_checker::features::heap_lifecycle::BugKind;

#[test]
fn double_free_is_reported_once() {
    // p = malloc(8); free(p); free(p);
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.free(p.clone());
    d.free(p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::DoubleFree);
    assert_eq!(diagnosed.report.message, "Attempt to free released memory");
}

#[test]
fn use_after_free_on_dereference() {
    // p = malloc(8); free(p); *p = 0;
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.free(p.clone());
    d.deref(&p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::UseAfterFree);
    assert_eq!(diagnosed.report.message, "Use of memory after it is freed");
}

#[test]
fn mismatched_deallocator_for_new_then_free() {
    // p = new int; free(p);
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.new_expr(false, None);
    d.free(p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::MismatchedDeallocator);
    assert_eq!(
        diagnosed.report.message,
        "Memory allocated by 'new' should be deallocated by 'delete', not free()"
    );
}

#[test]
fn delete_of_malloc_memory_is_mismatched() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.delete_expr(false, p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::MismatchedDeallocator);
    assert_eq!(
        diagnosed.report.message,
        "Memory allocated by malloc() should be deallocated by free(), not 'delete'"
    );
}

#[test]
fn offset_free_reports_byte_distance() {
    // p = malloc(8); free(p + 4);
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    let region = p.as_region().unwrap().clone();
    let offset_ptr = SVal::Loc(Region::element(region, Some(4)));
    d.free(offset_ptr);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::OffsetFree);
    assert_eq!(
        diagnosed.report.message,
        "Argument to free() is offset by 4 bytes from the start of memory allocated by malloc()"
    );
}

#[test]
fn use_of_zero_sized_allocation() {
    // p = malloc(0); *p = 0;
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(0);
    d.deref(&p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::UseZeroAllocated);
    assert_eq!(diagnosed.report.message, "Use of zero-allocated memory");
}

#[test]
fn leak_on_symbol_death() {
    // p = malloc(8); return;
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.store_var("p", p);
    d.end_scope(&[]);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::Leak);
    assert_eq!(
        diagnosed.report.message,
        "Potential leak of memory pointed to by 'p'"
    );
    assert!(diagnosed.report.uniqueing_stmt.is_some());
}

#[test]
fn freed_memory_does_not_leak() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.free(p);
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn bad_free_of_local_variable_address() {
    // free(&localVar);
    let mut d = Driver::new(CheckerConfig::default());
    let arg = SVal::Loc(Region::var("localVar", MemSpace::StackLocals, 1));
    d.free(arg);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::BadFree);
    assert_eq!(
        diagnosed.report.message,
        "Argument to free() is the address of the local variable 'localVar', \
         which is not memory allocated by malloc()"
    );
}

#[test]
fn free_of_alloca_memory() {
    // x = alloca(8); free(x);
    let mut d = Driver::new(CheckerConfig::default());
    let x = d.alloc_call("alloca", vec![SVal::ConcreteInt(8)]);
    d.free(x);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::FreeAlloca);
    assert_eq!(
        diagnosed.report.message,
        "Memory allocated by alloca() should not be deallocated"
    );
}

#[test]
fn alloca_does_not_leak_at_scope_exit() {
    let mut d = Driver::new(CheckerConfig::default());
    let _x = d.alloc_call("alloca", vec![SVal::ConcreteInt(8)]);
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn double_delete_through_destructor() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.new_expr(false, None);
    d.delete_expr(false, p.clone());
    d.destructor_call(p, "Widget");

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::DoubleDelete);
    assert_eq!(diagnosed.report.message, "Attempt to delete released memory");
}

#[test]
fn delete_twice_is_double_free() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.new_expr(true, Some(4));
    d.delete_expr(true, p.clone());
    d.delete_expr(true, p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::DoubleFree);
}

#[test]
fn returning_freed_memory_is_use_after_free() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.free(p.clone());
    d.ret(Some(&p));

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::UseAfterFree);
}

#[test]
fn passing_freed_memory_to_call_is_use_after_free() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.free(p.clone());
    d.opaque_call("consume", vec![p], false);

    assert!(d.report_kinds().contains(&BugKind::UseAfterFree));
}

#[test]
fn free_of_function_pointer() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.mark_function_pointer(&p);
    d.free(p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::BadFree);
    assert_eq!(
        diagnosed.report.message,
        "Argument to free() is a function pointer"
    );
}

#[test]
fn allocation_failure_path_is_not_a_leak() {
    // p = malloc(8); if (!p) return;
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    assert!(d.assume_null(&p, true));
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn calloc_zero_initializes() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.alloc_call("calloc", vec![SVal::ConcreteInt(4), SVal::ConcreteInt(8)]);
    let sym = p.as_symbol().unwrap();
    let state = d.state();
    assert_eq!(state.default_init(sym), Some(&SVal::ConcreteInt(0)));
    assert_eq!(state.extent(sym), Some(&SVal::ConcreteInt(32)));
    d.free(p);
    d.assert_clean();
}

#[test]
fn g_malloc0_zero_initializes() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.alloc_call("g_malloc0", vec![SVal::ConcreteInt(16)]);
    let sym = p.as_symbol().unwrap();
    assert_eq!(d.state().default_init(sym), Some(&SVal::ConcreteInt(0)));
    d.free_with_decl(FnDecl::system("g_free"), vec![p]);
    d.assert_clean();
}

#[test]
fn kernel_malloc_with_zero_flag() {
    // malloc(size, type, M_ZERO) on a FreeBSD target.
    let config = CheckerConfig::default().with_platform(Platform::FreeBsd);
    let mut d = Driver::new(config);
    let p = d.alloc_call(
        "malloc",
        vec![SVal::ConcreteInt(32), SVal::Unknown, SVal::ConcreteInt(0x0100)],
    );
    let sym = p.as_symbol().unwrap();
    assert_eq!(d.state().default_init(sym), Some(&SVal::ConcreteInt(0)));
    d.free(p);
    d.assert_clean();
}

#[test]
fn if_nameindex_pairing() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.alloc_call("if_nameindex", vec![]);
    d.free(p);

    // if_nameindex memory must go back through if_freenameindex.
    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::MismatchedDeallocator);
    assert_eq!(
        diagnosed.report.message,
        "Memory allocated by if_nameindex() should be deallocated by 'if_freenameindex()', \
         not free()"
    );
}

#[test]
fn strdup_result_is_tracked() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.alloc_call("strdup", vec![SVal::Unknown]);
    d.store_var("copy", p);
    d.end_scope(&[]);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::Leak);
}

#[test]
fn ownership_returns_attribute_in_optimistic_mode() {
    let config = CheckerConfig::default().with_optimistic(true);
    let mut d = Driver::new(config);
    let decl = FnDecl::named("my_malloc")
        .with_attr(OwnershipAttr::new(OwnKind::Returns, "malloc", vec![0]));
    let p = d.alloc_call_with_decl(decl, vec![SVal::ConcreteInt(8)]);
    d.free(p);
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn ownership_returns_leaks_without_free() {
    let config = CheckerConfig::default().with_optimistic(true);
    let mut d = Driver::new(config);
    let decl = FnDecl::named("my_malloc")
        .with_attr(OwnershipAttr::new(OwnKind::Returns, "malloc", vec![0]));
    let p = d.alloc_call_with_decl(decl, vec![SVal::ConcreteInt(8)]);
    d.store_var("p", p);
    d.end_scope(&[]);

    assert_eq!(d.report_kinds(), vec![BugKind::Leak]);
}

#[test]
fn ownership_holds_then_free_is_non_owned_double_free() {
    let config = CheckerConfig::default().with_optimistic(true);
    let mut d = Driver::new(config);
    let p = d.malloc(8);

    let holder = FnDecl::named("my_hold")
        .with_attr(OwnershipAttr::new(OwnKind::Holds, "malloc", vec![0]));
    d.free_with_decl(holder, vec![p.clone()]);
    d.free(p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::DoubleFree);
    assert_eq!(diagnosed.report.message, "Attempt to free non-owned memory");
}

#[test]
fn malloc_frontend_off_suppresses_double_free() {
    let config = CheckerConfig::modeling_only().with_new_delete(true);
    let mut d = Driver::new(config);
    let p = d.malloc(8);
    d.free(p.clone());
    d.free(p);
    d.assert_clean();
}

#[test]
fn new_delete_leaks_frontend_gates_new_leaks() {
    let config = CheckerConfig::default().with_new_delete_leaks(false);
    let mut d = Driver::new(config);
    let p = d.new_expr(false, None);
    d.store_var("p", p);
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn suspicious_retain_count_context_suppresses_free() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.enter_function(
        "isl_map_free",
        "__isl_null isl_map *isl_map_free(__isl_take isl_map *map)",
    );
    d.free(p.clone());
    d.exit_frame();
    d.end_scope(&[]);

    // The free is not modeled and the argument escapes: no double-free
    // bait, no leak.
    d.assert_clean();
    let sym = p.as_symbol().unwrap();
    assert!(d.state().region_state(sym).is_none());
}

#[test]
fn malloc_report_uniqueing_stmt_is_allocation_site() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.store_var("p", p.clone());

    // Two divergent suffixes leak the same allocation.
    let mut path_a = d.fork();
    path_a.deref(&p);
    path_a.end_scope(&[]);
    let leak_a = path_a.single_report();

    let mut path_b = d.fork();
    path_b.end_scope(&[]);
    let leak_b = path_b.single_report();

    assert_eq!(leak_a.report.kind, BugKind::Leak);
    assert_eq!(leak_b.report.kind, BugKind::Leak);
    let site_a: Option<StmtId> = leak_a.report.uniqueing_stmt;
    assert_eq!(site_a, leak_b.report.uniqueing_stmt);
    assert!(site_a.is_some());
}
