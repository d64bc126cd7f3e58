//! Reallocation scenarios: the four-way path split, failure recovery, and
//! the ownership policies.

mod common;

use common::Driver;
use heaplens_checker::config::CheckerConfig;
use heaplens_checker::engine::SVal;
use heaplens_checker::features::heap_lifecycle::BugKind;

#[test]
fn realloc_failure_path_leaks_the_original_pointer() {
    // p = malloc(8); q = realloc(p, 16); if (!q) { /* leaks p */ }
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    d.store_var("p", p.clone());
    let q = d.realloc(p.clone(), 16);

    let mut failure = d.fork();
    assert!(failure.assume_null(&q, true));
    failure.end_scope(&[]);
    let diagnosed = failure.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::Leak);
    assert_eq!(
        diagnosed.report.message,
        "Potential leak of memory pointed to by 'p'"
    );

    // On the success path p is released; freeing q leaves nothing behind.
    let mut success = d.fork();
    assert!(success.assume_null(&q, false));
    success.free(q);
    success.end_scope(&[]);
    success.assert_clean();
}

#[test]
fn realloc_success_then_free_original_is_double_free() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    let q = d.realloc(p.clone(), 16);
    assert!(d.assume_null(&q, false));
    d.free(p);

    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::DoubleFree);
}

#[test]
fn realloc_of_null_behaves_like_malloc() {
    // p = realloc(0, 8); free(p);
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.realloc(SVal::null(), 8);
    d.free(p);
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn realloc_null_with_zero_size_is_untracked() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.realloc(SVal::null(), 0);
    let sym = p.as_symbol().unwrap();
    assert!(d.state().region_state(sym).is_none());
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn realloc_to_zero_size_frees_and_tags_result() {
    // q = realloc(p, 0): p is freed, q joins the zero-size set.
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    let q = d.realloc(p.clone(), 0);

    let p_sym = p.as_symbol().unwrap();
    assert!(d.state().region_state(p_sym).unwrap().is_released());
    assert!(d.state().contains_zero_realloc_sym(q.as_symbol().unwrap()));

    d.deref(&q);
    let diagnosed = d.single_report();
    assert_eq!(diagnosed.report.kind, BugKind::UseZeroAllocated);
}

#[test]
fn reallocf_failure_keeps_original_released() {
    // q = reallocf(p, 16); failure also frees p: no leak either way.
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    let q = d.reallocf(p.clone(), 16);
    assert!(d.assume_null(&q, true));

    let p_sym = p.as_symbol().unwrap();
    assert!(d.state().region_state(p_sym).unwrap().is_released());
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn realloc_of_untracked_pointer_is_dropped_on_failure() {
    // void grow(int *ptr) { ptr = realloc(ptr, 64); ... }
    let mut d = Driver::new(CheckerConfig::default());
    let unknown = d.alloc_call("strdup", vec![SVal::Unknown]);
    // Simulate a pointer of unknown provenance: untrack it first.
    let sym = unknown.as_symbol().unwrap();
    let scrubbed = d.state().remove_region_state(sym);
    let mut d = d.with_state(scrubbed);

    let q = d.realloc(unknown.clone(), 64);
    assert!(d.assume_null(&q, true));
    assert!(d.state().region_state(sym).is_none());
    d.end_scope(&[]);
    d.assert_clean();
}

#[test]
fn realloc_pair_keeps_source_symbol_alive() {
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    let q = d.realloc(p.clone(), 16);

    // While q lives, p's symbol must not be reaped: otherwise the failure
    // path could never restore it.
    let p_sym = p.as_symbol().unwrap();
    d.end_scope(&[&q]);
    assert!(d.state().region_state(p_sym).is_some());
    d.assert_clean();

    // Once everything dies, the pair table must not mention dead symbols.
    d.free(q);
    d.end_scope(&[]);
    assert_eq!(d.state().realloc_pairs_iter().count(), 0);
    d.assert_clean();
}

#[test]
fn realloc_general_case_uses_unsplit_state() {
    // The free/allocate sequence of the general case starts from the
    // unsplit entry state: the pointer-null fact must not leak into the
    // result, so the failure path can still be assumed later.
    let mut d = Driver::new(CheckerConfig::default());
    let p = d.malloc(8);
    let _q = d.realloc(p.clone(), 16);

    // Had the modeling continued from the pointer-not-null side, "p is
    // null" would now be refuted; the unsplit sequencing keeps both sides
    // of the original pointer feasible.
    let mut p_null = d.fork();
    assert!(p_null.assume_null(&p, true));
    let mut p_not_null = d.fork();
    assert!(p_not_null.assume_null(&p, false));
}
