//! Test driver
//!
//! A miniature engine loop for integration scenarios: it builds call
//! events, dispatches checker callbacks in program order (`pre_call` →
//! post modeling → `location` → `dead_symbols`), maintains the
//! predecessor-linked execution graph, and collects reports paired with
//! their error nodes so scenarios can replay the path visitor.

// Each test binary uses a different slice of the driver.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use heaplens_checker::config::CheckerConfig;
use heaplens_checker::engine::{
    AtomicOp, CallEvent, CallKind, CheckerCallbacks, CheckerContext, Condition, ExplodedNode,
    FnDecl, FrameDecl, LocationContext, MemSpace, MsgCall, OpKind, ProgramState, Region, SVal,
    Stmt, StmtId, StmtKind, SymbolManager,
};
use heaplens_checker::features::heap_lifecycle::{BugKind, HeapLifecycleChecker, Report};
use heaplens_checker::features::heap_lifecycle::infrastructure::visitor::{
    run_visitor, PathDiagnostic,
};
use rustc_hash::FxHashSet;

/// One emitted report plus the node it hangs off.
pub struct Diagnosed {
    pub report: Report,
    pub node: ExplodedNode,
}

/// Drives a `HeapLifecycleChecker` along one path.
pub struct Driver {
    pub checker: Rc<HeapLifecycleChecker>,
    symbols: Rc<RefCell<SymbolManager>>,
    node: ExplodedNode,
    lctx: LocationContext,
    next_stmt: Rc<RefCell<u64>>,
    next_frame: Rc<RefCell<u64>>,
    pub diagnosed: Vec<Diagnosed>,
}

impl Driver {
    pub fn new(config: CheckerConfig) -> Self {
        let lctx = LocationContext::top_level().enter(
            1,
            FrameDecl::Function {
                name: "test_fn".to_string(),
                declaration_marker: String::new(),
            },
        );
        Self {
            checker: Rc::new(HeapLifecycleChecker::new(config)),
            symbols: Rc::new(RefCell::new(SymbolManager::new())),
            node: ExplodedNode::root(ProgramState::new(), lctx.clone()),
            lctx,
            next_stmt: Rc::new(RefCell::new(100)),
            next_frame: Rc::new(RefCell::new(10)),
            diagnosed: Vec::new(),
        }
    }

    /// Continue with an explicitly constructed state (fixture surgery).
    pub fn with_state(mut self, state: ProgramState) -> Driver {
        self.node = self.node.successor(state, None, self.lctx.clone());
        self
    }

    /// Fork the path: the new driver shares symbols and the node history,
    /// diverging from the current point.
    pub fn fork(&self) -> Driver {
        Driver {
            checker: Rc::clone(&self.checker),
            symbols: Rc::clone(&self.symbols),
            node: self.node.clone(),
            lctx: self.lctx.clone(),
            next_stmt: Rc::clone(&self.next_stmt),
            next_frame: Rc::clone(&self.next_frame),
            diagnosed: Vec::new(),
        }
    }

    pub fn state(&self) -> ProgramState {
        self.node.state().clone()
    }

    pub fn node(&self) -> &ExplodedNode {
        &self.node
    }

    fn fresh_stmt_id(&self) -> StmtId {
        let mut n = self.next_stmt.borrow_mut();
        *n += 1;
        StmtId(*n)
    }

    fn conjure_loc(&self) -> SVal {
        let (_, val) = self
            .symbols
            .borrow_mut()
            .conjure_heap_symbol(StmtId(0), 0);
        val
    }

    fn conjure_status(&self) -> SVal {
        SVal::Sym(self.symbols.borrow_mut().conjure_symbol())
    }

    fn dispatch<F>(&mut self, stmt: Option<Stmt>, f: F)
    where
        F: FnOnce(&HeapLifecycleChecker, &mut CheckerContext),
    {
        let mut ctx = CheckerContext::new(self.node.clone(), Rc::clone(&self.symbols), 0)
            .with_stmt(stmt.clone());
        f(&self.checker, &mut ctx);

        let error_node = ctx.error_nodes().last().cloned();
        for report in ctx.take_reports() {
            let node = error_node
                .clone()
                .unwrap_or_else(|| self.node.clone());
            self.diagnosed.push(Diagnosed { report, node });
        }
        if let Some((state, pred)) = ctx.take_transition() {
            let pred = pred.unwrap_or_else(|| self.node.clone());
            self.node = pred.successor(state, stmt, self.lctx.clone());
        }
    }

    // ── Frames ────────────────────────────────────────────────────────

    pub fn enter_function(&mut self, name: &str, declaration_marker: &str) {
        let mut n = self.next_frame.borrow_mut();
        *n += 1;
        self.lctx = self.lctx.enter(
            *n,
            FrameDecl::Function {
                name: name.to_string(),
                declaration_marker: declaration_marker.to_string(),
            },
        );
    }

    pub fn enter_destructor(&mut self, class_name: &str) {
        let mut n = self.next_frame.borrow_mut();
        *n += 1;
        self.lctx = self.lctx.enter(
            *n,
            FrameDecl::Destructor {
                class_name: class_name.to_string(),
            },
        );
    }

    pub fn exit_frame(&mut self) {
        if let Some(parent) = self.lctx.parent().cloned() {
            self.lctx = parent;
        }
    }

    // ── Calls ─────────────────────────────────────────────────────────

    fn function_call(&self, decl: FnDecl, args: Vec<SVal>, ret: SVal) -> CallEvent {
        let stmt = match decl.operator {
            Some(op) => Stmt::operator_call(self.fresh_stmt_id(), op),
            None => Stmt::call(self.fresh_stmt_id(), decl.name.clone()),
        };
        CallEvent {
            in_system_header: decl.in_system_header,
            kind: CallKind::Function(decl),
            stmt,
            args,
            ret,
            args_may_escape: false,
        }
    }

    fn run_call(&mut self, call: CallEvent) {
        let stmt = call.stmt.clone();
        self.dispatch(Some(stmt.clone()), |checker, ctx| {
            checker.check_pre_call(&call, ctx);
        });
        self.dispatch(Some(stmt), |checker, ctx| {
            checker.check_post_call(&call, ctx);
        });
    }

    /// An allocator-shaped call returning a fresh conjured pointer.
    pub fn alloc_call(&mut self, name: &str, args: Vec<SVal>) -> SVal {
        self.alloc_call_with_decl(FnDecl::system(name), args)
    }

    pub fn alloc_call_with_decl(&mut self, decl: FnDecl, args: Vec<SVal>) -> SVal {
        let ret = self.conjure_loc();
        let call = self.function_call(decl, args, ret.clone());
        self.run_call(call);
        ret
    }

    /// An untracked symbolic pointer (e.g. an object reference the
    /// checker has no model for).
    pub fn fresh_ptr(&self) -> SVal {
        self.conjure_loc()
    }

    /// Declare that the pointee of `val` has function-pointer type.
    pub fn mark_function_pointer(&self, val: &SVal) {
        if let Some(sym) = val.as_symbol() {
            self.symbols.borrow_mut().mark_function_pointer(sym);
        }
    }

    pub fn malloc(&mut self, size: i64) -> SVal {
        self.alloc_call("malloc", vec![SVal::ConcreteInt(size)])
    }

    pub fn free(&mut self, ptr: SVal) {
        let call = self.function_call(FnDecl::system("free"), vec![ptr], SVal::Unknown);
        self.run_call(call);
    }

    pub fn free_with_decl(&mut self, decl: FnDecl, args: Vec<SVal>) {
        let call = self.function_call(decl, args, SVal::Unknown);
        self.run_call(call);
    }

    pub fn realloc(&mut self, ptr: SVal, size: i64) -> SVal {
        let ret = self.conjure_loc();
        let call = self.function_call(
            FnDecl::system("realloc"),
            vec![ptr, SVal::ConcreteInt(size)],
            ret.clone(),
        );
        self.run_call(call);
        ret
    }

    pub fn reallocf(&mut self, ptr: SVal, size: i64) -> SVal {
        let ret = self.conjure_loc();
        let call = self.function_call(
            FnDecl::system("reallocf"),
            vec![ptr, SVal::ConcreteInt(size)],
            ret.clone(),
        );
        self.run_call(call);
        ret
    }

    /// A call the checker has no model for; the engine then invalidates
    /// the pointer arguments and asks the escape policy about them.
    pub fn opaque_call(&mut self, name: &str, args: Vec<SVal>, in_system_header: bool) {
        let mut decl = FnDecl::named(name);
        decl.in_system_header = in_system_header;
        let mut call = self.function_call(decl, args, SVal::Unknown);
        call.in_system_header = in_system_header;

        let stmt = call.stmt.clone();
        self.dispatch(Some(stmt.clone()), |checker, ctx| {
            checker.check_pre_call(&call, ctx);
        });

        let escaped: FxHashSet<_> = call
            .args
            .iter()
            .filter_map(|a| a.as_symbol())
            .collect();
        let state = self.checker.check_pointer_escape(
            self.state(),
            &escaped,
            Some(&call),
            heaplens_checker::engine::EscapeKind::DirectEscapeOnCall,
        );
        self.node = self.node.successor(state, Some(stmt), self.lctx.clone());
    }

    /// `new` / `new[]` expression.
    pub fn new_expr(&mut self, array: bool, element_count: Option<i64>) -> SVal {
        let ret = self.conjure_loc();
        let op = if array { OpKind::ArrayNew } else { OpKind::New };
        let operator_decl = FnDecl::system(format!("operator {}", op.spelling()))
            .with_operator(op);
        let stmt = Stmt::new(self.fresh_stmt_id(), StmtKind::New { array });
        let call = CallEvent {
            kind: CallKind::New {
                array,
                operator_decl,
                element_count: element_count.map(SVal::ConcreteInt),
                element_size_bytes: 4,
                nontrivial_ctor_with_record_ptr_arg: false,
                consumed: true,
            },
            stmt: stmt.clone(),
            args: vec![],
            ret: ret.clone(),
            in_system_header: false,
            args_may_escape: false,
        };
        self.dispatch(Some(stmt), |checker, ctx| {
            checker.check_post_new(&call, ctx);
        });
        ret
    }

    /// `delete` / `delete[]` expression.
    pub fn delete_expr(&mut self, array: bool, ptr: SVal) {
        let op = if array {
            OpKind::ArrayDelete
        } else {
            OpKind::Delete
        };
        let operator_decl = FnDecl::system(format!("operator {}", op.spelling()))
            .with_operator(op);
        let stmt = Stmt::new(self.fresh_stmt_id(), StmtKind::Delete { array });
        let call = CallEvent {
            kind: CallKind::Delete {
                array,
                operator_decl,
            },
            stmt: stmt.clone(),
            args: vec![ptr],
            ret: SVal::Unknown,
            in_system_header: false,
            args_may_escape: false,
        };
        self.dispatch(Some(stmt), |checker, ctx| {
            checker.check_pre_delete(&call, ctx);
        });
    }

    /// A destructor invocation through a pointer.
    pub fn destructor_call(&mut self, this: SVal, class_name: &str) {
        let decl = FnDecl::named(format!("~{}", class_name))
            .with_qualified_name(format!("{}::~{}", class_name, class_name));
        let stmt = Stmt::call(self.fresh_stmt_id(), decl.name.clone());
        let call = CallEvent {
            kind: CallKind::Method {
                decl,
                this: this.clone(),
                is_destructor: true,
            },
            stmt: stmt.clone(),
            args: vec![],
            ret: SVal::Unknown,
            in_system_header: false,
            args_may_escape: false,
        };
        self.dispatch(Some(stmt), |checker, ctx| {
            checker.check_pre_call(&call, ctx);
        });
    }

    /// `[receiver initWithBytesNoCopy:bytes length:n freeWhenDone:flag]`
    pub fn msg_init_with_bytes_no_copy(
        &mut self,
        receiver: SVal,
        bytes: SVal,
        free_when_done: i64,
    ) {
        let selector = vec![
            "initWithBytesNoCopy".to_string(),
            "length".to_string(),
            "freeWhenDone".to_string(),
        ];
        let stmt = Stmt::new(
            self.fresh_stmt_id(),
            StmtKind::Message {
                selector: selector.clone(),
                instance: true,
            },
        );
        let ret = self.conjure_status();
        let call = CallEvent {
            kind: CallKind::Message(MsgCall {
                selector,
                receiver,
                is_instance: true,
            }),
            stmt: stmt.clone(),
            args: vec![
                bytes,
                SVal::ConcreteInt(8),
                SVal::ConcreteInt(free_when_done),
            ],
            ret,
            in_system_header: true,
            args_may_escape: false,
        };
        self.dispatch(Some(stmt), |checker, ctx| {
            checker.check_post_message(&call, ctx);
        });
    }

    /// A block literal capturing the given variables.
    pub fn block_capture(&mut self, vars: &[&str]) {
        let captured: Vec<Region> = vars
            .iter()
            .map(|name| Region::var(*name, MemSpace::StackLocals, self.lctx.frame_id()))
            .collect();
        let stmt = Stmt::new(self.fresh_stmt_id(), StmtKind::Block);
        let call = CallEvent {
            kind: CallKind::Block {
                captured_regions: captured,
            },
            stmt: stmt.clone(),
            args: vec![],
            ret: SVal::Unknown,
            in_system_header: false,
            args_may_escape: false,
        };
        self.dispatch(Some(stmt), |checker, ctx| {
            checker.check_post_block(&call, ctx);
        });
    }

    // ── Non-call steps ────────────────────────────────────────────────

    /// `name = val;`
    pub fn store_var(&mut self, name: &str, val: SVal) {
        let region = Region::var(name, MemSpace::StackLocals, self.lctx.frame_id());
        let state = self.state().bind_var(name, val);
        self.node = self
            .node
            .successor_with_store(state, None, self.lctx.clone(), region);
    }

    /// `*val` (or a store through it).
    pub fn deref(&mut self, val: &SVal) {
        let stmt = Stmt::new(self.fresh_stmt_id(), StmtKind::Deref);
        let loc = val.clone();
        self.dispatch(Some(stmt.clone()), |checker, ctx| {
            checker.check_location(&loc, true, &stmt, ctx);
        });
    }

    /// Narrow the path by `val == null` being `holds`; returns false when
    /// the constraints refute that side. The node carries the branch
    /// condition as its statement, the way a real engine's assume points
    /// do.
    pub fn assume_null(&mut self, val: &SVal, holds: bool) -> bool {
        let cond = Condition::IsNull(val.clone());
        let (null_state, not_null_state) = self.state().assume(&cond);
        let side = if holds { null_state } else { not_null_state };
        let Some(side) = side else {
            return false;
        };
        let state = self.checker.eval_assume(side, &cond, holds);
        let stmt = Stmt::new(self.fresh_stmt_id(), StmtKind::Other);
        self.node = self
            .node
            .successor(state, Some(stmt), self.lctx.clone());
        true
    }

    /// An atomic read-modify-write step (no checker callback; feeds the
    /// path visitor).
    pub fn step_atomic(&mut self, op: AtomicOp) {
        let stmt = Stmt::new(self.fresh_stmt_id(), StmtKind::AtomicRmw { op });
        self.node = self
            .node
            .successor(self.state(), Some(stmt), self.lctx.clone());
    }

    /// `return val;`
    pub fn ret(&mut self, val: Option<&SVal>) {
        let stmt = Stmt::new(self.fresh_stmt_id(), StmtKind::Return);
        let val = val.cloned();
        self.dispatch(Some(stmt.clone()), |checker, ctx| {
            checker.check_pre_return(val.as_ref(), &stmt, ctx);
        });
    }

    /// Scope exit: every tracked symbol not named in `live` dies.
    pub fn end_scope(&mut self, live: &[&SVal]) {
        let roots: Vec<_> = live.iter().filter_map(|v| v.as_symbol()).collect();
        let reaper = self.symbols.borrow().reap(&roots);
        self.dispatch(None, |checker, ctx| {
            checker.check_dead_symbols(&reaper, ctx);
        });
    }

    // ── Results ───────────────────────────────────────────────────────

    pub fn report_kinds(&self) -> Vec<BugKind> {
        self.diagnosed.iter().map(|d| d.report.kind).collect()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.diagnosed
            .iter()
            .map(|d| d.report.message.as_str())
            .collect()
    }

    pub fn single_report(&self) -> &Diagnosed {
        assert_eq!(
            self.diagnosed.len(),
            1,
            "expected exactly one report, got {:?}",
            self.report_kinds()
        );
        &self.diagnosed[0]
    }

    pub fn assert_clean(&self) {
        assert!(
            self.diagnosed.is_empty(),
            "expected no reports, got {:?}",
            self.messages()
        );
    }

    pub fn visit_path(&self, diagnosed: &Diagnosed) -> PathDiagnostic {
        run_visitor(&diagnosed.report, &diagnosed.node)
    }
}
