//! Execution-graph nodes
//!
//! An [`ExplodedNode`] is one point of a path: a program state plus the
//! program point that produced it, linked to its predecessor. Bug-report
//! visitors replay a path by walking the predecessor chain from the error
//! node back to the root.

use std::fmt;
use std::rc::Rc;

use super::region::Region;
use super::state::ProgramState;
use super::stmt::Stmt;

/// The declaration a stack frame belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDecl {
    TopLevel,
    Function {
        name: String,
        /// Opaque text of the declaration head, for source-marker
        /// heuristics (retain-count API suppression).
        declaration_marker: String,
    },
    Destructor {
        class_name: String,
    },
}

#[derive(Debug)]
struct LcData {
    id: u64,
    decl: FrameDecl,
    parent: Option<LocationContext>,
}

/// A stack-frame context; cheap to clone, compared by frame identity.
#[derive(Debug, Clone)]
pub struct LocationContext {
    inner: Rc<LcData>,
}

impl LocationContext {
    pub fn top_level() -> Self {
        Self {
            inner: Rc::new(LcData {
                id: 0,
                decl: FrameDecl::TopLevel,
                parent: None,
            }),
        }
    }

    pub fn enter(&self, id: u64, decl: FrameDecl) -> Self {
        Self {
            inner: Rc::new(LcData {
                id,
                decl,
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.inner.id
    }

    pub fn decl(&self) -> &FrameDecl {
        &self.inner.decl
    }

    pub fn parent(&self) -> Option<&LocationContext> {
        self.inner.parent.as_ref()
    }

    /// Whether `self` is an ancestor frame of `other`.
    pub fn is_parent_of(&self, other: &LocationContext) -> bool {
        let mut cur = other.parent();
        while let Some(lc) = cur {
            if lc.same_frame(self) {
                return true;
            }
            cur = lc.parent();
        }
        false
    }

    pub fn same_frame(&self, other: &LocationContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) || self.inner.id == other.inner.id
    }

    /// Iterate this frame and its ancestors, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = LocationContext> {
        std::iter::successors(Some(self.clone()), |lc| lc.parent().cloned())
    }
}

impl PartialEq for LocationContext {
    fn eq(&self, other: &Self) -> bool {
        self.same_frame(other)
    }
}

#[derive(Debug)]
struct NodeData {
    state: ProgramState,
    stmt: Option<Stmt>,
    lctx: LocationContext,
    pred: Option<ExplodedNode>,
    /// Set when this node is the post-state of a store; names the target
    /// region (used to find the variable a leaked symbol was bound to).
    store_target: Option<Region>,
    /// Post-point of an implicit (compiler-synthesized) call, e.g. an
    /// automatic destructor.
    implicit_call: bool,
}

/// One node of the execution graph.
#[derive(Debug, Clone)]
pub struct ExplodedNode {
    inner: Rc<NodeData>,
}

impl ExplodedNode {
    pub fn root(state: ProgramState, lctx: LocationContext) -> Self {
        Self {
            inner: Rc::new(NodeData {
                state,
                stmt: None,
                lctx,
                pred: None,
                store_target: None,
                implicit_call: false,
            }),
        }
    }

    pub fn successor(
        &self,
        state: ProgramState,
        stmt: Option<Stmt>,
        lctx: LocationContext,
    ) -> Self {
        Self {
            inner: Rc::new(NodeData {
                state,
                stmt,
                lctx,
                pred: Some(self.clone()),
                store_target: None,
                implicit_call: false,
            }),
        }
    }

    pub fn successor_with_store(
        &self,
        state: ProgramState,
        stmt: Option<Stmt>,
        lctx: LocationContext,
        store_target: Region,
    ) -> Self {
        Self {
            inner: Rc::new(NodeData {
                state,
                stmt,
                lctx,
                pred: Some(self.clone()),
                store_target: Some(store_target),
                implicit_call: false,
            }),
        }
    }

    pub fn implicit_call_successor(
        &self,
        state: ProgramState,
        lctx: LocationContext,
    ) -> Self {
        Self {
            inner: Rc::new(NodeData {
                state,
                stmt: None,
                lctx,
                pred: Some(self.clone()),
                store_target: None,
                implicit_call: true,
            }),
        }
    }

    pub fn state(&self) -> &ProgramState {
        &self.inner.state
    }

    pub fn stmt_for_diagnostics(&self) -> Option<&Stmt> {
        self.inner.stmt.as_ref()
    }

    pub fn location_context(&self) -> &LocationContext {
        &self.inner.lctx
    }

    pub fn first_pred(&self) -> Option<&ExplodedNode> {
        self.inner.pred.as_ref()
    }

    pub fn store_target(&self) -> Option<&Region> {
        self.inner.store_target.as_ref()
    }

    pub fn is_implicit_call(&self) -> bool {
        self.inner.implicit_call
    }

    /// Walk from this node towards the root, self included.
    pub fn path_to_root(&self) -> impl Iterator<Item = ExplodedNode> {
        std::iter::successors(Some(self.clone()), |n| n.first_pred().cloned())
    }
}

impl fmt::Display for ExplodedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.stmt {
            Some(s) => write!(f, "node@{}", s),
            None => write!(f, "node@<entry>"),
        }
    }
}
