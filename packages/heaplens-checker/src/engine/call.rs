//! Call events
//!
//! The engine presents every call shape through one tagged variant so the
//! classifier can pattern-match: plain function calls, instance/destructor
//! calls, new/delete expressions, message sends and block invocations.

use serde::{Deserialize, Serialize};

use super::region::Region;
use super::stmt::{OpKind, Stmt};
use super::sval::SVal;

/// Kind of an ownership annotation on a user-defined function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnKind {
    /// `ownership_returns`: the function returns heap memory it allocated.
    Returns,
    /// `ownership_takes`: the function frees the annotated argument.
    Takes,
    /// `ownership_holds`: the function takes responsibility for the
    /// annotated argument without necessarily freeing it.
    Holds,
}

/// An ownership annotation. The `module` string names the resource class;
/// only `"malloc"` participates in classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipAttr {
    pub kind: OwnKind,
    pub module: String,
    /// Argument indices the annotation applies to. For `Returns` an
    /// optional single index naming the size argument.
    pub arg_indices: Vec<usize>,
}

impl OwnershipAttr {
    pub fn new(kind: OwnKind, module: impl Into<String>, arg_indices: Vec<usize>) -> Self {
        Self {
            kind,
            module: module.into(),
            arg_indices,
        }
    }

    pub fn malloc(kind: OwnKind, arg_indices: Vec<usize>) -> Self {
        Self::new(kind, "malloc", arg_indices)
    }
}

/// Declaration facts about a called function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: String,
    /// Fully qualified name, when the call names a method
    /// (`"QObject::connectImpl"`).
    pub qualified_name: Option<String>,
    /// Set for direct calls to the overloaded allocation operators.
    pub operator: Option<OpKind>,
    /// Whether the *definition site* of the declaration is in a system
    /// header. Decides "standard" new/delete.
    pub in_system_header: bool,
    /// Whether the declared return type is pointer-like.
    pub returns_pointer: bool,
    pub attrs: Vec<OwnershipAttr>,
}

impl FnDecl {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualified_name: None,
            operator: None,
            in_system_header: false,
            returns_pointer: true,
            attrs: Vec::new(),
        }
    }

    /// A libc-style function declared in a system header.
    pub fn system(name: impl Into<String>) -> Self {
        let mut d = Self::named(name);
        d.in_system_header = true;
        d
    }

    pub fn with_operator(mut self, op: OpKind) -> Self {
        self.operator = Some(op);
        self
    }

    pub fn with_qualified_name(mut self, qn: impl Into<String>) -> Self {
        self.qualified_name = Some(qn.into());
        self
    }

    pub fn with_attr(mut self, attr: OwnershipAttr) -> Self {
        self.attrs.push(attr);
        self
    }

    pub fn with_returns_pointer(mut self, yes: bool) -> Self {
        self.returns_pointer = yes;
        self
    }

    pub fn ownership_attrs(&self) -> impl Iterator<Item = &OwnershipAttr> {
        self.attrs.iter()
    }
}

/// A message send (Objective-C style).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCall {
    /// Selector slots; slot 0 names the method, later slots name keyword
    /// arguments (`["initWithBytesNoCopy", "length", "freeWhenDone"]`).
    pub selector: Vec<String>,
    pub receiver: SVal,
    pub is_instance: bool,
}

impl MsgCall {
    pub fn first_slot(&self) -> &str {
        self.selector.first().map(String::as_str).unwrap_or("")
    }

    /// Index of the argument whose selector slot has the given name.
    /// Slot `i` (for `i >= 1`) names argument `i`.
    pub fn arg_index_for_slot(&self, name: &str) -> Option<usize> {
        self.selector
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.as_str() == name)
            .map(|(i, _)| i)
    }
}

/// The shape of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    /// A simple function call.
    Function(FnDecl),
    /// An instance method call; carries the receiver value.
    Method {
        decl: FnDecl,
        this: SVal,
        is_destructor: bool,
    },
    /// A new-expression (as opposed to a direct `operator new` call).
    New {
        array: bool,
        /// Declaration of the selected `operator new`.
        operator_decl: FnDecl,
        /// Element count for array new, if the engine evaluated it.
        element_count: Option<SVal>,
        /// Size of the allocated element type in bytes.
        element_size_bytes: u64,
        /// Whether the initializer is a non-trivial constructor taking a
        /// pointer/reference-to-record argument (escape hatch).
        nontrivial_ctor_with_record_ptr_arg: bool,
        /// Whether the new-expression's value is consumed by its parent.
        consumed: bool,
    },
    /// A delete-expression.
    Delete { array: bool, operator_decl: FnDecl },
    /// A message send.
    Message(MsgCall),
    /// A block invocation or other indirect call.
    Block { captured_regions: Vec<Region> },
}

/// One call observed by the engine, in any shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    pub kind: CallKind,
    /// The statement of the whole call; becomes the origin statement of
    /// lifecycle records created by it.
    pub stmt: Stmt,
    pub args: Vec<SVal>,
    /// Value of the call expression itself on this path.
    pub ret: SVal,
    /// Whether the *call site* resolves into a system header.
    pub in_system_header: bool,
    /// Engine-computed: some argument lets the pointer escape by type
    /// (void-pointer sinks, callback records).
    pub args_may_escape: bool,
}

impl CallEvent {
    pub fn arg_sval(&self, i: usize) -> SVal {
        self.args.get(i).cloned().unwrap_or(SVal::Unknown)
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    pub fn ret_sval(&self) -> &SVal {
        &self.ret
    }

    pub fn is_in_system_header(&self) -> bool {
        self.in_system_header
    }

    pub fn arguments_may_escape(&self) -> bool {
        self.args_may_escape
    }

    /// The function declaration, for shapes that have one.
    pub fn decl(&self) -> Option<&FnDecl> {
        match &self.kind {
            CallKind::Function(d) => Some(d),
            CallKind::Method { decl, .. } => Some(decl),
            CallKind::New { operator_decl, .. } => Some(operator_decl),
            CallKind::Delete { operator_decl, .. } => Some(operator_decl),
            CallKind::Message(_) | CallKind::Block { .. } => None,
        }
    }

    pub fn as_message(&self) -> Option<&MsgCall> {
        match &self.kind {
            CallKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_simple_function(&self) -> bool {
        matches!(self.kind, CallKind::Function(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stmt::StmtId;

    #[test]
    fn test_msg_arg_index_for_slot() {
        let msg = MsgCall {
            selector: vec![
                "initWithBytesNoCopy".into(),
                "length".into(),
                "freeWhenDone".into(),
            ],
            receiver: SVal::Unknown,
            is_instance: true,
        };
        assert_eq!(msg.arg_index_for_slot("freeWhenDone"), Some(2));
        assert_eq!(msg.arg_index_for_slot("length"), Some(1));
        assert_eq!(msg.arg_index_for_slot("missing"), None);
    }

    #[test]
    fn test_arg_sval_out_of_range_is_unknown() {
        let call = CallEvent {
            kind: CallKind::Function(FnDecl::system("free")),
            stmt: Stmt::call(StmtId(1), "free"),
            args: vec![],
            ret: SVal::Unknown,
            in_system_header: true,
            args_may_escape: false,
        };
        assert_eq!(call.arg_sval(3), SVal::Unknown);
    }
}
