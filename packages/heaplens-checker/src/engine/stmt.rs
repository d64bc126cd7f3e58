//! Statement descriptors
//!
//! The checker never inspects syntax trees; the engine hands it small
//! statement descriptors. They serve two purposes: identity (a lifecycle
//! record remembers the statement that caused its most recent state entry)
//! and diagnostics (reports print the callee the statement names).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a statement in the analyzed program.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StmtId(pub u64);

/// Overloaded allocation/deallocation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    New,
    ArrayNew,
    Delete,
    ArrayDelete,
}

impl OpKind {
    pub fn is_allocating(self) -> bool {
        matches!(self, OpKind::New | OpKind::ArrayNew)
    }

    pub fn spelling(self) -> &'static str {
        match self {
            OpKind::New => "new",
            OpKind::ArrayNew => "new[]",
            OpKind::Delete => "delete",
            OpKind::ArrayDelete => "delete[]",
        }
    }
}

/// Atomic read-modify-write operations the bug visitor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicOp {
    FetchAdd,
    FetchSub,
    Other,
}

/// What kind of statement this is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StmtKind {
    /// A plain call; `operator` is set for direct calls to the overloaded
    /// allocation operators.
    Call {
        callee: String,
        operator: Option<OpKind>,
    },
    /// A new-expression.
    New { array: bool },
    /// A delete-expression.
    Delete { array: bool },
    /// A message send; slots are the selector pieces.
    Message { selector: Vec<String>, instance: bool },
    /// A block literal.
    Block,
    /// An atomic read-modify-write expression.
    AtomicRmw { op: AtomicOp },
    /// A return statement.
    Return,
    /// A load or store through a pointer.
    Deref,
    Other,
}

/// A statement of the analyzed program, as the engine describes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stmt {
    pub id: StmtId,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(id: StmtId, kind: StmtKind) -> Self {
        Self { id, kind }
    }

    pub fn call(id: StmtId, callee: impl Into<String>) -> Self {
        Self::new(
            id,
            StmtKind::Call {
                callee: callee.into(),
                operator: None,
            },
        )
    }

    pub fn operator_call(id: StmtId, op: OpKind) -> Self {
        Self::new(
            id,
            StmtKind::Call {
                callee: format!("operator {}", op.spelling()),
                operator: Some(op),
            },
        )
    }

    pub fn is_call_like(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Call { .. } | StmtKind::New { .. } | StmtKind::Delete { .. }
        )
    }

    pub fn is_call_expr(&self) -> bool {
        matches!(self.kind, StmtKind::Call { .. })
    }

    pub fn is_message(&self) -> bool {
        matches!(self.kind, StmtKind::Message { .. })
    }

    /// The callee name as diagnostics print it:
    /// `free()`, `'new'`, `-initWithBytesNoCopy:length:freeWhenDone:`.
    pub fn alloc_dealloc_name(&self) -> Option<String> {
        match &self.kind {
            StmtKind::Call { callee, operator } => match operator {
                Some(op) => Some(format!("'{}'", op.spelling())),
                None => Some(format!("{}()", callee)),
            },
            StmtKind::New { array } => Some(if *array {
                "'new[]'".to_string()
            } else {
                "'new'".to_string()
            }),
            StmtKind::Delete { array } => Some(if *array {
                "'delete[]'".to_string()
            } else {
                "'delete'".to_string()
            }),
            StmtKind::Message { selector, instance } => {
                let prefix = if *instance { "-" } else { "+" };
                Some(format!("{}{}:", prefix, selector.join(":")))
            }
            _ => None,
        }
    }

    /// Bare callee name, when the statement is a plain call.
    pub fn callee_name(&self) -> Option<&str> {
        match &self.kind {
            StmtKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alloc_dealloc_name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "stmt#{}", self.id.0),
        }
    }
}
