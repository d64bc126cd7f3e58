//! Memory regions
//!
//! A [`Region`] denotes an addressable area of memory. Regions form a small
//! algebra: a base (symbolic heap block, named variable, alloca result,
//! block literal, function code) possibly wrapped in element/field/cast
//! layers. The checker only ever asks three questions of a region: what is
//! its memory space, what is its base symbol, and how far is it offset from
//! its base.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::sval::SymbolId;

/// Memory space a region lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemSpace {
    Heap,
    StackLocals,
    StackArguments,
    Globals,
    /// Conjured symbols land here: the engine cannot prove where the
    /// pointed-to memory lives, so deallocation must stay permitted.
    Unknown,
    Code,
}

/// Byte offset of a region from its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOffset {
    valid: bool,
    symbolic: bool,
    bytes: i64,
}

impl RegionOffset {
    pub fn known(bytes: i64) -> Self {
        Self {
            valid: true,
            symbolic: false,
            bytes,
        }
    }

    pub fn symbolic() -> Self {
        Self {
            valid: true,
            symbolic: true,
            bytes: 0,
        }
    }

    pub fn invalid() -> Self {
        Self {
            valid: false,
            symbolic: false,
            bytes: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn has_symbolic_offset(&self) -> bool {
        self.symbolic
    }

    pub fn bytes(&self) -> i64 {
        self.bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum RegionKind {
    /// Base region named by a conjured symbol (heap allocations).
    Symbolic { sym: SymbolId, space: MemSpace },
    /// A declared variable. `frame` ties stack variables to their stack
    /// frame for leak naming.
    Var {
        name: String,
        space: MemSpace,
        frame: u64,
        static_local: bool,
    },
    /// Memory produced by `__builtin_alloca`.
    Alloca { sym: SymbolId },
    /// A block literal (closure object).
    Block,
    /// The code of a named function.
    FunctionCode { name: String },
    /// Element of a containing region at a byte offset (`None` = symbolic).
    Element {
        base: Box<Region>,
        offset_bytes: Option<i64>,
    },
    /// Named field of a containing region.
    Field { base: Box<Region>, name: String },
    /// A cast layer; transparent to all queries after `strip_casts`.
    Cast { base: Box<Region> },
}

/// An addressable memory area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    kind: RegionKind,
}

impl Region {
    pub fn symbolic(sym: SymbolId, space: MemSpace) -> Self {
        Self {
            kind: RegionKind::Symbolic { sym, space },
        }
    }

    pub fn var(name: impl Into<String>, space: MemSpace, frame: u64) -> Self {
        Self {
            kind: RegionKind::Var {
                name: name.into(),
                space,
                frame,
                static_local: false,
            },
        }
    }

    pub fn static_local(name: impl Into<String>, frame: u64) -> Self {
        Self {
            kind: RegionKind::Var {
                name: name.into(),
                space: MemSpace::Globals,
                frame,
                static_local: true,
            },
        }
    }

    pub fn alloca(sym: SymbolId) -> Self {
        Self {
            kind: RegionKind::Alloca { sym },
        }
    }

    pub fn block() -> Self {
        Self {
            kind: RegionKind::Block,
        }
    }

    pub fn function_code(name: impl Into<String>) -> Self {
        Self {
            kind: RegionKind::FunctionCode { name: name.into() },
        }
    }

    pub fn element(base: Region, offset_bytes: Option<i64>) -> Self {
        Self {
            kind: RegionKind::Element {
                base: Box::new(base),
                offset_bytes,
            },
        }
    }

    pub fn field(base: Region, name: impl Into<String>) -> Self {
        Self {
            kind: RegionKind::Field {
                base: Box::new(base),
                name: name.into(),
            },
        }
    }

    pub fn cast(base: Region) -> Self {
        Self {
            kind: RegionKind::Cast {
                base: Box::new(base),
            },
        }
    }

    /// Remove cast layers. Element/field layers are preserved.
    pub fn strip_casts(&self) -> &Region {
        match &self.kind {
            RegionKind::Cast { base } => base.strip_casts(),
            _ => self,
        }
    }

    /// The innermost base region (through casts, elements and fields).
    pub fn base_region(&self) -> &Region {
        match &self.kind {
            RegionKind::Cast { base }
            | RegionKind::Element { base, .. }
            | RegionKind::Field { base, .. } => base.base_region(),
            _ => self,
        }
    }

    /// The memory space of this region (derived regions inherit it).
    pub fn memory_space(&self) -> MemSpace {
        match &self.kind {
            RegionKind::Symbolic { space, .. } => *space,
            RegionKind::Var { space, .. } => *space,
            RegionKind::Alloca { .. } => MemSpace::StackLocals,
            // Blocks are engine-managed objects; treat as unknown so that
            // the dedicated block check fires first.
            RegionKind::Block => MemSpace::Unknown,
            RegionKind::FunctionCode { .. } => MemSpace::Code,
            RegionKind::Cast { base }
            | RegionKind::Element { base, .. }
            | RegionKind::Field { base, .. } => base.memory_space(),
        }
    }

    /// Symbol naming this region if its base is symbolic.
    pub fn base_symbol(&self) -> Option<SymbolId> {
        match &self.base_region().kind {
            RegionKind::Symbolic { sym, .. } => Some(*sym),
            RegionKind::Alloca { sym } => Some(*sym),
            _ => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, RegionKind::Block)
    }

    pub fn is_alloca(&self) -> bool {
        matches!(self.base_region().kind, RegionKind::Alloca { .. })
    }

    pub fn is_element_or_field(&self) -> bool {
        matches!(
            self.strip_casts().kind,
            RegionKind::Element { .. } | RegionKind::Field { .. }
        )
    }

    pub fn is_function_code(&self) -> bool {
        matches!(self.kind, RegionKind::FunctionCode { .. })
    }

    /// Name of the variable when the base is a declared variable.
    pub fn var_name(&self) -> Option<&str> {
        match &self.base_region().kind {
            RegionKind::Var { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Stack frame of the base variable, if any.
    pub fn var_frame(&self) -> Option<u64> {
        match &self.base_region().kind {
            RegionKind::Var { frame, .. } => Some(*frame),
            _ => None,
        }
    }

    /// Byte offset of this region from its base.
    pub fn offset(&self) -> RegionOffset {
        fn walk(region: &Region, acc: i64) -> RegionOffset {
            match &region.kind {
                RegionKind::Cast { base } | RegionKind::Field { base, .. } => walk(base, acc),
                RegionKind::Element { base, offset_bytes } => match offset_bytes {
                    Some(o) => walk(base, acc + o),
                    None => RegionOffset::symbolic(),
                },
                _ => RegionOffset::known(acc),
            }
        }
        walk(self, 0)
    }

    /// Human-readable summary for diagnostics ("the address of the local
    /// variable 'buf'"). Returns `None` when no useful summary exists.
    pub fn summarize(&self) -> Option<String> {
        match &self.kind {
            RegionKind::FunctionCode { name } => {
                Some(format!("the address of the function '{}'", name))
            }
            RegionKind::Block => Some("a block".to_string()),
            RegionKind::Var {
                name,
                space,
                static_local,
                ..
            } => match space {
                MemSpace::StackLocals => {
                    Some(format!("the address of the local variable '{}'", name))
                }
                MemSpace::StackArguments => {
                    Some(format!("the address of the parameter '{}'", name))
                }
                MemSpace::Globals => {
                    if *static_local {
                        Some(format!("the address of the static variable '{}'", name))
                    } else {
                        Some(format!("the address of the global variable '{}'", name))
                    }
                }
                _ => None,
            },
            RegionKind::Cast { base }
            | RegionKind::Element { base, .. }
            | RegionKind::Field { base, .. } => base.summarize(),
            _ => None,
        }
    }

    /// Pretty name for leak messages ("memory pointed to by 'p'").
    pub fn pretty_name(&self) -> Option<String> {
        self.var_name().map(|n| n.to_string())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RegionKind::Symbolic { sym, .. } => write!(f, "SymRegion({})", sym),
            RegionKind::Var { name, .. } => write!(f, "{}", name),
            RegionKind::Alloca { sym } => write!(f, "alloca({})", sym),
            RegionKind::Block => write!(f, "block"),
            RegionKind::FunctionCode { name } => write!(f, "code:{}", name),
            RegionKind::Element { base, offset_bytes } => match offset_bytes {
                Some(o) => write!(f, "element{{{}+{}B}}", base, o),
                None => write!(f, "element{{{}+?}}", base),
            },
            RegionKind::Field { base, name } => write!(f, "{}.{}", base, name),
            RegionKind::Cast { base } => write!(f, "{}", base),
        }
    }
}
