//! MIR Functions
//!
//! This module defines function representation in the MIR, including
//! function signatures, GC-related attributes, and the function body.

use super::{IrBlockId, IrControlFlowGraph, IrId, IrSourceLocation, IrType, Linkage};
use serde::{Deserialize, Serialize};

/// MIR function representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    /// Unique identifier for this function
    pub id: IrFunctionId,

    /// Function name (the symbol other functions resolve against)
    pub name: String,

    /// Function signature
    pub signature: IrFunctionSignature,

    /// Control flow graph (function body); empty for declarations
    pub cfg: IrControlFlowGraph,

    /// Function attributes
    pub attributes: FunctionAttributes,

    /// Classification of function origin (user-defined, extern, intrinsic)
    pub kind: FunctionKind,

    /// Source location for debugging
    pub source_location: IrSourceLocation,

    /// Next available register ID (pub for the builder)
    pub next_reg_id: u32,
}

/// Unique identifier for functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrFunctionId(pub u32);

impl std::fmt::Display for IrFunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunctionSignature {
    /// Parameter types and names
    pub parameters: Vec<IrParameter>,

    /// Return type
    pub return_type: IrType,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParameter {
    /// Parameter name
    pub name: String,

    /// Parameter type
    pub ty: IrType,

    /// Register assigned to this parameter
    pub reg: IrId,
}

/// Exception handling model used by a function's personality routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExceptionModel {
    /// No personality routine
    #[default]
    None,
    /// Itanium-style landing pads
    LandingPad,
    /// Funclet-based handlers (cleanup/catch pads)
    Funclet,
}

/// Function attributes and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAttributes {
    /// Linkage type
    pub linkage: Linkage,

    /// Garbage collection strategy this function was compiled for, if any
    pub gc: Option<String>,

    /// The function never (transitively) triggers a collection
    pub gc_leaf: bool,

    /// Exception handling model of the personality routine
    pub exception_model: ExceptionModel,

    /// Whether this function never returns
    pub no_return: bool,
}

impl Default for FunctionAttributes {
    fn default() -> Self {
        Self {
            linkage: Linkage::Public,
            gc: None,
            gc_leaf: false,
            exception_model: ExceptionModel::None,
            no_return: false,
        }
    }
}

/// Classification of function origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FunctionKind {
    /// Function with a body defined in this module
    #[default]
    UserDefined,
    /// External declaration (linked later, no body here)
    ExternC,
    /// Compiler intrinsic; lowered inline and never allocates
    Intrinsic,
}

impl IrFunction {
    /// Create a new function with an entry block
    pub fn new(id: IrFunctionId, name: String, signature: IrFunctionSignature) -> Self {
        let mut function = Self {
            id,
            name,
            signature,
            cfg: IrControlFlowGraph::new(),
            attributes: FunctionAttributes::default(),
            kind: FunctionKind::UserDefined,
            source_location: IrSourceLocation::unknown(),
            next_reg_id: 0,
        };

        // Parameters occupy the first registers
        for i in 0..function.signature.parameters.len() {
            let reg = function.alloc_reg();
            function.signature.parameters[i].reg = reg;
        }

        function
    }

    /// Create a body-less external declaration
    pub fn declaration(id: IrFunctionId, name: String, signature: IrFunctionSignature) -> Self {
        Self {
            id,
            name,
            signature,
            cfg: IrControlFlowGraph::empty(),
            attributes: FunctionAttributes {
                linkage: Linkage::External,
                ..FunctionAttributes::default()
            },
            kind: FunctionKind::ExternC,
            source_location: IrSourceLocation::unknown(),
            next_reg_id: 0,
        }
    }

    /// Allocate a new register
    pub fn alloc_reg(&mut self) -> IrId {
        let id = IrId::new(self.next_reg_id);
        self.next_reg_id += 1;
        id
    }

    /// Get the entry block ID
    pub fn entry_block(&self) -> IrBlockId {
        self.cfg.entry_block
    }

    /// Whether this function has no body in this module
    pub fn is_declaration(&self) -> bool {
        self.kind == FunctionKind::ExternC || self.cfg.blocks.is_empty()
    }

    /// Number of call-like instructions (calls and invokes) in the body
    pub fn call_count(&self) -> usize {
        self.cfg
            .blocks
            .values()
            .map(|block| {
                block.instructions.iter().filter(|inst| inst.is_call()).count()
                    + usize::from(block.terminator.call_site().is_some())
            })
            .sum()
    }
}
