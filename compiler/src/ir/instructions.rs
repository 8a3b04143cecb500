//! IR Instructions
//!
//! Defines the non-terminator instruction set for the intermediate representation.
//! Block terminators (including the `Invoke` call-with-unwind-edge) live in
//! [`super::blocks`].

use super::{IrFunctionId, IrId, IrType, IrValue};
use serde::{Deserialize, Serialize};

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrInstruction {
    // === Value Operations ===

    /// Load constant value
    Const {
        dest: IrId,
        value: IrValue,
    },

    /// Copy value from one register to another
    Copy {
        dest: IrId,
        src: IrId,
    },

    /// Load value from memory
    Load {
        dest: IrId,
        ptr: IrId,
        ty: IrType,
    },

    /// Store value to memory
    Store {
        ptr: IrId,
        value: IrId,
    },

    // === Arithmetic Operations ===

    /// Binary arithmetic operation
    BinOp {
        dest: IrId,
        op: BinaryOp,
        left: IrId,
        right: IrId,
    },

    /// Unary operation
    UnOp {
        dest: IrId,
        op: UnaryOp,
        operand: IrId,
    },

    /// Compare operation
    Cmp {
        dest: IrId,
        op: CompareOp,
        left: IrId,
        right: IrId,
    },

    /// Select (ternary) operation
    Select {
        dest: IrId,
        condition: IrId,
        true_val: IrId,
        false_val: IrId,
    },

    /// Type cast
    Cast {
        dest: IrId,
        src: IrId,
        to_ty: IrType,
    },

    // === Memory Operations ===

    /// Reserve a stack slot in the current frame
    Alloca {
        dest: IrId,
        ty: IrType,
    },

    // === Calls ===

    /// Call to a statically known function
    CallDirect {
        dest: Option<IrId>,
        func_id: IrFunctionId,
        args: Vec<IrId>,
        attrs: CallAttributes,
    },

    /// Call through a function pointer
    CallIndirect {
        dest: Option<IrId>,
        func_ptr: IrId,
        args: Vec<IrId>,
        attrs: CallAttributes,
    },
}

/// Per-call-site attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAttributes {
    /// The call is known not to trigger a collection ("gc-leaf-function").
    /// Calls without this marker are assumed to be able to trigger GC.
    #[serde(default)]
    pub gc_leaf: bool,
}

impl CallAttributes {
    pub fn gc_leaf() -> Self {
        Self { gc_leaf: true }
    }
}

/// Call target as seen by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Direct(IrFunctionId),
    Indirect(IrId),
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl IrInstruction {
    /// Call target and attributes if this is a call
    pub fn call_site(&self) -> Option<(Callee, CallAttributes)> {
        match self {
            IrInstruction::CallDirect { func_id, attrs, .. } => {
                Some((Callee::Direct(*func_id), *attrs))
            }
            IrInstruction::CallIndirect {
                func_ptr, attrs, ..
            } => Some((Callee::Indirect(*func_ptr), *attrs)),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        self.call_site().is_some()
    }

    /// Whether this is a direct call to `func_id`
    pub fn calls(&self, func_id: IrFunctionId) -> bool {
        matches!(self, IrInstruction::CallDirect { func_id: callee, .. } if *callee == func_id)
    }

}
