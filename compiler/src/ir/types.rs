//! IR Type System
//!
//! Defines the type system for the intermediate representation. The only
//! distinction safepoint placement cares about is between managed references
//! (which a collector may relocate) and everything else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IR type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Void type (no value)
    Void,

    /// Boolean type
    Bool,

    /// Integer types
    I8,
    I16,
    I32,
    I64,

    /// Floating point type
    F64,

    /// Raw pointer (not traced by the collector)
    Ptr(Box<IrType>),

    /// Managed reference (traced and possibly relocated by the collector)
    Ref(Box<IrType>),

    /// Function type
    Function {
        params: Vec<IrType>,
        return_type: Box<IrType>,
    },
}

impl IrType {
    /// Whether values of this type are heap references the collector must see.
    pub fn is_gc_ref(&self) -> bool {
        matches!(self, IrType::Ref(_))
    }

    /// Width in bits of integer-like types.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            IrType::Bool => Some(1),
            IrType::I8 => Some(8),
            IrType::I16 => Some(16),
            IrType::I32 => Some(32),
            IrType::I64 => Some(64),
            _ => None,
        }
    }
}

/// IR constant value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrValue {
    /// No value
    Void,
    /// Undefined value
    Undef,
    /// Null reference
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer values
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    /// Floating point value
    F64(f64),
    /// Function pointer (reference to a function by ID)
    Function(super::IrFunctionId),
}

impl IrValue {
    /// Integer payload widened to `i64`, if this is an integer constant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            IrValue::I8(v) => Some(*v as i64),
            IrValue::I16(v) => Some(*v as i64),
            IrValue::I32(v) => Some(*v as i64),
            IrValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn ty(&self) -> IrType {
        match self {
            IrValue::Bool(_) => IrType::Bool,
            IrValue::I8(_) => IrType::I8,
            IrValue::I16(_) => IrType::I16,
            IrValue::I32(_) => IrType::I32,
            IrValue::I64(_) => IrType::I64,
            IrValue::F64(_) => IrType::F64,
            IrValue::Null => IrType::Ref(Box::new(IrType::Void)),
            IrValue::Function(_) => IrType::Ptr(Box::new(IrType::Void)),
            IrValue::Void | IrValue::Undef => IrType::Void,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr(ty) => write!(f, "*{}", ty),
            IrType::Ref(ty) => write!(f, "&{}", ty),
            IrType::Function {
                params,
                return_type,
            } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", return_type)
            }
        }
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Void => write!(f, "void"),
            IrValue::Undef => write!(f, "undef"),
            IrValue::Null => write!(f, "null"),
            IrValue::Bool(b) => write!(f, "{}", b),
            IrValue::I8(v) => write!(f, "{}i8", v),
            IrValue::I16(v) => write!(f, "{}i16", v),
            IrValue::I32(v) => write!(f, "{}i32", v),
            IrValue::I64(v) => write!(f, "{}i64", v),
            IrValue::F64(v) => write!(f, "{}f64", v),
            IrValue::Function(id) => write!(f, "@{}", id),
        }
    }
}
