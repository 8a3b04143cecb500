//! MIR Dump Utility
//!
//! Pretty-prints MIR in a human-readable format similar to LLVM IR / Cranelift CLIF.
//! Useful for debugging passes; the safepoint pass traces functions before and
//! after instrumentation with it.

use super::{
    BinaryOp, CallAttributes, CompareOp, IrBasicBlock, IrControlFlowGraph, IrFunction, IrId,
    IrInstruction, IrModule, IrPhiNode, IrTerminator, UnaryOp,
};
use std::fmt::Write;

/// Dump an entire module to a string.
pub fn dump_module(module: &IrModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; Module: {}", module.name);
    let _ = writeln!(out, "; Functions: {}", module.functions.len());
    let _ = writeln!(out);

    for func in module.functions.values() {
        let _ = writeln!(out, "{}", dump_function(func));
    }

    out
}

/// Dump a single function to a string.
pub fn dump_function(func: &IrFunction) -> String {
    let mut out = String::new();

    let params: Vec<String> = func
        .signature
        .parameters
        .iter()
        .map(|p| format!("{}: {}", p.reg, p.ty))
        .collect();

    let gc = func
        .attributes
        .gc
        .as_ref()
        .map(|s| format!(" gc \"{}\"", s))
        .unwrap_or_default();
    let leaf = if func.attributes.gc_leaf { " gc-leaf" } else { "" };

    if func.is_declaration() {
        let _ = writeln!(
            out,
            "declare @{}({}) -> {}{}{}",
            func.name,
            params.join(", "),
            func.signature.return_type,
            gc,
            leaf
        );
        return out;
    }

    let _ = writeln!(
        out,
        "fn @{}({}) -> {}{}{} {{",
        func.name,
        params.join(", "),
        func.signature.return_type,
        gc,
        leaf
    );
    let _ = write!(out, "{}", dump_cfg(&func.cfg));
    let _ = writeln!(out, "}}");
    out
}

/// Dump a CFG to a string, in block-list order.
pub fn dump_cfg(cfg: &IrControlFlowGraph) -> String {
    cfg.blocks.values().map(dump_block).collect()
}

/// Dump a basic block to a string.
pub fn dump_block(block: &IrBasicBlock) -> String {
    let mut out = String::new();

    let label = block
        .label
        .as_ref()
        .map(|l| format!(" ; {}", l))
        .unwrap_or_default();
    let _ = writeln!(out, "  {}:{}", block.id, label);

    if !block.predecessors.is_empty() {
        let preds: Vec<String> = block.predecessors.iter().map(|p| p.to_string()).collect();
        let _ = writeln!(out, "    ; preds: {}", preds.join(", "));
    }

    for phi in &block.phi_nodes {
        let _ = writeln!(out, "    {}", dump_phi(phi));
    }

    for inst in &block.instructions {
        let _ = writeln!(out, "    {}", dump_instruction(inst));
    }

    let _ = writeln!(out, "    {}", dump_terminator(&block.terminator));
    out
}

/// Dump a phi node to a string.
pub fn dump_phi(phi: &IrPhiNode) -> String {
    let incoming: Vec<String> = phi
        .incoming
        .iter()
        .map(|(block, val)| format!("[{}: {}]", block, val))
        .collect();

    format!("{} = phi {} {}", phi.dest, phi.ty, incoming.join(", "))
}

fn dump_args(args: &[IrId]) -> String {
    args.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn dump_call_attrs(attrs: &CallAttributes) -> &'static str {
    if attrs.gc_leaf {
        " #gc-leaf"
    } else {
        ""
    }
}

fn dump_dest(dest: &Option<IrId>) -> String {
    dest.map(|d| format!("{} = ", d)).unwrap_or_default()
}

/// Dump an instruction to a string.
pub fn dump_instruction(inst: &IrInstruction) -> String {
    match inst {
        IrInstruction::Const { dest, value } => format!("{} = const {}", dest, value),
        IrInstruction::Copy { dest, src } => format!("{} = copy {}", dest, src),
        IrInstruction::Load { dest, ptr, ty } => format!("{} = load {} {}", dest, ty, ptr),
        IrInstruction::Store { ptr, value } => format!("store {}, {}", ptr, value),
        IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
        } => format!("{} = {} {}, {}", dest, dump_binop(op), left, right),
        IrInstruction::UnOp { dest, op, operand } => {
            format!("{} = {} {}", dest, dump_unaryop(op), operand)
        }
        IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        } => format!("{} = cmp {} {}, {}", dest, dump_cmpop(op), left, right),
        IrInstruction::Select {
            dest,
            condition,
            true_val,
            false_val,
        } => format!("{} = select {}, {}, {}", dest, condition, true_val, false_val),
        IrInstruction::Cast { dest, src, to_ty } => format!("{} = cast {} to {}", dest, src, to_ty),
        IrInstruction::Alloca { dest, ty } => format!("{} = alloca {}", dest, ty),
        IrInstruction::CallDirect {
            dest,
            func_id,
            args,
            attrs,
        } => format!(
            "{}call @{}({}){}",
            dump_dest(dest),
            func_id,
            dump_args(args),
            dump_call_attrs(attrs)
        ),
        IrInstruction::CallIndirect {
            dest,
            func_ptr,
            args,
            attrs,
        } => format!(
            "{}call_indirect {}({}){}",
            dump_dest(dest),
            func_ptr,
            dump_args(args),
            dump_call_attrs(attrs)
        ),
    }
}

/// Dump a terminator to a string.
pub fn dump_terminator(term: &IrTerminator) -> String {
    match term {
        IrTerminator::Branch { target } => format!("br {}", target),
        IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        } => format!("condbr {}, {}, {}", condition, true_target, false_target),
        IrTerminator::Switch {
            value,
            cases,
            default,
        } => {
            let case_str: Vec<String> = cases
                .iter()
                .map(|(v, target)| format!("{} => {}", v, target))
                .collect();
            format!(
                "switch {} [{}], default {}",
                value,
                case_str.join(", "),
                default
            )
        }
        IrTerminator::Invoke {
            dest,
            func_id,
            args,
            attrs,
            normal,
            unwind,
        } => format!(
            "{}invoke @{}({}){} to {} unwind {}",
            dump_dest(dest),
            func_id,
            dump_args(args),
            dump_call_attrs(attrs),
            normal,
            unwind
        ),
        IrTerminator::IndirectBranch {
            address,
            destinations,
        } => {
            let dests: Vec<String> = destinations.iter().map(|d| d.to_string()).collect();
            format!("indirectbr {}, [{}]", address, dests.join(", "))
        }
        IrTerminator::Return { value: Some(v) } => format!("ret {}", v),
        IrTerminator::Return { value: None } => "ret void".to_string(),
        IrTerminator::Resume { exception } => format!("resume {}", exception),
        IrTerminator::Unreachable => "unreachable".to_string(),
    }
}

fn dump_binop(op: &BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Rem => "rem",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::Shr => "shr",
    }
}

fn dump_unaryop(op: &UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "neg",
        UnaryOp::Not => "not",
    }
}

fn dump_cmpop(op: &CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Le => "le",
        CompareOp::Gt => "gt",
        CompareOp::Ge => "ge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBlockId, IrFunctionId};

    #[test]
    fn test_dump_call_and_invoke() {
        let call = IrInstruction::CallDirect {
            dest: None,
            func_id: IrFunctionId(2),
            args: vec![IrId::new(1)],
            attrs: CallAttributes::gc_leaf(),
        };
        assert_eq!(dump_instruction(&call), "call @fn2($1) #gc-leaf");

        let invoke = IrTerminator::Invoke {
            dest: Some(IrId::new(3)),
            func_id: IrFunctionId(4),
            args: vec![],
            attrs: CallAttributes::default(),
            normal: IrBlockId::new(1),
            unwind: IrBlockId::new(2),
        };
        assert_eq!(dump_terminator(&invoke), "$3 = invoke @fn4() to bb1 unwind bb2");
    }
}
