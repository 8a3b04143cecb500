//! MIR Builder
//!
//! This module provides a builder interface for constructing MIR in a convenient way.
//! The builder maintains context and provides helper methods for common patterns.

use tracing::debug;

use super::{
    BinaryOp, CallAttributes, CompareOp, FunctionAttributes, FunctionKind, IrBlockId,
    IrFunction, IrFunctionId, IrFunctionSignature, IrId, IrInstruction, IrModule, IrParameter,
    IrPhiNode, IrSourceLocation, IrTerminator, IrType, IrValue, UnaryOp,
};

/// MIR builder for constructing IR modules
pub struct IrBuilder {
    /// The module being built
    pub module: IrModule,

    /// Current function being built
    pub(crate) current_function: Option<IrFunctionId>,

    /// Current basic block being built
    pub(crate) current_block: Option<IrBlockId>,

    /// Source location context
    current_source_location: IrSourceLocation,
}

impl IrBuilder {
    /// Create a new IR builder
    pub fn new(module_name: String, source_file: String) -> Self {
        Self {
            module: IrModule::new(module_name, source_file),
            current_function: None,
            current_block: None,
            current_source_location: IrSourceLocation::unknown(),
        }
    }

    /// Set the current source location for debugging
    pub fn set_source_location(&mut self, loc: IrSourceLocation) {
        self.current_source_location = loc;
    }

    // === Module Building ===

    /// Start building a new function
    pub fn start_function(&mut self, name: String, signature: IrFunctionSignature) -> IrFunctionId {
        let id = self.module.alloc_function_id();
        let mut function = IrFunction::new(id, name, signature);
        function.source_location = self.current_source_location;
        self.current_function = Some(id);
        self.current_block = Some(function.entry_block());
        self.module.add_function(function);
        id
    }

    /// Declare a function without a body (extern or intrinsic)
    pub fn declare_function(
        &mut self,
        name: String,
        signature: IrFunctionSignature,
        kind: FunctionKind,
    ) -> IrFunctionId {
        let id = self.module.alloc_function_id();
        let mut function = IrFunction::declaration(id, name, signature);
        function.kind = kind;
        self.module.add_function(function);
        id
    }

    /// Finish building the current function
    pub fn finish_function(&mut self) {
        if let Some(func) = self.current_function() {
            debug!(
                "finished function {} with {} blocks",
                func.name,
                func.cfg.blocks.len()
            );
        }
        self.current_function = None;
        self.current_block = None;
    }

    /// Get the current function
    pub fn current_function(&self) -> Option<&IrFunction> {
        self.current_function
            .and_then(|id| self.module.functions.get(&id))
    }

    /// Get the current function mutably
    pub fn current_function_mut(&mut self) -> Option<&mut IrFunction> {
        self.current_function
            .and_then(move |id| self.module.functions.get_mut(&id))
    }

    /// Attributes of the current function
    pub fn attributes_mut(&mut self) -> Option<&mut FunctionAttributes> {
        self.current_function_mut().map(|f| &mut f.attributes)
    }

    /// Compile the current function for the given GC strategy
    pub fn set_gc(&mut self, strategy: &str) -> Option<()> {
        self.attributes_mut().map(|a| a.gc = Some(strategy.to_string()))
    }

    // === Block Building ===

    /// Create a new basic block in the current function
    pub fn create_block(&mut self) -> Option<IrBlockId> {
        self.current_function_mut().map(|f| f.cfg.create_block())
    }

    /// Create a new basic block with a label
    pub fn create_block_with_label(&mut self, label: String) -> Option<IrBlockId> {
        let block_id = self.create_block()?;
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block_id))
            .map(|b| b.label = Some(label));
        Some(block_id)
    }

    /// Switch to building in a different block
    pub fn switch_to_block(&mut self, block: IrBlockId) {
        self.current_block = Some(block);
    }

    /// Get the current block
    pub fn current_block(&self) -> Option<IrBlockId> {
        self.current_block
    }

    // === Register Management ===

    /// Allocate a new register in the current function
    pub fn alloc_reg(&mut self) -> Option<IrId> {
        self.current_function_mut().map(|f| f.alloc_reg())
    }

    // === Instruction Building ===

    /// Add an instruction to the current block
    fn add_instruction(&mut self, inst: IrInstruction) -> Option<()> {
        let block_id = self.current_block?;
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block_id))
            .map(|b| b.add_instruction(inst))
    }

    /// Build a constant instruction
    pub fn build_const(&mut self, value: IrValue) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.add_instruction(IrInstruction::Const { dest, value })?;
        Some(dest)
    }

    /// Build an integer constant
    pub fn build_int(&mut self, value: i64, ty: IrType) -> Option<IrId> {
        let ir_value = match ty {
            IrType::I8 => IrValue::I8(value as i8),
            IrType::I16 => IrValue::I16(value as i16),
            IrType::I32 => IrValue::I32(value as i32),
            IrType::I64 => IrValue::I64(value),
            _ => return None,
        };
        self.build_const(ir_value)
    }

    /// Build a boolean constant
    pub fn build_bool(&mut self, value: bool) -> Option<IrId> {
        self.build_const(IrValue::Bool(value))
    }

    /// Build a function pointer constant
    pub fn build_function_ptr(&mut self, func_id: IrFunctionId) -> Option<IrId> {
        self.build_const(IrValue::Function(func_id))
    }

    /// Build a stack slot
    pub fn build_alloca(&mut self, ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.add_instruction(IrInstruction::Alloca { dest, ty })?;
        Some(dest)
    }

    /// Build a load from a stack slot or heap pointer
    pub fn build_load(&mut self, ptr: IrId, ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.add_instruction(IrInstruction::Load { dest, ptr, ty })?;
        Some(dest)
    }

    pub fn build_store(&mut self, ptr: IrId, value: IrId) -> Option<()> {
        self.add_instruction(IrInstruction::Store { ptr, value })
    }

    /// Build a binary operation
    pub fn build_binop(&mut self, op: BinaryOp, left: IrId, right: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.add_instruction(IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
        })?;
        Some(dest)
    }

    /// Build a unary operation
    pub fn build_unop(&mut self, op: UnaryOp, operand: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.add_instruction(IrInstruction::UnOp { dest, op, operand })?;
        Some(dest)
    }

    /// Build a comparison
    pub fn build_cmp(&mut self, op: CompareOp, left: IrId, right: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.add_instruction(IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        })?;
        Some(dest)
    }

    /// Build a direct function call (callee known at compile time)
    ///
    /// A destination register is only allocated when the callee's signature
    /// returns a value.
    pub fn build_call_direct(
        &mut self,
        func_id: IrFunctionId,
        args: Vec<IrId>,
        attrs: CallAttributes,
    ) -> Option<Option<IrId>> {
        let returns_value = self
            .module
            .functions
            .get(&func_id)
            .map(|f| f.signature.return_type != IrType::Void)
            .unwrap_or(false);

        let dest = if returns_value {
            Some(self.alloc_reg()?)
        } else {
            None
        };

        self.add_instruction(IrInstruction::CallDirect {
            dest,
            func_id,
            args,
            attrs,
        })?;
        Some(dest)
    }

    /// Build an indirect function call
    pub fn build_call_indirect(
        &mut self,
        func_ptr: IrId,
        args: Vec<IrId>,
        returns_value: bool,
        attrs: CallAttributes,
    ) -> Option<Option<IrId>> {
        let dest = if returns_value {
            Some(self.alloc_reg()?)
        } else {
            None
        };

        self.add_instruction(IrInstruction::CallIndirect {
            dest,
            func_ptr,
            args,
            attrs,
        })?;
        Some(dest)
    }

    // === Terminator Building ===

    /// Set the terminator for the current block
    fn set_terminator(&mut self, term: IrTerminator) -> Option<()> {
        let block_id = self.current_block?;
        let func = self.current_function_mut()?;

        // First, set the terminator
        let block = func.cfg.get_block_mut(block_id)?;
        block.set_terminator(term.clone());

        // Then, update predecessor information based on the terminator
        for succ in term.successors() {
            func.cfg.connect_blocks(block_id, succ);
        }

        if let IrTerminator::Invoke { unwind, .. } = term {
            if let Some(landing) = func.cfg.get_block_mut(unwind) {
                landing.metadata.is_landing_pad = true;
            }
        }

        Some(())
    }

    /// Build an unconditional branch
    pub fn build_branch(&mut self, target: IrBlockId) -> Option<()> {
        self.set_terminator(IrTerminator::Branch { target })
    }

    /// Build a conditional branch
    pub fn build_cond_branch(
        &mut self,
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        })
    }

    /// Build a switch statement
    pub fn build_switch(
        &mut self,
        value: IrId,
        cases: Vec<(i64, IrBlockId)>,
        default: IrBlockId,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::Switch {
            value,
            cases,
            default,
        })
    }

    /// Build an invoke (call with an unwind successor)
    pub fn build_invoke(
        &mut self,
        func_id: IrFunctionId,
        args: Vec<IrId>,
        attrs: CallAttributes,
        normal: IrBlockId,
        unwind: IrBlockId,
    ) -> Option<Option<IrId>> {
        let returns_value = self
            .module
            .functions
            .get(&func_id)
            .map(|f| f.signature.return_type != IrType::Void)
            .unwrap_or(false);
        let dest = if returns_value {
            Some(self.alloc_reg()?)
        } else {
            None
        };

        self.set_terminator(IrTerminator::Invoke {
            dest,
            func_id,
            args,
            attrs,
            normal,
            unwind,
        })?;
        Some(dest)
    }

    /// Build a computed jump
    pub fn build_indirect_branch(
        &mut self,
        address: IrId,
        destinations: Vec<IrBlockId>,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::IndirectBranch {
            address,
            destinations,
        })
    }

    /// Build a return instruction
    pub fn build_return(&mut self, value: Option<IrId>) -> Option<()> {
        self.set_terminator(IrTerminator::Return { value })
    }

    /// Build an unreachable terminator
    pub fn build_unreachable(&mut self) -> Option<()> {
        self.set_terminator(IrTerminator::Unreachable)
    }

    // === Phi Node Building ===

    /// Add a phi node to a block
    pub fn build_phi(&mut self, block: IrBlockId, ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        let phi = IrPhiNode {
            dest,
            incoming: Vec::new(),
            ty,
        };

        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block))
            .map(|b| b.add_phi(phi))?;

        Some(dest)
    }

    /// Add an incoming value to a phi node
    pub fn add_phi_incoming(
        &mut self,
        block: IrBlockId,
        phi_dest: IrId,
        from_block: IrBlockId,
        value: IrId,
    ) -> Option<()> {
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block))
            .and_then(|b| b.phi_nodes.iter_mut().find(|p| p.dest == phi_dest))
            .map(|phi| phi.incoming.push((from_block, value)))
    }

    // === Convenience Methods ===

    pub fn build_add(&mut self, left: IrId, right: IrId) -> Option<IrId> {
        self.build_binop(BinaryOp::Add, left, right)
    }
}

/// Function builder helper for building function signatures
pub struct FunctionSignatureBuilder {
    parameters: Vec<IrParameter>,
    return_type: IrType,
}

impl Default for FunctionSignatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionSignatureBuilder {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            return_type: IrType::Void,
        }
    }

    pub fn param(mut self, name: String, ty: IrType) -> Self {
        self.parameters.push(IrParameter {
            name,
            ty,
            reg: IrId::new(0), // Will be assigned later
        });
        self
    }

    pub fn returns(mut self, ty: IrType) -> Self {
        self.return_type = ty;
        self
    }

    pub fn build(self) -> IrFunctionSignature {
        IrFunctionSignature {
            parameters: self.parameters,
            return_type: self.return_type,
        }
    }
}
