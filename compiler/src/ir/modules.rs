//! MIR Modules
//!
//! This module defines the top-level compilation unit: a named collection of
//! function definitions and declarations. Functions are stored in insertion
//! order so every pass over a module is reproducible.

use super::{FunctionKind, IrFunction, IrFunctionId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// MIR module - represents a compilation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    /// Module name
    pub name: String,

    /// Source file path
    pub source_file: String,

    /// Functions defined or declared in this module
    pub functions: IndexMap<IrFunctionId, IrFunction>,

    /// Next available function ID (pub for the builder)
    pub next_function_id: u32,
}

impl IrModule {
    /// Create a new module
    pub fn new(name: String, source_file: String) -> Self {
        Self {
            name,
            source_file,
            functions: IndexMap::new(),
            next_function_id: 0,
        }
    }

    /// Add a function to the module
    pub fn add_function(&mut self, function: IrFunction) -> IrFunctionId {
        let id = function.id;
        self.functions.insert(id, function);
        self.next_function_id = self.next_function_id.max(id.0 + 1);
        id
    }

    /// Allocate a new function ID
    pub fn alloc_function_id(&mut self) -> IrFunctionId {
        let id = IrFunctionId(self.next_function_id);
        self.next_function_id += 1;
        id
    }

    /// Look up a function by symbol name
    pub fn find_function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.values().find(|f| f.name == name)
    }

    /// Verify module integrity
    pub fn verify(&self) -> Result<(), String> {
        for (id, function) in &self.functions {
            if function.is_declaration() {
                continue;
            }
            function
                .cfg
                .verify()
                .map_err(|e| format!("Function {} ({}) error: {}", id, function.name, e))?;
        }

        Ok(())
    }

    /// Get module statistics
    pub fn stats(&self) -> ModuleStats {
        ModuleStats {
            function_count: self.functions.len(),
            declaration_count: self.functions.values().filter(|f| f.is_declaration()).count(),
            intrinsic_count: self
                .functions
                .values()
                .filter(|f| f.kind == FunctionKind::Intrinsic)
                .count(),
            block_count: self.functions.values().map(|f| f.cfg.blocks.len()).sum(),
        }
    }
}

/// Module statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStats {
    pub function_count: usize,
    pub declaration_count: usize,
    pub intrinsic_count: usize,
    pub block_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrFunctionSignature, IrType};

    #[test]
    fn test_module_creation() {
        let module = IrModule::new("test".to_string(), "test.mir".to_string());
        assert_eq!(module.name, "test");
        assert_eq!(module.source_file, "test.mir");
        assert!(module.functions.is_empty());
    }

    #[test]
    fn test_find_function_by_name() {
        let mut module = IrModule::new("test".to_string(), "test.mir".to_string());
        let sig = IrFunctionSignature {
            parameters: vec![],
            return_type: IrType::Void,
        };
        let id = module.alloc_function_id();
        module.add_function(IrFunction::declaration(id, "gc.safepoint_poll".to_string(), sig));

        assert_eq!(module.find_function("gc.safepoint_poll").map(|f| f.id), Some(id));
        assert!(module.find_function("missing").is_none());

        let stats = module.stats();
        assert_eq!(stats.function_count, 1);
        assert_eq!(stats.declaration_count, 1);
        assert_eq!(stats.block_count, 0);
    }
}
