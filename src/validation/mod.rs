//! Static validation of decoded modules.
//!
//! A single pass over every function body checks operand-stack types and
//! control frames against the module's types, imports, tables, memories and
//! globals, and rewrites branch instructions to resolved labels as it goes.
//! On success, execution of any exported function cannot type-fault; only
//! traps remain possible.

use crate::isa::Instruction;
use crate::memory;
use crate::module::{
    ElementItems, ElementSegment, ExternalKind, GlobalType, ImportDescriptor, InitExpr, MemoryType,
    Module, Mutability, SegmentMode, TableType,
};
use crate::types::{Signature, ValueType};
use crate::Error;
use alloc::collections::BTreeSet;
use alloc::format;
use alloc::vec::Vec;
use core::mem;

mod func;

#[cfg(test)]
mod tests;

use self::func::FunctionValidator;

/// Module-level information the function validator checks against.
pub(crate) struct ModuleContext<'a> {
    types: &'a [Signature],
    /// Type indices of the whole function index space, imports first.
    func_type_indices: Vec<u32>,
    tables: Vec<TableType>,
    memories: Vec<MemoryType>,
    /// `(type, imported)` of the whole global index space, imports first.
    globals: Vec<(GlobalType, bool)>,
    imported_globals: u32,
    elements: &'a [ElementSegment],
    data_segment_count: u32,
    has_data_count: bool,
    /// Functions that may be referenced by `ref.func` inside code: those
    /// occurring in element segments, global initializers, exports or the
    /// start section.
    declared_funcs: BTreeSet<u32>,
}

impl<'a> ModuleContext<'a> {
    fn new(module: &'a Module) -> ModuleContext<'a> {
        let mut func_type_indices = Vec::new();
        let mut tables = Vec::new();
        let mut memories = Vec::new();
        let mut globals = Vec::new();

        for import in &module.imports {
            match import.descriptor {
                ImportDescriptor::Function(type_index) => func_type_indices.push(type_index),
                ImportDescriptor::Table(table_type) => tables.push(table_type),
                ImportDescriptor::Memory(memory_type) => memories.push(memory_type),
                ImportDescriptor::Global(global_type) => globals.push((global_type, true)),
            }
        }
        let imported_globals = globals.len() as u32;

        func_type_indices.extend_from_slice(&module.functions);
        tables.extend_from_slice(&module.tables);
        memories.extend_from_slice(&module.memories);
        globals.extend(
            module
                .globals
                .iter()
                .map(|entry| (entry.global_type, false)),
        );

        let mut declared_funcs = BTreeSet::new();
        for export in &module.exports {
            if export.kind == ExternalKind::Function {
                declared_funcs.insert(export.index);
            }
        }
        if let Some(start) = module.start {
            declared_funcs.insert(start);
        }
        for segment in &module.elements {
            match &segment.items {
                ElementItems::Functions(indices) => declared_funcs.extend(indices.iter().copied()),
                ElementItems::Expressions(exprs) => {
                    for expr in exprs {
                        collect_func_refs(expr, &mut declared_funcs);
                    }
                }
            }
        }
        for entry in &module.globals {
            collect_func_refs(&entry.init_expr, &mut declared_funcs);
        }

        ModuleContext {
            types: &module.types,
            func_type_indices,
            tables,
            memories,
            globals,
            imported_globals,
            elements: &module.elements,
            data_segment_count: module.data_count.unwrap_or(module.data.len() as u32),
            has_data_count: module.data_count.is_some(),
            declared_funcs,
        }
    }

    pub(crate) fn require_type(&self, index: u32) -> Result<&Signature, Error> {
        self.types.get(index as usize).ok_or_else(|| {
            Error::Validation(format!(
                "type index {} out of range of {} types",
                index,
                self.types.len()
            ))
        })
    }

    pub(crate) fn require_function(&self, index: u32) -> Result<&Signature, Error> {
        let type_index = self.func_type_indices.get(index as usize).ok_or_else(|| {
            Error::Validation(format!(
                "function index {} out of range of {} functions",
                index,
                self.func_type_indices.len()
            ))
        })?;
        self.require_type(*type_index)
    }

    pub(crate) fn require_declared_function(&self, index: u32) -> Result<(), Error> {
        self.require_function(index)?;
        if !self.declared_funcs.contains(&index) {
            return Err(Error::Validation(format!(
                "function {} is not declared in any element segment or export",
                index
            )));
        }
        Ok(())
    }

    pub(crate) fn require_table(&self, index: u32) -> Result<TableType, Error> {
        self.tables.get(index as usize).copied().ok_or_else(|| {
            Error::Validation(format!(
                "table index {} out of range of {} tables",
                index,
                self.tables.len()
            ))
        })
    }

    pub(crate) fn require_memory(&self, index: u32) -> Result<MemoryType, Error> {
        self.memories.get(index as usize).copied().ok_or_else(|| {
            Error::Validation(format!(
                "memory index {} out of range of {} memories",
                index,
                self.memories.len()
            ))
        })
    }

    pub(crate) fn require_global(&self, index: u32) -> Result<(GlobalType, bool), Error> {
        self.globals.get(index as usize).copied().ok_or_else(|| {
            Error::Validation(format!(
                "global index {} out of range of {} globals",
                index,
                self.globals.len()
            ))
        })
    }

    pub(crate) fn require_element_segment(&self, index: u32) -> Result<&ElementSegment, Error> {
        self.elements.get(index as usize).ok_or_else(|| {
            Error::Validation(format!(
                "element segment index {} out of range of {} segments",
                index,
                self.elements.len()
            ))
        })
    }

    pub(crate) fn require_data_segment(&self, index: u32) -> Result<(), Error> {
        if !self.has_data_count {
            return Err(Error::Validation(
                "bulk data instructions require a data count section".into(),
            ));
        }
        if index >= self.data_segment_count {
            return Err(Error::Validation(format!(
                "data segment index {} out of range of {} segments",
                index, self.data_segment_count
            )));
        }
        Ok(())
    }
}

fn collect_func_refs(expr: &InitExpr, out: &mut BTreeSet<u32>) {
    for instruction in expr.code() {
        if let Instruction::RefFunc(index) = instruction {
            out.insert(*index);
        }
    }
}

pub(crate) fn validate_module(module: &mut Module) -> Result<(), Error> {
    // The bodies are taken out so that they can be rewritten while the rest
    // of the module is borrowed by the context.
    let mut bodies = mem::take(&mut module.code);

    {
        let context = ModuleContext::new(module);

        // Imports.
        for import in &module.imports {
            match import.descriptor {
                ImportDescriptor::Function(type_index) => {
                    context.require_type(type_index)?;
                }
                ImportDescriptor::Table(ref table_type) => {
                    validate_table_type(table_type)?;
                }
                ImportDescriptor::Memory(ref memory_type) => {
                    validate_memory_type(memory_type)?;
                }
                ImportDescriptor::Global(_) => {}
            }
        }

        // Tables and memories defined by the module.
        for table_type in &module.tables {
            validate_table_type(table_type)?;
        }
        for memory_type in &module.memories {
            validate_memory_type(memory_type)?;
        }

        // Global initializers.
        for entry in &module.globals {
            validate_const_expr(
                &entry.init_expr,
                entry.global_type.content_type,
                &context,
            )?;
        }

        // Exports: unique names referring to existing entities.
        let mut export_names = BTreeSet::new();
        for export in &module.exports {
            if !export_names.insert(export.field.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate export {}",
                    export.field
                )));
            }
            match export.kind {
                ExternalKind::Function => {
                    context.require_function(export.index)?;
                }
                ExternalKind::Table => {
                    context.require_table(export.index)?;
                }
                ExternalKind::Memory => {
                    context.require_memory(export.index)?;
                }
                ExternalKind::Global => {
                    context.require_global(export.index)?;
                }
            }
        }

        // Start function must be of type [] -> [].
        if let Some(start) = module.start {
            let signature = context.require_function(start)?;
            if !signature.params().is_empty() || !signature.results().is_empty() {
                return Err(Error::Validation(
                    "start function expected to have type [] -> []".into(),
                ));
            }
        }

        // Element segments.
        for segment in &module.elements {
            if let Some(offset) = &segment.offset {
                let table_type = context.require_table(segment.table_index)?;
                if table_type.elem_type != segment.elem_type {
                    return Err(Error::Validation(format!(
                        "active {} segment targets a {} table",
                        segment.elem_type, table_type.elem_type
                    )));
                }
                validate_const_expr(offset, table_type.address_type.value_type(), &context)?;
            }
            match &segment.items {
                ElementItems::Functions(indices) => {
                    for &index in indices {
                        context.require_function(index)?;
                    }
                }
                ElementItems::Expressions(exprs) => {
                    for expr in exprs {
                        validate_const_expr(expr, segment.elem_type, &context)?;
                    }
                }
            }
        }

        // Data segments.
        for segment in &module.data {
            if segment.mode == SegmentMode::Active {
                let memory_type = context.require_memory(segment.memory_index)?;
                let offset = segment
                    .offset
                    .as_ref()
                    .expect("active segments carry an offset due to decoding");
                validate_const_expr(offset, memory_type.address_type.value_type(), &context)?;
            }
        }

        // Function bodies.
        for (index, body) in bodies.iter_mut().enumerate() {
            let type_index = module.functions[index];
            let signature = context.require_type(type_index)?.clone();
            FunctionValidator::validate(&context, &signature, body).map_err(|error| match error {
                Error::Validation(message) => Error::Validation(format!(
                    "Function #{} validation error: {}",
                    index, message
                )),
                other => other,
            })?;
        }
    }

    module.code = bodies;
    Ok(())
}

fn validate_table_type(table_type: &TableType) -> Result<(), Error> {
    if let Some(maximum) = table_type.limits.max {
        if table_type.limits.min > maximum {
            return Err(Error::Validation(format!(
                "maximum limit {} is less than minimum {}",
                maximum, table_type.limits.min
            )));
        }
    }
    Ok(())
}

fn validate_memory_type(memory_type: &MemoryType) -> Result<(), Error> {
    memory::validate_memory(&memory_type.limits, memory_type.address_type)
        .map_err(Error::Validation)
}

/// Checks a constant expression: only the constant opcode subset may occur,
/// `global.get` may only name imported constant globals, and the result must
/// be a single value of `expected` type.
fn validate_const_expr(
    expr: &InitExpr,
    expected: ValueType,
    context: &ModuleContext,
) -> Result<(), Error> {
    let mut stack: Vec<ValueType> = Vec::new();

    let pop = |stack: &mut Vec<ValueType>, expected: ValueType| -> Result<(), Error> {
        match stack.pop() {
            Some(value_type) if value_type == expected => Ok(()),
            Some(value_type) => Err(Error::Validation(format!(
                "constant expression expected {}, found {}",
                expected, value_type
            ))),
            None => Err(Error::Validation(
                "constant expression underflows its stack".into(),
            )),
        }
    };

    for instruction in expr.code() {
        match *instruction {
            Instruction::I32Const(_) => stack.push(ValueType::I32),
            Instruction::I64Const(_) => stack.push(ValueType::I64),
            Instruction::F32Const(_) => stack.push(ValueType::F32),
            Instruction::F64Const(_) => stack.push(ValueType::F64),
            Instruction::V128Const(_) => stack.push(ValueType::V128),
            Instruction::RefNull(value_type) => stack.push(value_type),
            Instruction::RefFunc(index) => {
                context.require_function(index)?;
                stack.push(ValueType::FuncRef);
            }
            Instruction::GlobalGet(index) => {
                let (global_type, imported) = context.require_global(index)?;
                if !imported {
                    return Err(Error::Validation(format!(
                        "constant expression refers to module-defined global {}",
                        index
                    )));
                }
                if global_type.mutability != Mutability::Constant {
                    return Err(Error::Validation(format!(
                        "constant expression refers to mutable global {}",
                        index
                    )));
                }
                stack.push(global_type.content_type);
            }
            Instruction::I32Add | Instruction::I32Sub | Instruction::I32Mul => {
                pop(&mut stack, ValueType::I32)?;
                pop(&mut stack, ValueType::I32)?;
                stack.push(ValueType::I32);
            }
            Instruction::I64Add | Instruction::I64Sub | Instruction::I64Mul => {
                pop(&mut stack, ValueType::I64)?;
                pop(&mut stack, ValueType::I64)?;
                stack.push(ValueType::I64);
            }
            Instruction::End => break,
            ref other => {
                return Err(Error::Validation(format!(
                    "non-constant instruction {:?} in constant expression",
                    other
                )))
            }
        }
    }

    if stack.len() != 1 || stack[0] != expected {
        return Err(Error::Validation(format!(
            "constant expression does not evaluate to a single {}",
            expected
        )));
    }
    Ok(())
}
