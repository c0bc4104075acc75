//! Module instantiation: the ordered linking pipeline, and the `ModuleInstance` it
//! produces. Grounded on `src/exec/instance.rs::Instance::new` (building the function
//! vector, resolving a start function) generalized to accept an arbitrary [`Importer`]
//! instead of a single hard-wired WASI import, and to drive every index space (globals,
//! memories, tables) instead of only functions.

use crate::module::instr::Instruction;
use crate::module::section::ImportDesc;
use crate::module::types::SignatureRef;
use crate::module::Module;
use crate::runtime::error::LinkError;
use crate::runtime::function::FunctionDefinition;
use crate::runtime::importer::{GlobalRef, Importer, MemoryRef};
use crate::runtime::memory::LinearMemory;
use crate::runtime::policy::ExecutionPolicy;
use crate::runtime::table::{FunctionTable, TableRef, TableSlot};
use crate::runtime::value::Value;
use crate::runtime::variable::Variable;
use crate::error::WasmError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::rc::{Rc, Weak};

pub type InstanceHandle = Rc<ModuleInstance>;

#[derive(Debug)]
pub struct ModuleInstance {
    pub types: Vec<SignatureRef>,
    pub functions: Vec<FunctionDefinition>,
    pub memories: Vec<MemoryRef>,
    pub tables: Vec<TableRef>,
    pub globals: Vec<GlobalRef>,
    pub policy: ExecutionPolicy,

    exported_functions: HashMap<String, usize>,
    exported_memories: HashMap<String, usize>,
    exported_tables: HashMap<String, usize>,
    exported_globals: HashMap<String, usize>,
}

impl ModuleInstance {
    pub fn exported_function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.exported_functions.get(name).map(|&i| &self.functions[i])
    }

    pub fn exported_function_index(&self, name: &str) -> Option<usize> {
        self.exported_functions.get(name).copied()
    }

    pub fn exported_memory(&self, name: &str) -> Option<&MemoryRef> {
        self.exported_memories.get(name).map(|&i| &self.memories[i])
    }

    pub fn exported_table(&self, name: &str) -> Option<&TableRef> {
        self.exported_tables.get(name).map(|&i| &self.tables[i])
    }

    pub fn exported_global(&self, name: &str) -> Option<&GlobalRef> {
        self.exported_globals.get(name).map(|&i| &self.globals[i])
    }
}

/// Evaluates a constant initializer expression (global/data/element offset): a flat,
/// unnested sequence of `*.const` or `global.get` instructions. No control flow, no
/// memory access — this is deliberately not routed through the full interpreter.
fn eval_const_expr(instructions: &[Instruction], globals: &[GlobalRef]) -> Result<Value, LinkError> {
    let mut stack = Vec::new();
    for instr in instructions {
        let value = match instr {
            Instruction::I32Const(v) => Value::I32(*v),
            Instruction::I64Const(v) => Value::I64(*v),
            Instruction::F32Const(v) => Value::F32(*v),
            Instruction::F64Const(v) => Value::F64(*v),
            Instruction::GlobalGet(index) => {
                let global = globals.get(*index as usize).ok_or_else(|| LinkError::InvalidInitializer {
                    reason: format!("global index {index} out of range in initializer"),
                })?;
                global.borrow().get()
            }
            other => {
                return Err(LinkError::InvalidInitializer {
                    reason: format!("{} is not valid in a constant expression", other.mnemonic()),
                })
            }
        };
        stack.push(value);
    }
    stack.pop().ok_or_else(|| LinkError::InvalidInitializer { reason: "empty initializer expression".to_string() })
}

fn eval_i32_offset(instructions: &[Instruction], globals: &[GlobalRef]) -> Result<i32, LinkError> {
    match eval_const_expr(instructions, globals)? {
        Value::I32(v) => Ok(v),
        other => Err(LinkError::InvalidInitializer { reason: format!("offset expression produced {other:?}, expected i32") }),
    }
}

/// Runs the full instantiation pipeline against `module`, resolving imports
/// through `importer` and applying `policy` (or its default).
pub fn instantiate(
    module: &Module,
    importer: &dyn Importer,
    policy: Option<ExecutionPolicy>,
) -> Result<InstanceHandle, WasmError> {
    let policy = policy.unwrap_or_default();
    let types: Vec<SignatureRef> = module.types().to_vec();

    let mut functions: Vec<FunctionDefinition> = Vec::new();
    let mut memories: Vec<MemoryRef> = Vec::new();
    let mut tables: Vec<TableRef> = Vec::new();
    let mut globals: Vec<GlobalRef> = Vec::new();

    for import in module.imports() {
        match &import.desc {
            ImportDesc::Function(type_index) => {
                let signature = types.get(*type_index as usize).ok_or(LinkError::TypeIndexOutOfBounds {
                    index: *type_index,
                    len: types.len(),
                })?;
                let def = importer.import_function(&import.module, &import.field, signature).ok_or_else(|| {
                    LinkError::NotFound { module: import.module.clone(), field: import.field.clone(), kind: "function" }
                })?;
                functions.push(def);
            }
            ImportDesc::Memory(memory_type) => {
                let memory = importer.import_memory(&import.module, &import.field, memory_type).ok_or_else(|| {
                    LinkError::NotFound { module: import.module.clone(), field: import.field.clone(), kind: "memory" }
                })?;
                if memory.borrow().page_count() < memory_type.limits.initial {
                    return Err(LinkError::LimitsIncompatible { module: import.module.clone(), field: import.field.clone() }.into());
                }
                memories.push(memory);
            }
            ImportDesc::Table(table_type) => {
                let table = importer.import_table(&import.module, &import.field, table_type).ok_or_else(|| {
                    LinkError::NotFound { module: import.module.clone(), field: import.field.clone(), kind: "table" }
                })?;
                if (table.borrow().len() as u32) < table_type.limits.initial {
                    return Err(LinkError::LimitsIncompatible { module: import.module.clone(), field: import.field.clone() }.into());
                }
                tables.push(table);
            }
            ImportDesc::Global(global_type) => {
                let global = importer.import_global(&import.module, &import.field, global_type).ok_or_else(|| {
                    LinkError::NotFound { module: import.module.clone(), field: import.field.clone(), kind: "global" }
                })?;
                let ok = {
                    let borrowed = global.borrow();
                    borrowed.value_type() == global_type.value_type && borrowed.mutable() == global_type.mutable
                };
                if !ok {
                    return Err(LinkError::GlobalTypeMismatch { module: import.module.clone(), field: import.field.clone() }.into());
                }
                globals.push(global);
            }
        }
    }

    for entry in module.globals() {
        let value = eval_const_expr(&entry.init, &globals)?;
        globals.push(Rc::new(RefCell::new(Variable::new(value, entry.global_type.mutable))));
    }

    for memory_type in module.memories() {
        memories.push(Rc::new(RefCell::new(LinearMemory::new(
            memory_type.limits.initial,
            memory_type.limits.maximum,
            policy.max_memory_size,
        ))));
    }
    for segment in module.data_segments() {
        let memory = memories.get(segment.memory_index as usize).ok_or(LinkError::MemoryIndexOutOfBounds {
            index: segment.memory_index,
            len: memories.len(),
        })?;
        let offset = eval_i32_offset(&segment.offset, &globals)?;
        memory.borrow_mut().copy_from(offset as u32 as u64, &segment.bytes)?;
    }

    let declared = module.function_type_indices();
    let bodies = module.code_bodies();
    if declared.len() != bodies.len() {
        return Err(LinkError::FunctionCodeCountMismatch { declared: declared.len(), defined: bodies.len() }.into());
    }

    let instance = Rc::new_cyclic(|weak_self: &Weak<ModuleInstance>| {
        for (type_index, body) in declared.iter().zip(bodies.iter()) {
            let signature = types[*type_index as usize].clone();
            let mut locals = Vec::new();
            for (count, value_type) in &body.locals {
                for _ in 0..*count {
                    locals.push(*value_type);
                }
            }
            functions.push(FunctionDefinition::Interpreted {
                signature,
                locals,
                body: Rc::new(body.body.clone()),
                instance: weak_self.clone(),
            });
        }

        for table_type in module.tables() {
            tables.push(Rc::new(RefCell::new(FunctionTable::new(table_type.limits.initial, table_type.limits.maximum))));
        }

        let mut exported_functions = HashMap::new();
        let mut exported_memories = HashMap::new();
        let mut exported_tables = HashMap::new();
        let mut exported_globals = HashMap::new();
        for export in module.exports() {
            match export.desc {
                crate::module::section::ExportDesc::Function(i) => {
                    exported_functions.insert(export.name.clone(), i as usize);
                }
                crate::module::section::ExportDesc::Memory(i) => {
                    exported_memories.insert(export.name.clone(), i as usize);
                }
                crate::module::section::ExportDesc::Table(i) => {
                    exported_tables.insert(export.name.clone(), i as usize);
                }
                crate::module::section::ExportDesc::Global(i) => {
                    exported_globals.insert(export.name.clone(), i as usize);
                }
            }
        }

        ModuleInstance {
            types,
            functions,
            memories,
            tables,
            globals,
            policy,
            exported_functions,
            exported_memories,
            exported_tables,
            exported_globals,
        }
    });

    for segment in module.element_segments() {
        let table = instance.tables.get(segment.table_index as usize).ok_or(LinkError::TableIndexOutOfBounds {
            index: segment.table_index,
            len: instance.tables.len(),
        })?;
        let offset = u32::try_from(eval_i32_offset(&segment.offset, &instance.globals)?)
            .map_err(|_| LinkError::InvalidInitializer { reason: "negative element offset".to_string() })?;
        let mut table = table.borrow_mut();
        for (i, function_index) in segment.function_indices.iter().enumerate() {
            table.set(offset + i as u32, TableSlot::Function(*function_index as usize))?;
        }
    }

    if let Some(start_index) = module.start_function() {
        crate::runtime::interp::call_function(&instance, start_index as usize, &[])?;
    }

    Ok(instance)
}
