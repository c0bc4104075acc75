//! The capability through which instantiation resolves imports, keyed by (module, field)
//! the same way exports are named.

use crate::module::types::{FunctionSignature, GlobalType, MemoryType, TableType};
use crate::runtime::function::FunctionDefinition;
use crate::runtime::memory::LinearMemory;
use crate::runtime::table::TableRef;
use crate::runtime::variable::Variable;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type MemoryRef = Rc<RefCell<LinearMemory>>;
pub type GlobalRef = Rc<RefCell<Variable>>;

/// Resolves imports by (module, field). Returning `None` means "not found" and causes
/// instantiation to raise a link error; the function importer is additionally expected
/// to reject signature mismatches by returning `None`. Memories, tables, and globals
/// are returned as shared cells rather than owned values: once linked, writes on either
/// side of the import are visible to both instances, matching Wasm's import semantics.
pub trait Importer {
    fn import_function(&self, module: &str, field: &str, expected: &FunctionSignature) -> Option<FunctionDefinition>;
    fn import_global(&self, module: &str, field: &str, expected: &GlobalType) -> Option<GlobalRef>;
    fn import_memory(&self, module: &str, field: &str, expected: &MemoryType) -> Option<MemoryRef>;
    fn import_table(&self, module: &str, field: &str, expected: &TableType) -> Option<TableRef>;
}

/// An importer that never resolves anything; useful as a baseline for modules with no
/// imports, or composed inside a [`NamespacedImporter`] as the fallback.
pub struct EmptyImporter;

impl Importer for EmptyImporter {
    fn import_function(&self, _module: &str, _field: &str, _expected: &FunctionSignature) -> Option<FunctionDefinition> {
        None
    }
    fn import_global(&self, _module: &str, _field: &str, _expected: &GlobalType) -> Option<GlobalRef> {
        None
    }
    fn import_memory(&self, _module: &str, _field: &str, _expected: &MemoryType) -> Option<MemoryRef> {
        None
    }
    fn import_table(&self, _module: &str, _field: &str, _expected: &TableType) -> Option<TableRef> {
        None
    }
}

/// Dispatches to a per-module-name sub-importer; modules not registered fall through to
/// [`EmptyImporter`].
#[derive(Default)]
pub struct NamespacedImporter {
    namespaces: HashMap<String, Box<dyn Importer>>,
}

impl NamespacedImporter {
    pub fn new() -> NamespacedImporter {
        NamespacedImporter::default()
    }

    pub fn register(&mut self, module: impl Into<String>, importer: Box<dyn Importer>) {
        self.namespaces.insert(module.into(), importer);
    }

    fn sub_importer(&self, module: &str) -> Option<&dyn Importer> {
        self.namespaces.get(module).map(|b| b.as_ref())
    }
}

impl Importer for NamespacedImporter {
    fn import_function(&self, module: &str, field: &str, expected: &FunctionSignature) -> Option<FunctionDefinition> {
        self.sub_importer(module)?.import_function(module, field, expected)
    }
    fn import_global(&self, module: &str, field: &str, expected: &GlobalType) -> Option<GlobalRef> {
        self.sub_importer(module)?.import_global(module, field, expected)
    }
    fn import_memory(&self, module: &str, field: &str, expected: &MemoryType) -> Option<MemoryRef> {
        self.sub_importer(module)?.import_memory(module, field, expected)
    }
    fn import_table(&self, module: &str, field: &str, expected: &TableType) -> Option<TableRef> {
        self.sub_importer(module)?.import_table(module, field, expected)
    }
}

/// Exposes one module instance's exports as importable entities for another instance,
/// applying a compatibility check: exact signature match for functions,
/// `initial ≥ requested` for tables/memories, exact content type and mutability for
/// globals. Memory/table/global handles are the instance's actual shared cells, not
/// copies, so the two instances observe each other's writes after linking.
pub struct ModuleExportsImporter {
    instance: crate::runtime::instance::InstanceHandle,
}

impl ModuleExportsImporter {
    pub fn new(instance: crate::runtime::instance::InstanceHandle) -> ModuleExportsImporter {
        ModuleExportsImporter { instance }
    }
}

impl Importer for ModuleExportsImporter {
    fn import_function(&self, _module: &str, field: &str, expected: &FunctionSignature) -> Option<FunctionDefinition> {
        let def = self.instance.exported_function(field)?;
        if def.signature().matches(expected) {
            Some(def.clone())
        } else {
            None
        }
    }

    fn import_global(&self, _module: &str, field: &str, expected: &GlobalType) -> Option<GlobalRef> {
        let global = self.instance.exported_global(field)?;
        let matches = {
            let borrowed = global.borrow();
            borrowed.value_type() == expected.value_type && borrowed.mutable() == expected.mutable
        };
        matches.then(|| global.clone())
    }

    fn import_memory(&self, _module: &str, field: &str, expected: &MemoryType) -> Option<MemoryRef> {
        let memory = self.instance.exported_memory(field)?;
        let satisfies = memory.borrow().page_count() >= expected.limits.initial;
        satisfies.then(|| memory.clone())
    }

    fn import_table(&self, _module: &str, field: &str, expected: &TableType) -> Option<TableRef> {
        let table = self.instance.exported_table(field)?;
        let satisfies = table.borrow().len() as u32 >= expected.limits.initial;
        satisfies.then(|| table.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_importer_resolves_nothing() {
        let importer = EmptyImporter;
        let sig = FunctionSignature::default();
        assert!(importer.import_function("env", "f", &sig).is_none());
    }

    #[test]
    fn namespaced_importer_falls_through_unregistered_modules() {
        let importer = NamespacedImporter::new();
        let sig = FunctionSignature::default();
        assert!(importer.import_function("unregistered", "f", &sig).is_none());
    }
}
