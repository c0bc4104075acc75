//! A WebAssembly MVP binary codec and stack-machine interpreter: parse a `.wasm` module,
//! instantiate it against a set of imports, and call its exported functions.
//!
//! `module` holds the static representation of a decoded binary (types, instructions,
//! sections) and the reader/writer that move between it and bytes. `runtime` holds
//! everything that exists only once a module is instantiated: linear memories, tables,
//! globals, and the interpreter that executes function bodies against them.

pub mod error;
pub mod leb128;
pub mod module;
pub mod runtime;

pub use error::WasmError;
pub use module::reader::decode_module;
pub use module::writer::encode_module;
pub use module::Module;
pub use runtime::instance::{instantiate, InstanceHandle, ModuleInstance};
pub use runtime::importer::{EmptyImporter, Importer, ModuleExportsImporter, NamespacedImporter};
pub use runtime::interp::call_function;
pub use runtime::policy::ExecutionPolicy;
pub use runtime::value::Value;

/// Decodes `bytes` into a [`Module`] and immediately instantiates it, the common case for
/// callers who don't need the intermediate `Module` for anything else.
pub fn load(bytes: &[u8], importer: &dyn Importer, policy: Option<ExecutionPolicy>) -> Result<InstanceHandle, WasmError> {
    let module = decode_module(&mut std::io::Cursor::new(bytes))?;
    Ok(instantiate(&module, importer, policy)?)
}

/// Looks up an export by name and calls it, the common case for callers who don't need
/// the numeric function index `call_function` takes directly.
pub fn call_export(instance: &InstanceHandle, name: &str, args: &[Value]) -> Result<Vec<Value>, WasmError> {
    let index = instance
        .exported_function_index(name)
        .ok_or_else(|| runtime::error::LinkError::ExportNotFound { name: name.to_string() })?;
    Ok(call_function(instance, index, args)?)
}
