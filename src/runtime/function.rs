//! Function definitions: the three ways a callable can be backed. `Throw` lets an
//! importer install a function that always fails without needing a sentinel `Result`
//! threaded through every call site.

use crate::module::types::{SignatureRef, ValueType};
use crate::module::instr::Instruction;
use crate::runtime::error::Trap;
use crate::runtime::instance::ModuleInstance;
use crate::runtime::value::Value;
use std::rc::{Rc, Weak};

pub type HostFn = dyn Fn(&[Value]) -> Result<Vec<Value>, Trap>;

#[derive(Clone)]
pub enum FunctionDefinition {
    /// A Wasm-defined function. Holds a weak back-reference to its owning instance
    /// (needed to reach memories/globals/tables during execution) rather than a second
    /// owning `Rc`, so instance and functions don't form a reference cycle.
    Interpreted {
        signature: SignatureRef,
        locals: Vec<ValueType>,
        body: Rc<Vec<Instruction>>,
        instance: Weak<ModuleInstance>,
    },
    /// A host function supplied by an importer.
    Delegate { signature: SignatureRef, callback: Rc<HostFn> },
    /// An import that failed to resolve to anything callable but was installed anyway
    /// so an uncalled import doesn't block instantiation until it's actually invoked.
    Throw { signature: SignatureRef, error: Trap },
}

impl FunctionDefinition {
    pub fn signature(&self) -> &SignatureRef {
        match self {
            FunctionDefinition::Interpreted { signature, .. } => signature,
            FunctionDefinition::Delegate { signature, .. } => signature,
            FunctionDefinition::Throw { signature, .. } => signature,
        }
    }
}

impl std::fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionDefinition::Interpreted { signature, .. } => {
                f.debug_struct("Interpreted").field("signature", signature).finish()
            }
            FunctionDefinition::Delegate { signature, .. } => {
                f.debug_struct("Delegate").field("signature", signature).finish()
            }
            FunctionDefinition::Throw { signature, error } => {
                f.debug_struct("Throw").field("signature", signature).field("error", error).finish()
            }
        }
    }
}
