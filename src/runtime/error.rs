//! Runtime error families: [`LinkError`] during instantiation, [`Trap`] during
//! execution. Kept as two distinct enums since "import couldn't be resolved" and
//! "interpreter hit a trap condition" are different failure phases with different
//! recovery semantics.

use crate::module::types::ValueType;
use crate::runtime::value::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("import {module}::{field} ({kind}) not found")]
    NotFound { module: String, field: String, kind: &'static str },

    #[error("import {module}::{field} has an incompatible function signature")]
    SignatureMismatch { module: String, field: String },

    #[error("import {module}::{field} has incompatible limits")]
    LimitsIncompatible { module: String, field: String },

    #[error("import {module}::{field} has an incompatible global type")]
    GlobalTypeMismatch { module: String, field: String },

    #[error("function section declares {declared} functions but code section has {defined} bodies")]
    FunctionCodeCountMismatch { declared: usize, defined: usize },

    #[error("function index {index} out of bounds (0..{len})")]
    FunctionIndexOutOfBounds { index: u32, len: usize },

    #[error("memory index {index} out of bounds (0..{len})")]
    MemoryIndexOutOfBounds { index: u32, len: usize },

    #[error("table index {index} out of bounds (0..{len})")]
    TableIndexOutOfBounds { index: u32, len: usize },

    #[error("type index {index} out of bounds (0..{len})")]
    TypeIndexOutOfBounds { index: u32, len: usize },

    #[error("exported name {name:?} not found")]
    ExportNotFound { name: String },

    #[error("invalid initializer expression: {reason}")]
    InvalidInitializer { reason: String },
}

/// An unrecoverable execution error. Variants documented with their wire-compatible
/// message carry that exact string; the remaining variants guard interpreter invariants
/// that only fire against a structurally invalid module (validation is out of scope, so
/// these are defensive rather than expected).
#[derive(Debug, Clone, Error)]
pub enum Trap {
    #[error("unreachable")]
    Unreachable,
    #[error("out of bounds memory access")]
    OutOfBoundsMemoryAccess,
    #[error("call stack exhausted")]
    CallStackExhausted,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
    #[error("misaligned memory access")]
    MisalignedMemoryAccess,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("undefined element")]
    UndefinedElement,
    #[error("uninitialized element")]
    UninitializedElement,

    #[error("value stack underflow")]
    ValueStackUnderflow,
    #[error("stack type error: expected {expected}, got {got:?}")]
    StackTypeError { expected: &'static str, got: Value },
    #[error("write to immutable global")]
    ImmutableAssignment,
    #[error("global type mismatch: expected {expected}, got {got}")]
    GlobalTypeMismatch { expected: ValueType, got: ValueType },
    #[error("function return value(s) did not match declared return types")]
    ReturnTypeMismatch,
    #[error("host function trapped: {0}")]
    Host(String),
}

impl Trap {
    pub fn stack_type_error(expected: &'static str, got: Value) -> Trap {
        Trap::StackTypeError { expected, got }
    }

    /// The wire-compatible trap message, for traps that have one; `None` for the
    /// interpreter's internal-invariant variants, which have no such contract.
    pub fn wire_message(&self) -> Option<&'static str> {
        match self {
            Trap::Unreachable => Some("unreachable"),
            Trap::OutOfBoundsMemoryAccess => Some("out of bounds memory access"),
            Trap::CallStackExhausted => Some("call stack exhausted"),
            Trap::IntegerOverflow => Some("integer overflow"),
            Trap::InvalidConversionToInteger => Some("invalid conversion to integer"),
            Trap::MisalignedMemoryAccess => Some("misaligned memory access"),
            Trap::IndirectCallTypeMismatch => Some("indirect call type mismatch"),
            Trap::IntegerDivideByZero => Some("integer divide by zero"),
            Trap::UndefinedElement => Some("undefined element"),
            Trap::UninitializedElement => Some("uninitialized element"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_are_wasm_compatible_strings() {
        assert_eq!(Trap::OutOfBoundsMemoryAccess.wire_message(), Some("out of bounds memory access"));
        assert_eq!(Trap::IndirectCallTypeMismatch.wire_message(), Some("indirect call type mismatch"));
        assert_eq!(Trap::ValueStackUnderflow.wire_message(), None);
    }
}
