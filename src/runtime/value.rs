//! Runtime values: the four scalar kinds the interpreter's value stack and locals hold.
//! Post-MVP kinds (`v128`, `funcref`, `externref`) are out of scope.

use crate::module::types::ValueType;
use crate::runtime::error::Trap;
use std::convert::TryFrom;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    pub fn default_for(value_type: ValueType) -> Value {
        match value_type {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::F64 => Value::F64(0.0),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::I32(v as i32)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::I64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::I64(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::F64(v)
    }
}

impl TryFrom<Value> for i32 {
    type Error = Trap;
    fn try_from(value: Value) -> Result<i32, Trap> {
        match value {
            Value::I32(v) => Ok(v),
            other => Err(Trap::stack_type_error("i32", other)),
        }
    }
}

impl TryFrom<Value> for u32 {
    type Error = Trap;
    fn try_from(value: Value) -> Result<u32, Trap> {
        match value {
            Value::I32(v) => Ok(v as u32),
            other => Err(Trap::stack_type_error("i32(u32)", other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = Trap;
    fn try_from(value: Value) -> Result<i64, Trap> {
        match value {
            Value::I64(v) => Ok(v),
            other => Err(Trap::stack_type_error("i64", other)),
        }
    }
}

impl TryFrom<Value> for u64 {
    type Error = Trap;
    fn try_from(value: Value) -> Result<u64, Trap> {
        match value {
            Value::I64(v) => Ok(v as u64),
            other => Err(Trap::stack_type_error("i64(u64)", other)),
        }
    }
}

impl TryFrom<Value> for f32 {
    type Error = Trap;
    fn try_from(value: Value) -> Result<f32, Trap> {
        match value {
            Value::F32(v) => Ok(v),
            other => Err(Trap::stack_type_error("f32", other)),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Trap;
    fn try_from(value: Value) -> Result<f64, Trap> {
        match value {
            Value::F64(v) => Ok(v),
            other => Err(Trap::stack_type_error("f64", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_for_each_value_type() {
        assert_eq!(Value::default_for(ValueType::I32), Value::I32(0));
        assert_eq!(Value::default_for(ValueType::F64), Value::F64(0.0));
    }

    #[test]
    fn mistyped_conversion_traps() {
        let err = i32::try_from(Value::F32(1.0)).unwrap_err();
        assert!(matches!(err, Trap::StackTypeError { .. }));
    }
}
