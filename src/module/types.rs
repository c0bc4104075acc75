//! The Wasm MVP type model: value types, block types, function signatures, limits,
//! and the memory/table/global type descriptors.
//!
//! <https://webassembly.github.io/spec/core/binary/types.html>

use crate::leb128::{self, CodecResult};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use std::io::{Read, Write};
use std::rc::Rc;

/// A scalar value type. Encoded as a negative single-byte tag.
#[derive(Eq, PartialEq, Debug, Copy, Clone, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub const I32_TAG: i8 = -0x01;
    pub const I64_TAG: i8 = -0x02;
    pub const F32_TAG: i8 = -0x03;
    pub const F64_TAG: i8 = -0x04;

    pub fn decode(byte: u8) -> Option<ValueType> {
        match byte as i8 {
            Self::I32_TAG => Some(ValueType::I32),
            Self::I64_TAG => Some(ValueType::I64),
            Self::F32_TAG => Some(ValueType::F32),
            Self::F64_TAG => Some(ValueType::F64),
            _ => None,
        }
    }

    pub fn encode(self) -> u8 {
        let tag = match self {
            ValueType::I32 => Self::I32_TAG,
            ValueType::I64 => Self::I64_TAG,
            ValueType::F32 => Self::F32_TAG,
            ValueType::F64 => Self::F64_TAG,
        };
        tag as u8
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

/// The type carried by a `block`/`loop`/`if` immediate: either a scalar result type or
/// `empty` (no result). The MVP also reserves `anyfunc`/`funcdef` pseudo-tags that never
/// appear as a block type but share the same signed tag-byte space.
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub enum BlockType {
    Empty,
    Value(ValueType),
}

impl BlockType {
    pub const EMPTY_TAG: i8 = -0x40;
    pub const ANYFUNC_TAG: i8 = -0x10;
    pub const FUNCDEF_TAG: i8 = -0x20;

    pub fn decode(byte: u8) -> Option<BlockType> {
        if byte as i8 == Self::EMPTY_TAG {
            return Some(BlockType::Empty);
        }
        ValueType::decode(byte).map(BlockType::Value)
    }

    pub fn encode(self) -> u8 {
        match self {
            BlockType::Empty => Self::EMPTY_TAG as u8,
            BlockType::Value(value_type) => value_type.encode(),
        }
    }

    /// The number of values a block of this type leaves on the stack on normal
    /// completion: 0 or 1 in the MVP.
    pub fn arity(self) -> usize {
        match self {
            BlockType::Empty => 0,
            BlockType::Value(_) => 1,
        }
    }
}

/// An ordered function signature: parameter types followed by result types. The MVP
/// restricts `results` to 0 or 1 entries, but the model itself does not enforce that so
/// callers constructing signatures programmatically are not artificially constrained.
#[derive(Eq, PartialEq, Debug, Default, Clone)]
pub struct FunctionSignature {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FunctionSignature {
    pub const TAG: u8 = 0x60;

    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        Self { params, results }
    }

    pub fn decode(reader: &mut impl Read) -> CodecResult<FunctionSignature> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        debug_assert_eq!(buf[0], Self::TAG, "function signature must start with 0x60");

        let num_params = leb128::read_varuint32(reader)? as usize;
        let mut params = Vec::with_capacity(num_params);
        for _ in 0..num_params {
            params.push(decode_value_type(reader)?);
        }

        let num_results = leb128::read_varuint32(reader)? as usize;
        let mut results = Vec::with_capacity(num_results);
        for _ in 0..num_results {
            results.push(decode_value_type(reader)?);
        }

        Ok(FunctionSignature { params, results })
    }

    pub fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        writer.write_all(&[Self::TAG])?;
        leb128::write_varuint32(writer, self.params.len() as u32)?;
        for param in &self.params {
            writer.write_all(&[param.encode()])?;
        }
        leb128::write_varuint32(writer, self.results.len() as u32)?;
        for result in &self.results {
            writer.write_all(&[result.encode()])?;
        }
        Ok(())
    }

    /// Exact value-by-value comparison, used by `call_indirect` type checks and the
    /// module-exports importer's function compatibility check.
    pub fn matches(&self, other: &FunctionSignature) -> bool {
        self.params == other.params && self.results == other.results
    }
}

fn decode_value_type(reader: &mut impl Read) -> CodecResult<ValueType> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    ValueType::decode(buf[0]).ok_or_else(|| {
        crate::leb128::CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown value type byte {:#x}", buf[0]),
        ))
    })
}

/// A shared, interned function signature, referenced by the type section, every import,
/// and every defined function via an index into that table.
pub type SignatureRef = Rc<FunctionSignature>;

/// `initial`/`maximum` page or element counts, as used by memory and table types.
/// Encoded with a 1-bit "has-max" flag followed by LEB values.
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct Limits {
    pub initial: u32,
    pub maximum: Option<u32>,
}

impl Limits {
    pub fn decode(reader: &mut impl Read) -> CodecResult<Limits> {
        let has_max = leb128::read_varuint1(reader)?;
        let initial = leb128::read_varuint32(reader)?;
        let maximum = if has_max {
            Some(leb128::read_varuint32(reader)?)
        } else {
            None
        };
        Ok(Limits { initial, maximum })
    }

    pub fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        leb128::write_varuint1(writer, self.maximum.is_some())?;
        leb128::write_varuint32(writer, self.initial)?;
        if let Some(maximum) = self.maximum {
            leb128::write_varuint32(writer, maximum)?;
        }
        Ok(())
    }
}

/// The MVP's single element-type tag: `anyfunc` (0x70).
#[derive(Eq, PartialEq, Debug, Copy, Clone, TryFromPrimitive)]
#[repr(u8)]
pub enum ElementType {
    AnyFunc = 0x70,
}

#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct TableType {
    pub element_type: ElementType,
    pub limits: Limits,
}

impl TableType {
    pub fn decode(reader: &mut impl Read) -> CodecResult<TableType> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        let element_type = ElementType::try_from(buf[0]).map_err(|_| {
            crate::leb128::CodecError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown element type byte {:#x}", buf[0]),
            ))
        })?;
        let limits = Limits::decode(reader)?;
        Ok(TableType {
            element_type,
            limits,
        })
    }

    pub fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        writer.write_all(&[self.element_type as u8])?;
        self.limits.encode(writer)
    }
}

#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct MemoryType {
    pub limits: Limits,
}

impl MemoryType {
    pub fn decode(reader: &mut impl Read) -> CodecResult<MemoryType> {
        Ok(MemoryType {
            limits: Limits::decode(reader)?,
        })
    }

    pub fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        self.limits.encode(writer)
    }
}

#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

impl GlobalType {
    pub fn decode(reader: &mut impl Read) -> CodecResult<GlobalType> {
        let value_type = decode_value_type(reader)?;
        let mutable = leb128::read_varuint1(reader)?;
        Ok(GlobalType {
            value_type,
            mutable,
        })
    }

    pub fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        writer.write_all(&[self.value_type.encode()])?;
        leb128::write_varuint1(writer, self.mutable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_round_trip() {
        for ty in [ValueType::I32, ValueType::I64, ValueType::F32, ValueType::F64] {
            assert_eq!(ValueType::decode(ty.encode()), Some(ty));
        }
    }

    #[test]
    fn block_type_empty_and_value() {
        assert_eq!(BlockType::decode(BlockType::Empty.encode()), Some(BlockType::Empty));
        assert_eq!(BlockType::Empty.arity(), 0);
        assert_eq!(BlockType::Value(ValueType::I32).arity(), 1);
    }

    #[test]
    fn function_signature_round_trip() {
        let sig = FunctionSignature::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32]);
        let mut buf = Vec::new();
        sig.encode(&mut buf).unwrap();
        let decoded = FunctionSignature::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn limits_with_and_without_max() {
        for limits in [
            Limits { initial: 1, maximum: None },
            Limits { initial: 1, maximum: Some(3) },
        ] {
            let mut buf = Vec::new();
            limits.encode(&mut buf).unwrap();
            assert_eq!(Limits::decode(&mut buf.as_slice()).unwrap(), limits);
        }
    }
}
