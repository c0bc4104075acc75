//! Section framing and the typed payload of every MVP section kind.
//!
//! <https://webassembly.github.io/spec/core/binary/modules.html#sections>

use crate::leb128::{self, CodecError, CodecResult};
use crate::module::instr::{decode_instructions, encode_instructions, Instruction};
use crate::module::name::NameSection;
use crate::module::types::{
    FunctionSignature, GlobalType, MemoryType, SignatureRef, TableType, ValueType,
};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use std::io::{Read, Write};
use std::rc::Rc;

#[derive(Eq, PartialEq, Debug, Copy, Clone, TryFromPrimitive)]
#[repr(u8)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ImportDesc {
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(PartialEq, Debug, Clone)]
pub struct ImportEntry {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ExportDesc {
    Function(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

#[derive(PartialEq, Debug, Clone)]
pub struct ExportEntry {
    pub name: String,
    pub desc: ExportDesc,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GlobalEntry {
    pub global_type: GlobalType,
    pub init: Vec<Instruction>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ElementSegment {
    pub table_index: u32,
    pub offset: Vec<Instruction>,
    pub function_indices: Vec<u32>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DataSegment {
    pub memory_index: u32,
    pub offset: Vec<Instruction>,
    pub bytes: Vec<u8>,
}

/// A single function's local declarations and body, paired by position with the
/// Function section's type-index list. Carries its own extra-payload slot since the
/// body is itself a length-prefixed record nested inside the Code section's payload.
#[derive(PartialEq, Debug, Clone)]
pub struct FunctionBody {
    pub locals: Vec<(u32, ValueType)>,
    pub body: Vec<Instruction>,
    pub extra: Vec<u8>,
}

impl FunctionBody {
    fn decode(reader: &mut impl Read) -> CodecResult<FunctionBody> {
        let raw = leb128::read_bytes(reader)?;
        let mut cursor = raw.as_slice();

        let group_count = leb128::read_varuint32(&mut cursor)? as usize;
        let mut locals = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            let count = leb128::read_varuint32(&mut cursor)?;
            let mut buf = [0u8; 1];
            cursor.read_exact(&mut buf)?;
            let value_type = ValueType::decode(buf[0]).ok_or_else(|| invalid_data("unknown local type"))?;
            locals.push((count, value_type));
        }

        let body = decode_instructions(&mut cursor)?;
        let extra = cursor.to_vec();
        Ok(FunctionBody { locals, body, extra })
    }

    fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        leb128::write_length_prefixed(writer, |scratch| {
            leb128::write_varuint32(scratch, self.locals.len() as u32)?;
            for (count, value_type) in &self.locals {
                leb128::write_varuint32(scratch, *count)?;
                scratch.write_all(&[value_type.encode()])?;
            }
            encode_instructions(&self.body, scratch)?;
            scratch.write_all(&[crate::module::instr::Opcode::End as u8])?;
            scratch.write_all(&self.extra)?;
            Ok(())
        })
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum CustomPayload {
    Name(NameSection),
    Opaque(Vec<u8>),
}

#[derive(PartialEq, Debug, Clone)]
pub struct CustomSection {
    pub name: String,
    pub payload: CustomPayload,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct TypeSection {
    pub types: Vec<SignatureRef>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct ImportSection {
    pub imports: Vec<ImportEntry>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct FunctionSection {
    pub type_indices: Vec<u32>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct TableSection {
    pub tables: Vec<TableType>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct MemorySection {
    pub memories: Vec<MemoryType>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct GlobalSection {
    pub globals: Vec<GlobalEntry>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct ExportSection {
    pub exports: Vec<ExportEntry>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StartSection {
    pub function_index: u32,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct ElementSection {
    pub segments: Vec<ElementSegment>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct CodeSection {
    pub bodies: Vec<FunctionBody>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct DataSection {
    pub segments: Vec<DataSegment>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct UnknownSection {
    pub code: u8,
    pub payload: Vec<u8>,
}

/// One decoded section: a typed payload plus (for every typed kind) an extra-payload
/// slot of bytes that followed the logical payload within the declared section length.
#[derive(PartialEq, Debug, Clone)]
pub enum Section {
    Custom(CustomSection),
    Type(TypeSection, Vec<u8>),
    Import(ImportSection, Vec<u8>),
    Function(FunctionSection, Vec<u8>),
    Table(TableSection, Vec<u8>),
    Memory(MemorySection, Vec<u8>),
    Global(GlobalSection, Vec<u8>),
    Export(ExportSection, Vec<u8>),
    Start(StartSection, Vec<u8>),
    Element(ElementSection, Vec<u8>),
    Code(CodeSection, Vec<u8>),
    Data(DataSection, Vec<u8>),
    Unknown(UnknownSection),
}

fn invalid_data(message: &str) -> CodecError {
    CodecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string()))
}

impl Section {
    pub fn id(&self) -> Option<SectionId> {
        match self {
            Section::Custom(_) => Some(SectionId::Custom),
            Section::Type(..) => Some(SectionId::Type),
            Section::Import(..) => Some(SectionId::Import),
            Section::Function(..) => Some(SectionId::Function),
            Section::Table(..) => Some(SectionId::Table),
            Section::Memory(..) => Some(SectionId::Memory),
            Section::Global(..) => Some(SectionId::Global),
            Section::Export(..) => Some(SectionId::Export),
            Section::Start(..) => Some(SectionId::Start),
            Section::Element(..) => Some(SectionId::Element),
            Section::Code(..) => Some(SectionId::Code),
            Section::Data(..) => Some(SectionId::Data),
            Section::Unknown(_) => None,
        }
    }

    /// The raw section code byte, including codes this crate doesn't recognize.
    pub fn code(&self) -> u8 {
        match self {
            Section::Unknown(u) => u.code,
            other => other.id().expect("non-Unknown sections always have an id") as u8,
        }
    }

    pub fn decode(reader: &mut impl Read) -> CodecResult<Section> {
        let code = leb128::read_varuint7(reader)?;
        let payload = leb128::read_bytes(reader)?;
        let mut cursor = payload.as_slice();

        let section = match SectionId::try_from(code) {
            Ok(SectionId::Custom) => {
                let name = leb128::read_string(&mut cursor)?;
                let payload = if name == "name" {
                    CustomPayload::Name(NameSection::decode(&mut cursor)?)
                } else {
                    CustomPayload::Opaque(cursor.to_vec())
                };
                return Ok(Section::Custom(CustomSection { name, payload }));
            }
            Ok(SectionId::Type) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut types = Vec::with_capacity(count);
                for _ in 0..count {
                    types.push(Rc::new(FunctionSignature::decode(&mut cursor)?));
                }
                Section::Type(TypeSection { types }, Vec::new())
            }
            Ok(SectionId::Import) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut imports = Vec::with_capacity(count);
                for _ in 0..count {
                    let module = leb128::read_string(&mut cursor)?;
                    let field = leb128::read_string(&mut cursor)?;
                    let mut kind_byte = [0u8; 1];
                    cursor.read_exact(&mut kind_byte)?;
                    let desc = match kind_byte[0] {
                        0x00 => ImportDesc::Function(leb128::read_varuint32(&mut cursor)?),
                        0x01 => ImportDesc::Table(TableType::decode(&mut cursor)?),
                        0x02 => ImportDesc::Memory(MemoryType::decode(&mut cursor)?),
                        0x03 => ImportDesc::Global(GlobalType::decode(&mut cursor)?),
                        other => return Err(invalid_data(&format!("unknown import kind {other:#x}"))),
                    };
                    imports.push(ImportEntry { module, field, desc });
                }
                Section::Import(ImportSection { imports }, Vec::new())
            }
            Ok(SectionId::Function) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut type_indices = Vec::with_capacity(count);
                for _ in 0..count {
                    type_indices.push(leb128::read_varuint32(&mut cursor)?);
                }
                Section::Function(FunctionSection { type_indices }, Vec::new())
            }
            Ok(SectionId::Table) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut tables = Vec::with_capacity(count);
                for _ in 0..count {
                    tables.push(TableType::decode(&mut cursor)?);
                }
                Section::Table(TableSection { tables }, Vec::new())
            }
            Ok(SectionId::Memory) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut memories = Vec::with_capacity(count);
                for _ in 0..count {
                    memories.push(MemoryType::decode(&mut cursor)?);
                }
                Section::Memory(MemorySection { memories }, Vec::new())
            }
            Ok(SectionId::Global) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut globals = Vec::with_capacity(count);
                for _ in 0..count {
                    let global_type = GlobalType::decode(&mut cursor)?;
                    let init = decode_instructions(&mut cursor)?;
                    globals.push(GlobalEntry { global_type, init });
                }
                Section::Global(GlobalSection { globals }, Vec::new())
            }
            Ok(SectionId::Export) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut exports = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = leb128::read_string(&mut cursor)?;
                    let mut kind_byte = [0u8; 1];
                    cursor.read_exact(&mut kind_byte)?;
                    let index = leb128::read_varuint32(&mut cursor)?;
                    let desc = match kind_byte[0] {
                        0x00 => ExportDesc::Function(index),
                        0x01 => ExportDesc::Table(index),
                        0x02 => ExportDesc::Memory(index),
                        0x03 => ExportDesc::Global(index),
                        other => return Err(invalid_data(&format!("unknown export kind {other:#x}"))),
                    };
                    exports.push(ExportEntry { name, desc });
                }
                Section::Export(ExportSection { exports }, Vec::new())
            }
            Ok(SectionId::Start) => {
                let function_index = leb128::read_varuint32(&mut cursor)?;
                Section::Start(StartSection { function_index }, Vec::new())
            }
            Ok(SectionId::Element) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut segments = Vec::with_capacity(count);
                for _ in 0..count {
                    let table_index = leb128::read_varuint32(&mut cursor)?;
                    let offset = decode_instructions(&mut cursor)?;
                    let func_count = leb128::read_varuint32(&mut cursor)? as usize;
                    let mut function_indices = Vec::with_capacity(func_count);
                    for _ in 0..func_count {
                        function_indices.push(leb128::read_varuint32(&mut cursor)?);
                    }
                    segments.push(ElementSegment { table_index, offset, function_indices });
                }
                Section::Element(ElementSection { segments }, Vec::new())
            }
            Ok(SectionId::Code) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut bodies = Vec::with_capacity(count);
                for _ in 0..count {
                    bodies.push(FunctionBody::decode(&mut cursor)?);
                }
                Section::Code(CodeSection { bodies }, Vec::new())
            }
            Ok(SectionId::Data) => {
                let count = leb128::read_varuint32(&mut cursor)? as usize;
                let mut segments = Vec::with_capacity(count);
                for _ in 0..count {
                    let memory_index = leb128::read_varuint32(&mut cursor)?;
                    let offset = decode_instructions(&mut cursor)?;
                    let bytes = leb128::read_bytes(&mut cursor)?;
                    segments.push(DataSegment { memory_index, offset, bytes });
                }
                Section::Data(DataSection { segments }, Vec::new())
            }
            Err(_) => return Ok(Section::Unknown(UnknownSection { code, payload })),
        };

        Ok(attach_extra(section, cursor.to_vec()))
    }

    pub fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        writer.write_all(&[self.code()])?;
        leb128::write_length_prefixed(writer, |scratch| self.encode_payload(scratch))
    }

    fn encode_payload(&self, scratch: &mut Vec<u8>) -> CodecResult<()> {
        match self {
            Section::Custom(custom) => {
                leb128::write_string(scratch, &custom.name)?;
                match &custom.payload {
                    CustomPayload::Name(name_section) => name_section.encode(scratch),
                    CustomPayload::Opaque(bytes) => {
                        scratch.write_all(bytes)?;
                        Ok(())
                    }
                }
            }
            Section::Type(type_section, extra) => {
                leb128::write_varuint32(scratch, type_section.types.len() as u32)?;
                for sig in &type_section.types {
                    sig.encode(scratch)?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Import(import_section, extra) => {
                leb128::write_varuint32(scratch, import_section.imports.len() as u32)?;
                for entry in &import_section.imports {
                    leb128::write_string(scratch, &entry.module)?;
                    leb128::write_string(scratch, &entry.field)?;
                    match &entry.desc {
                        ImportDesc::Function(type_index) => {
                            scratch.write_all(&[0x00])?;
                            leb128::write_varuint32(scratch, *type_index)?;
                        }
                        ImportDesc::Table(table_type) => {
                            scratch.write_all(&[0x01])?;
                            table_type.encode(scratch)?;
                        }
                        ImportDesc::Memory(memory_type) => {
                            scratch.write_all(&[0x02])?;
                            memory_type.encode(scratch)?;
                        }
                        ImportDesc::Global(global_type) => {
                            scratch.write_all(&[0x03])?;
                            global_type.encode(scratch)?;
                        }
                    }
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Function(function_section, extra) => {
                leb128::write_varuint32(scratch, function_section.type_indices.len() as u32)?;
                for type_index in &function_section.type_indices {
                    leb128::write_varuint32(scratch, *type_index)?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Table(table_section, extra) => {
                leb128::write_varuint32(scratch, table_section.tables.len() as u32)?;
                for table in &table_section.tables {
                    table.encode(scratch)?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Memory(memory_section, extra) => {
                leb128::write_varuint32(scratch, memory_section.memories.len() as u32)?;
                for memory in &memory_section.memories {
                    memory.encode(scratch)?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Global(global_section, extra) => {
                leb128::write_varuint32(scratch, global_section.globals.len() as u32)?;
                for global in &global_section.globals {
                    global.global_type.encode(scratch)?;
                    encode_instructions(&global.init, scratch)?;
                    scratch.write_all(&[crate::module::instr::Opcode::End as u8])?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Export(export_section, extra) => {
                leb128::write_varuint32(scratch, export_section.exports.len() as u32)?;
                for export in &export_section.exports {
                    leb128::write_string(scratch, &export.name)?;
                    let (kind, index) = match export.desc {
                        ExportDesc::Function(i) => (0x00, i),
                        ExportDesc::Table(i) => (0x01, i),
                        ExportDesc::Memory(i) => (0x02, i),
                        ExportDesc::Global(i) => (0x03, i),
                    };
                    scratch.write_all(&[kind])?;
                    leb128::write_varuint32(scratch, index)?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Start(start_section, extra) => {
                leb128::write_varuint32(scratch, start_section.function_index)?;
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Element(element_section, extra) => {
                leb128::write_varuint32(scratch, element_section.segments.len() as u32)?;
                for segment in &element_section.segments {
                    leb128::write_varuint32(scratch, segment.table_index)?;
                    encode_instructions(&segment.offset, scratch)?;
                    scratch.write_all(&[crate::module::instr::Opcode::End as u8])?;
                    leb128::write_varuint32(scratch, segment.function_indices.len() as u32)?;
                    for function_index in &segment.function_indices {
                        leb128::write_varuint32(scratch, *function_index)?;
                    }
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Code(code_section, extra) => {
                leb128::write_varuint32(scratch, code_section.bodies.len() as u32)?;
                for body in &code_section.bodies {
                    body.encode(scratch)?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Data(data_section, extra) => {
                leb128::write_varuint32(scratch, data_section.segments.len() as u32)?;
                for segment in &data_section.segments {
                    leb128::write_varuint32(scratch, segment.memory_index)?;
                    encode_instructions(&segment.offset, scratch)?;
                    scratch.write_all(&[crate::module::instr::Opcode::End as u8])?;
                    leb128::write_bytes(scratch, &segment.bytes)?;
                }
                scratch.write_all(extra)?;
                Ok(())
            }
            Section::Unknown(unknown) => {
                scratch.write_all(&unknown.payload)?;
                Ok(())
            }
        }
    }
}

fn attach_extra(section: Section, extra_bytes: Vec<u8>) -> Section {
    match section {
        Section::Type(s, _) => Section::Type(s, extra_bytes),
        Section::Import(s, _) => Section::Import(s, extra_bytes),
        Section::Function(s, _) => Section::Function(s, extra_bytes),
        Section::Table(s, _) => Section::Table(s, extra_bytes),
        Section::Memory(s, _) => Section::Memory(s, extra_bytes),
        Section::Global(s, _) => Section::Global(s, extra_bytes),
        Section::Export(s, _) => Section::Export(s, extra_bytes),
        Section::Start(s, _) => Section::Start(s, extra_bytes),
        Section::Element(s, _) => Section::Element(s, extra_bytes),
        Section::Code(s, _) => Section::Code(s, extra_bytes),
        Section::Data(s, _) => Section::Data(s, extra_bytes),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::types::ValueType;

    #[test]
    fn type_section_round_trip() {
        let section = Section::Type(
            TypeSection { types: vec![Rc::new(FunctionSignature::new(vec![ValueType::I32], vec![ValueType::I32]))] },
            Vec::new(),
        );
        let mut buf = Vec::new();
        section.encode(&mut buf).unwrap();
        let decoded = Section::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn export_section_round_trip() {
        let section = Section::Export(
            ExportSection { exports: vec![ExportEntry { name: "add".to_string(), desc: ExportDesc::Function(0) }] },
            Vec::new(),
        );
        let mut buf = Vec::new();
        section.encode(&mut buf).unwrap();
        let decoded = Section::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn code_section_preserves_extra_payload() {
        let mut encoded_body = Vec::new();
        FunctionBody {
            locals: vec![],
            body: vec![Instruction::LocalGet(0), Instruction::LocalGet(1), Instruction::I32Add],
            extra: vec![0xAB, 0xCD],
        }
        .encode(&mut encoded_body)
        .unwrap();

        let mut section_bytes = Vec::new();
        section_bytes.push(SectionId::Code as u8);
        leb128::write_length_prefixed(&mut section_bytes, |scratch| {
            leb128::write_varuint32(scratch, 1)?;
            scratch.write_all(&encoded_body)?;
            Ok(())
        })
        .unwrap();

        let decoded = Section::decode(&mut section_bytes.as_slice()).unwrap();
        match decoded {
            Section::Code(code_section, _) => {
                assert_eq!(code_section.bodies[0].extra, vec![0xAB, 0xCD]);
            }
            other => panic!("expected Code section, got {other:?}"),
        }
    }

    #[test]
    fn unknown_section_round_trips_opaque() {
        let section = Section::Unknown(UnknownSection { code: 63, payload: vec![1, 2, 3] });
        let mut buf = Vec::new();
        section.encode(&mut buf).unwrap();
        let decoded = Section::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn data_section_round_trip() {
        let section = Section::Data(
            DataSection {
                segments: vec![DataSegment {
                    memory_index: 0,
                    offset: vec![Instruction::I32Const(8)],
                    bytes: vec![1, 2, 3, 4],
                }],
            },
            Vec::new(),
        );
        let mut buf = Vec::new();
        section.encode(&mut buf).unwrap();
        let decoded = Section::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, section);
    }
}
