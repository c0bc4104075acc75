//! The custom `"name"` section: debug names for the module, its functions, and locals.
//!
//! <https://webassembly.github.io/spec/core/appendix/custom.html#name-section>

use crate::leb128::{self, CodecResult};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use std::io::{Read, Write};

#[derive(Eq, PartialEq, Debug, Copy, Clone, TryFromPrimitive)]
#[repr(u8)]
enum NameSubsectionId {
    Module = 0,
    Function = 1,
    Local = 2,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct NameSection {
    pub module_name: Option<String>,
    pub function_names: Vec<(u32, String)>,
    pub local_names: Vec<(u32, Vec<(u32, String)>)>,
    /// Subsections with an unrecognized kind byte, preserved verbatim for round-trip.
    pub unknown: Vec<(u8, Vec<u8>)>,
}

fn decode_name_map(reader: &mut impl Read) -> CodecResult<Vec<(u32, String)>> {
    let count = leb128::read_varuint32(reader)? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let index = leb128::read_varuint32(reader)?;
        let name = leb128::read_string(reader)?;
        entries.push((index, name));
    }
    Ok(entries)
}

fn encode_name_map(entries: &[(u32, String)], writer: &mut impl Write) -> CodecResult<()> {
    leb128::write_varuint32(writer, entries.len() as u32)?;
    for (index, name) in entries {
        leb128::write_varuint32(writer, *index)?;
        leb128::write_string(writer, name)?;
    }
    Ok(())
}

impl NameSection {
    pub fn decode(reader: &mut impl Read) -> CodecResult<NameSection> {
        let mut section = NameSection::default();
        loop {
            let mut kind_byte = [0u8; 1];
            match reader.read_exact(&mut kind_byte) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let payload = leb128::read_bytes(reader)?;
            let mut cursor = payload.as_slice();
            match NameSubsectionId::try_from(kind_byte[0]) {
                Ok(NameSubsectionId::Module) => {
                    section.module_name = Some(leb128::read_string(&mut cursor)?);
                }
                Ok(NameSubsectionId::Function) => {
                    section.function_names = decode_name_map(&mut cursor)?;
                }
                Ok(NameSubsectionId::Local) => {
                    let count = leb128::read_varuint32(&mut cursor)? as usize;
                    let mut groups = Vec::with_capacity(count);
                    for _ in 0..count {
                        let function_index = leb128::read_varuint32(&mut cursor)?;
                        let locals = decode_name_map(&mut cursor)?;
                        groups.push((function_index, locals));
                    }
                    section.local_names = groups;
                }
                Err(_) => section.unknown.push((kind_byte[0], payload)),
            }
        }
        Ok(section)
    }

    pub fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        if let Some(module_name) = &self.module_name {
            writer.write_all(&[NameSubsectionId::Module as u8])?;
            leb128::write_length_prefixed(writer, |scratch| leb128::write_string(scratch, module_name))?;
        }
        if !self.function_names.is_empty() {
            writer.write_all(&[NameSubsectionId::Function as u8])?;
            leb128::write_length_prefixed(writer, |scratch| encode_name_map(&self.function_names, scratch))?;
        }
        if !self.local_names.is_empty() {
            writer.write_all(&[NameSubsectionId::Local as u8])?;
            leb128::write_length_prefixed(writer, |scratch| {
                leb128::write_varuint32(scratch, self.local_names.len() as u32)?;
                for (function_index, locals) in &self.local_names {
                    leb128::write_varuint32(scratch, *function_index)?;
                    encode_name_map(locals, scratch)?;
                }
                Ok(())
            })?;
        }
        for (kind, payload) in &self.unknown {
            writer.write_all(&[*kind])?;
            leb128::write_bytes(writer, payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_and_function_names_round_trip() {
        let section = NameSection {
            module_name: Some("calculator".to_string()),
            function_names: vec![(0, "add".to_string()), (1, "sub".to_string())],
            local_names: vec![(0, vec![(0, "lhs".to_string()), (1, "rhs".to_string())])],
            unknown: Vec::new(),
        };
        let mut buf = Vec::new();
        section.encode(&mut buf).unwrap();
        let decoded = NameSection::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn unknown_subsection_round_trips_opaque() {
        let section = NameSection { unknown: vec![(9, vec![1, 2, 3])], ..Default::default() };
        let mut buf = Vec::new();
        section.encode(&mut buf).unwrap();
        let decoded = NameSection::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, section);
    }
}
