//! Top-level binary decode entry point: magic/version header, then a section dispatch
//! loop.

use crate::leb128::CodecResult;
use crate::module::section::Section;
use crate::module::{Module, MAGIC, MVP_VERSION, PRE_MVP_VERSION};
use std::io::Read;
use tracing::trace;

fn read_u32_le(reader: &mut impl Read) -> CodecResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Decodes a complete module: the 8-byte header followed by sections until EOF.
pub fn decode_module(reader: &mut impl Read) -> CodecResult<Module> {
    let magic = read_u32_le(reader)?;
    if magic != MAGIC {
        return Err(crate::leb128::CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad magic number {magic:#x}, expected {MAGIC:#x}"),
        )));
    }

    let version = read_u32_le(reader)?;
    if version != MVP_VERSION && version != PRE_MVP_VERSION {
        return Err(crate::leb128::CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported version {version:#x}"),
        )));
    }
    trace!(version, "decoded module header");

    let mut module = Module::new();
    loop {
        match Section::decode(reader) {
            Ok(section) => {
                trace!(code = section.code(), "decoded section");
                module.sections.push(section);
            }
            Err(crate::leb128::CodecError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_header_only_module() {
        let bytes: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        let module = decode_module(&mut bytes.as_slice()).unwrap();
        assert!(module.sections().is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes: [u8; 8] = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x00, 0x00, 0x00];
        assert!(decode_module(&mut bytes.as_slice()).is_err());
    }
}
