//! Top-level binary encode entry point, symmetric to [`super::reader::decode_module`].

use crate::leb128::CodecResult;
use crate::module::{Module, MAGIC, MVP_VERSION};
use std::io::Write;

/// Encodes a module as the MVP binary format: magic, MVP version, then every section in
/// the order they are stored (callers are responsible for having kept that order
/// canonical via [`Module::insert_section`]).
pub fn encode_module(module: &Module, writer: &mut impl Write) -> CodecResult<()> {
    writer.write_all(&MAGIC.to_le_bytes())?;
    writer.write_all(&MVP_VERSION.to_le_bytes())?;
    for section in module.sections() {
        section.encode(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::reader::decode_module;

    #[test]
    fn empty_module_round_trips_to_eight_bytes() {
        let module = Module::new();
        let mut buf = Vec::new();
        encode_module(&module, &mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_then_encode_preserves_bytes() {
        let original: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        let module = decode_module(&mut original.as_slice()).unwrap();
        let mut reencoded = Vec::new();
        encode_module(&module, &mut reencoded).unwrap();
        assert_eq!(reencoded, original);
    }
}
