//! Little-endian primitive codec for the Wasm binary format.
//!
//! Wraps the `leb128` crate's raw varint reader/writer with the bit-width
//! enforcement the wire format actually requires (`varuint1`, `varuint7`,
//! `varuint32`, `varint32`, `varint64`), plus the non-LEB primitives
//! (IEEE-754 floats, length-prefixed strings and byte blocks).

use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IoError: {0}")]
    Io(#[from] io::Error),

    #[error("Leb128Error: {0}")]
    Leb128(#[from] leb128::read::Error),

    #[error("varuint{bits} overlong: decoded value {value:#x} does not fit in {bits} bits")]
    VaruintOverlong { bits: u32, value: u64 },

    #[error("varint{bits} overlong: decoded value {value:#x} does not fit in {bits} bits")]
    VarintOverlong { bits: u32, value: i64 },

    #[error("Utf8Error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

fn check_varuint_width(bits: u32, value: u64) -> CodecResult<u64> {
    let fits = bits >= 64 || value < (1u64 << bits);
    if fits {
        Ok(value)
    } else {
        Err(CodecError::VaruintOverlong { bits, value })
    }
}

fn check_varint_width(bits: u32, value: i64) -> CodecResult<i64> {
    if bits >= 64 {
        return Ok(value);
    }
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(CodecError::VarintOverlong { bits, value })
    }
}

/// Reads an unsigned LEB128 integer constrained to `bits` bits (`varuint(N)`).
pub fn read_varuint(reader: &mut impl Read, bits: u32) -> CodecResult<u64> {
    let value = leb128::read::unsigned(reader)?;
    check_varuint_width(bits, value)
}

/// Reads a signed LEB128 integer constrained to `bits` bits (`varint(N)`).
pub fn read_varint(reader: &mut impl Read, bits: u32) -> CodecResult<i64> {
    let value = leb128::read::signed(reader)?;
    check_varint_width(bits, value)
}

/// `varuint1`: a single-bit boolean flag encoded as LEB128.
pub fn read_varuint1(reader: &mut impl Read) -> CodecResult<bool> {
    Ok(read_varuint(reader, 1)? != 0)
}

/// `varuint7`: used for section codes and value-type-adjacent single-byte tags.
pub fn read_varuint7(reader: &mut impl Read) -> CodecResult<u8> {
    Ok(read_varuint(reader, 7)? as u8)
}

/// `varuint32`: the most common immediate width (indices, counts, lengths).
pub fn read_varuint32(reader: &mut impl Read) -> CodecResult<u32> {
    Ok(read_varuint(reader, 32)? as u32)
}

/// `varint32`: signed 32-bit constant / signed immediate.
pub fn read_varint32(reader: &mut impl Read) -> CodecResult<i32> {
    Ok(read_varint(reader, 32)? as i32)
}

/// `varint64`: signed 64-bit constant.
pub fn read_varint64(reader: &mut impl Read) -> CodecResult<i64> {
    read_varint(reader, 64)
}

pub fn read_f32(reader: &mut impl Read) -> CodecResult<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

pub fn read_f64(reader: &mut impl Read) -> CodecResult<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Length-prefixed byte block: `varuint32` length followed by that many raw bytes.
pub fn read_bytes(reader: &mut impl Read) -> CodecResult<Vec<u8>> {
    let len = read_varuint32(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Length-prefixed UTF-8 string. The decoder does not validate well-formedness beyond
/// what `String::from_utf8` requires; the wire contract is UTF-8 but malformed input is
/// surfaced as a [`CodecError::Utf8`] rather than silently accepted.
pub fn read_string(reader: &mut impl Read) -> CodecResult<String> {
    let bytes = read_bytes(reader)?;
    Ok(String::from_utf8(bytes)?)
}

pub fn write_varuint(writer: &mut impl Write, bits: u32, value: u64) -> CodecResult<()> {
    check_varuint_width(bits, value)?;
    leb128::write::unsigned(writer, value)?;
    Ok(())
}

pub fn write_varint(writer: &mut impl Write, bits: u32, value: i64) -> CodecResult<()> {
    check_varint_width(bits, value)?;
    leb128::write::signed(writer, value)?;
    Ok(())
}

pub fn write_varuint1(writer: &mut impl Write, value: bool) -> CodecResult<()> {
    write_varuint(writer, 1, value as u64)
}

pub fn write_varuint7(writer: &mut impl Write, value: u8) -> CodecResult<()> {
    write_varuint(writer, 7, value as u64)
}

pub fn write_varuint32(writer: &mut impl Write, value: u32) -> CodecResult<()> {
    write_varuint(writer, 32, value as u64)
}

pub fn write_varint32(writer: &mut impl Write, value: i32) -> CodecResult<()> {
    write_varint(writer, 32, value as i64)
}

pub fn write_varint64(writer: &mut impl Write, value: i64) -> CodecResult<()> {
    write_varint(writer, 64, value)
}

pub fn write_f32(writer: &mut impl Write, value: f32) -> CodecResult<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_f64(writer: &mut impl Write, value: f64) -> CodecResult<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_bytes(writer: &mut impl Write, bytes: &[u8]) -> CodecResult<()> {
    write_varuint32(writer, bytes.len() as u32)?;
    writer.write_all(bytes)?;
    Ok(())
}

pub fn write_string(writer: &mut impl Write, value: &str) -> CodecResult<()> {
    write_bytes(writer, value.as_bytes())
}

/// Writes `contents` into a scratch buffer first so its byte length can be emitted as a
/// `varuint32` prefix, then appends the scratch buffer to `writer`. This is how every
/// length-prefixed block (sections, function bodies) is framed on the write path, since
/// the length must be known before it can be written.
pub fn write_length_prefixed(
    writer: &mut impl Write,
    contents: impl FnOnce(&mut Vec<u8>) -> CodecResult<()>,
) -> CodecResult<()> {
    let mut scratch = Vec::new();
    contents(&mut scratch)?;
    write_bytes(writer, &scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varuint32_round_trip() {
        for value in [0u32, 1, 127, 128, 16384, u32::MAX] {
            let mut buf = Vec::new();
            write_varuint32(&mut buf, value).unwrap();
            let decoded = read_varuint32(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn varint32_round_trip() {
        for value in [0i32, 1, -1, i32::MIN, i32::MAX, -64, 64] {
            let mut buf = Vec::new();
            write_varint32(&mut buf, value).unwrap();
            let decoded = read_varint32(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn varuint7_rejects_overlong() {
        // 0x80, 0x01 LEB128-decodes to 128, which does not fit in 7 bits.
        let bytes = [0x80u8, 0x01];
        let err = read_varuint7(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::VaruintOverlong { bits: 7, .. }));
    }

    #[test]
    fn varuint1_decodes_flag() {
        let mut buf = Vec::new();
        write_varuint1(&mut buf, true).unwrap();
        assert!(read_varuint1(&mut buf.as_slice()).unwrap());
    }

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "addTwo").unwrap();
        let decoded = read_string(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, "addTwo");
    }

    #[test]
    fn f32_f64_round_trip() {
        let mut buf = Vec::new();
        write_f32(&mut buf, 1.5f32).unwrap();
        write_f64(&mut buf, -2.25f64).unwrap();
        let mut reader = buf.as_slice();
        assert_eq!(read_f32(&mut reader).unwrap(), 1.5f32);
        assert_eq!(read_f64(&mut reader).unwrap(), -2.25f64);
    }

    #[test]
    fn length_prefixed_block_computes_length() {
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, |scratch| {
            write_varuint32(scratch, 42)?;
            write_string(scratch, "x")
        })
        .unwrap();
        let bytes = read_bytes(&mut buf.as_slice()).unwrap();
        let mut inner = bytes.as_slice();
        assert_eq!(read_varuint32(&mut inner).unwrap(), 42);
        assert_eq!(read_string(&mut inner).unwrap(), "x");
    }
}
