//! Primitive codec: bit-level pack/parse of unsigned/signed integers, IEEE floats and
//! UTF-8 text at arbitrary bit offsets.
//!
//! Bits are addressed MSB-first: bit 0 is the high bit of the first byte, and a value
//! is laid out most-significant bit first. Widths that are a whole number of bytes go
//! through `byteorder` and honour [`Endianness`]; other widths are plain bit strings.

use crate::error::TranscodeError;
use crate::size::Size;
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// What a primitive field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Unsigned bit-field of any width up to 64.
    Bits,
    Uint,
    Int,
    Float,
    Utf8,
}

pub const BITS_MAX: usize = 64;
pub const UINT_SIZES: &[usize] = &[8, 16, 32, 64];
pub const INT_SIZES: &[usize] = &[8, 16, 32, 64];
pub const FLOAT_SIZES: &[usize] = &[32, 64];

/// Whether `bits` is a legal width for `kind`.
pub fn is_permitted(kind: Kind, bits: usize) -> bool {
    match kind {
        Kind::Bits => (1..=BITS_MAX).contains(&bits),
        Kind::Uint => UINT_SIZES.contains(&bits),
        Kind::Int => INT_SIZES.contains(&bits),
        Kind::Float => FLOAT_SIZES.contains(&bits),
        Kind::Utf8 => bits > 0 && bits % 8 == 0,
    }
}

/// Writes `value` as `bits` bits of `kind` at `offset` in `region`. Returns bits written.
pub fn serialize(
    kind: Kind,
    value: &Value,
    bits: usize,
    region: &mut [u8],
    offset: Size,
    endianness: Endianness,
) -> Result<usize, TranscodeError> {
    match kind {
        Kind::Bits | Kind::Uint => {
            let v = unsigned_of(value, bits)?;
            write_unsigned(region, offset, bits, v, endianness)?;
        }
        Kind::Int => {
            let v = value.as_i64().ok_or_else(|| mismatch("int", value))?;
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if v < min || v > max {
                    return Err(TranscodeError::ValueOutOfRange {
                        value: v.to_string(),
                        bits,
                    });
                }
            }
            write_unsigned(region, offset, bits, (v as u64) & mask(bits), endianness)?;
        }
        Kind::Float => {
            let v = value.as_f64().ok_or_else(|| mismatch("float", value))?;
            let raw = if bits == 32 {
                (v as f32).to_bits() as u64
            } else {
                v.to_bits()
            };
            write_unsigned(region, offset, bits, raw, endianness)?;
        }
        Kind::Utf8 => {
            let s = value.as_str().ok_or_else(|| mismatch("text", value))?;
            let len = bits / 8;
            if s.len() > len {
                return Err(TranscodeError::ValueOutOfRange {
                    value: format!("{:?}", s),
                    bits,
                });
            }
            let mut buf = s.as_bytes().to_vec();
            buf.resize(len, 0);
            write_bytes(region, offset, &buf)?;
        }
    }
    Ok(bits)
}

/// Reads `bits` bits of `kind` at `offset` in `region`.
pub fn deserialize(
    kind: Kind,
    bits: usize,
    region: &[u8],
    offset: Size,
    endianness: Endianness,
) -> Result<Value, TranscodeError> {
    Ok(match kind {
        Kind::Bits | Kind::Uint => Value::Uint(read_unsigned(region, offset, bits, endianness)?),
        Kind::Int => {
            let raw = read_unsigned(region, offset, bits, endianness)?;
            Value::Int(sign_extend(raw, bits))
        }
        Kind::Float => {
            let raw = read_unsigned(region, offset, bits, endianness)?;
            if bits == 32 {
                Value::Float(f32::from_bits(raw as u32) as f64)
            } else {
                Value::Float(f64::from_bits(raw))
            }
        }
        Kind::Utf8 => {
            let mut buf = read_bytes(region, offset, bits / 8)?;
            while buf.last() == Some(&0) {
                buf.pop();
            }
            Value::Text(String::from_utf8(buf)?)
        }
    })
}

fn mismatch(expected: &'static str, found: &Value) -> TranscodeError {
    TranscodeError::TypeMismatch {
        expected,
        found: found.type_name().to_string(),
    }
}

fn unsigned_of(value: &Value, bits: usize) -> Result<u64, TranscodeError> {
    let v = match value {
        Value::Int(i) if *i < 0 => {
            return Err(TranscodeError::ValueOutOfRange {
                value: i.to_string(),
                bits,
            })
        }
        other => other.as_u64().ok_or_else(|| mismatch("uint", other))?,
    };
    if bits < 64 && v >> bits != 0 {
        return Err(TranscodeError::ValueOutOfRange {
            value: v.to_string(),
            bits,
        });
    }
    Ok(v)
}

fn mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn write_unsigned(
    region: &mut [u8],
    offset: Size,
    bits: usize,
    v: u64,
    endianness: Endianness,
) -> Result<(), TranscodeError> {
    if bits % 8 != 0 {
        return write_bits(region, offset.bits(), bits, v);
    }
    let n = bits / 8;
    let mut buf = [0u8; 8];
    match endianness {
        Endianness::Big => BigEndian::write_uint(&mut buf[..n], v, n),
        Endianness::Little => LittleEndian::write_uint(&mut buf[..n], v, n),
    }
    write_bytes(region, offset, &buf[..n])
}

fn read_unsigned(
    region: &[u8],
    offset: Size,
    bits: usize,
    endianness: Endianness,
) -> Result<u64, TranscodeError> {
    if bits % 8 != 0 {
        return read_bits(region, offset.bits(), bits);
    }
    let n = bits / 8;
    let buf = read_bytes(region, offset, n)?;
    Ok(match endianness {
        Endianness::Big => BigEndian::read_uint(&buf, n),
        Endianness::Little => LittleEndian::read_uint(&buf, n),
    })
}

/// Fails unless bits `start..start + n` lie inside a region of `len` bytes.
pub fn ensure_available(len: usize, start: usize, n: usize) -> Result<(), TranscodeError> {
    let available = len * 8;
    match start.checked_add(n) {
        Some(end) if end <= available => Ok(()),
        _ => Err(TranscodeError::OutOfBounds {
            start,
            end: start.saturating_add(n),
            available,
        }),
    }
}

/// Reads `n` bits (max 64) starting at `bit_pos` as an unsigned value, MSB-first.
pub fn read_bits(data: &[u8], bit_pos: usize, n: usize) -> Result<u64, TranscodeError> {
    if n > 64 {
        return Err(TranscodeError::Configuration(format!(
            "cannot read {} bits into a 64-bit value",
            n
        )));
    }
    ensure_available(data.len(), bit_pos, n)?;
    let mut value = 0u64;
    for pos in bit_pos..bit_pos + n {
        let bit = (data[pos / 8] >> (7 - pos % 8)) & 1;
        value = (value << 1) | bit as u64;
    }
    Ok(value)
}

/// Writes the low `n` bits (max 64) of `value` at `bit_pos`, MSB-first. Bits outside
/// the range are left as they were.
pub fn write_bits(data: &mut [u8], bit_pos: usize, n: usize, value: u64) -> Result<(), TranscodeError> {
    if n > 64 {
        return Err(TranscodeError::Configuration(format!(
            "cannot write {} bits from a 64-bit value",
            n
        )));
    }
    ensure_available(data.len(), bit_pos, n)?;
    for i in 0..n {
        let pos = bit_pos + i;
        let bit_mask = 0x80u8 >> (pos % 8);
        if (value >> (n - 1 - i)) & 1 == 1 {
            data[pos / 8] |= bit_mask;
        } else {
            data[pos / 8] &= !bit_mask;
        }
    }
    Ok(())
}

fn write_bytes(region: &mut [u8], offset: Size, bytes: &[u8]) -> Result<(), TranscodeError> {
    let start = offset.bits();
    ensure_available(region.len(), start, bytes.len() * 8)?;
    if offset.is_byte_aligned() {
        let at = offset.whole_bytes();
        region[at..at + bytes.len()].copy_from_slice(bytes);
        return Ok(());
    }
    for (i, b) in bytes.iter().enumerate() {
        write_bits(region, start + i * 8, 8, *b as u64)?;
    }
    Ok(())
}

fn read_bytes(region: &[u8], offset: Size, len: usize) -> Result<Vec<u8>, TranscodeError> {
    let start = offset.bits();
    ensure_available(region.len(), start, len * 8)?;
    if offset.is_byte_aligned() {
        let at = offset.whole_bytes();
        return Ok(region[at..at + len].to_vec());
    }
    (0..len)
        .map(|i| read_bits(region, start + i * 8, 8).map(|b| b as u8))
        .collect()
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}
