//! Stitches independently packed fragments into one buffer.
//!
//! A fragment's size may end mid-byte. Each fragment is replayed through a one-off
//! positional layout of 8-bit fields plus a trailing bit-field for the remainder, so
//! the next fragment starts at the exact following bit.

use crate::aggregate::PositionalAggregate;
use crate::error::TranscodeError;
use crate::field::Primitive;
use crate::options::{PackOptions, Source, Transcoders};
use crate::size::Size;
use crate::structure::{Packed, Struct, StructRef};
use crate::value::Value;
use tracing::debug;

/// Concatenates `fragments` in order into a `total.byte_len()`-byte buffer.
pub fn concat_fragments(fragments: &[Packed], total: Size) -> Result<Vec<u8>, TranscodeError> {
    let mut buffer = vec![0u8; total.byte_len()];
    let mut offset = Size::ZERO;
    for fragment in fragments {
        let needed = fragment.size.byte_len();
        if fragment.buffer.len() < needed {
            return Err(TranscodeError::LengthMismatch {
                expected: needed,
                actual: fragment.buffer.len(),
            });
        }
        if fragment.size == Size::ZERO {
            continue;
        }
        let layout = fragment_layout(fragment.size)?;
        layout.pack(
            Source::Value(fragment_values(fragment)),
            PackOptions::into_view(&mut buffer, offset),
        )?;
        offset += fragment.size;
    }
    debug!(fragments = fragments.len(), bits = total.bits(), "concatenated fragments");
    Ok(buffer)
}

fn fragment_layout(size: Size) -> Result<PositionalAggregate, TranscodeError> {
    let byte: StructRef = Primitive::uint(8, Transcoders::new())?.shared();
    let mut children = vec![byte; size.whole_bytes()];
    let remainder = size.remainder_bits();
    if remainder > 0 {
        children.push(Primitive::bits(remainder, Transcoders::new())?.shared());
    }
    Ok(PositionalAggregate::new(children, Transcoders::new()))
}

/// Byte values of a fragment; the remainder is taken from the high bits of its last byte.
fn fragment_values(fragment: &Packed) -> Value {
    let whole = fragment.size.whole_bytes();
    let mut values: Vec<Value> = fragment.buffer[..whole]
        .iter()
        .map(|&b| Value::Uint(b as u64))
        .collect();
    let remainder = fragment.size.remainder_bits();
    if remainder > 0 {
        values.push(Value::Uint((fragment.buffer[whole] >> (8 - remainder)) as u64));
    }
    Value::List(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(buffer: Vec<u8>, bits: usize) -> Packed {
        Packed {
            buffer,
            size: Size::from_bits(bits),
        }
    }

    #[test]
    fn test_sub_byte_fragments_are_contiguous() {
        // 3 bits of 0b101 then 5 bits of 0b10001
        let parts = [fragment(vec![0b1010_0000], 3), fragment(vec![0b1000_1000], 5)];
        let out = concat_fragments(&parts, Size::from_bits(8)).unwrap();
        assert_eq!(out, vec![0b1011_0001]);
    }

    #[test]
    fn test_remainder_then_whole_bytes() {
        let parts = [fragment(vec![0b1110_0000], 3), fragment(vec![0xFF, 0x00], 13)];
        let out = concat_fragments(&parts, Size::from_bits(16)).unwrap();
        assert_eq!(out, vec![0b1111_1111, 0b1110_0000]);
    }

    #[test]
    fn test_short_fragment_rejected() {
        let parts = [fragment(vec![0x01], 12)];
        assert!(matches!(
            concat_fragments(&parts, Size::from_bits(12)),
            Err(TranscodeError::LengthMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_empty_fragments_skipped() {
        let parts = [fragment(vec![], 0), fragment(vec![0xAB], 8)];
        assert_eq!(concat_fragments(&parts, Size::from_bits(8)).unwrap(), vec![0xAB]);
    }
}
