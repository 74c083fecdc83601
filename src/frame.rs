//! Frame handling: a buffer holding one or more consecutive records of the same Struct.

use crate::error::TranscodeError;
use crate::options::{PackOptions, ParseOptions, Source};
use crate::size::Size;
use crate::structure::Struct;
use crate::value::Value;
use tracing::debug;

/// Result of parsing a frame: every record, in buffer order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameParseResult {
    pub records: Vec<ParsedRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub value: Value,
    /// Start and end byte offsets within the frame.
    pub byte_range: (usize, usize),
}

impl FrameParseResult {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.records.iter().map(|r| &r.value)
    }
}

/// Parses records back to back from the start of `bytes` until the buffer is used up.
/// Each record must occupy a whole, non-zero number of bytes. Errors carry the record
/// index as the outermost path element.
pub fn parse_frame(structure: &dyn Struct, bytes: &[u8]) -> Result<FrameParseResult, TranscodeError> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let index = records.len();
        let parsed = structure
            .parse(bytes, ParseOptions::at(Size::from_bytes(offset)), None)
            .map_err(|e| e.in_field(&index.to_string()))?;
        check_record(parsed.size, offset).map_err(|e| e.in_field(&index.to_string()))?;
        let end = offset + parsed.size.whole_bytes();
        debug!(index, start = offset, end, "parsed record");
        records.push(ParsedRecord {
            value: parsed.data,
            byte_range: (offset, end),
        });
        offset = end;
    }
    Ok(FrameParseResult { records })
}

/// Packs each record and appends it to the frame. Same record rules as [`parse_frame`].
pub fn pack_frame<I>(structure: &dyn Struct, records: I) -> Result<Vec<u8>, TranscodeError>
where
    I: IntoIterator<Item = Value>,
{
    let mut out = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        let packed = structure
            .pack(Source::Value(record), PackOptions::default())
            .map_err(|e| e.in_field(&index.to_string()))?;
        check_record(packed.size, out.len()).map_err(|e| e.in_field(&index.to_string()))?;
        debug!(index, start = out.len(), bytes = packed.size.whole_bytes(), "packed record");
        out.extend_from_slice(&packed.buffer[..packed.size.whole_bytes()]);
    }
    Ok(out)
}

fn check_record(size: Size, offset: usize) -> Result<(), TranscodeError> {
    if size == Size::ZERO {
        return Err(TranscodeError::Configuration("record occupies no bytes".to_string()));
    }
    if !size.is_byte_aligned() {
        return Err(TranscodeError::Misaligned {
            bit_offset: offset * 8 + size.bits(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::NamedAggregate;
    use crate::field::{Padding, Primitive};
    use crate::options::Transcoders;

    fn record() -> NamedAggregate {
        NamedAggregate::new(
            [
                ("id", Primitive::uint(8, Transcoders::new()).unwrap().shared()),
                ("v", Primitive::uint(16, Transcoders::new()).unwrap().shared()),
            ],
            Transcoders::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_frame_ranges() {
        let result = parse_frame(&record(), &[1, 0, 2, 3, 0, 4]).unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].byte_range, (0, 3));
        assert_eq!(result.records[1].byte_range, (3, 6));
        assert_eq!(
            result.records[1].value,
            Value::map([("id", Value::Uint(3)), ("v", Value::Uint(4))])
        );
    }

    #[test]
    fn test_pack_frame_matches_parse() {
        let values = vec![
            Value::map([("id", Value::Uint(1)), ("v", Value::Uint(2))]),
            Value::map([("id", Value::Uint(9)), ("v", Value::Uint(0x1234))]),
        ];
        let bytes = pack_frame(&record(), values.clone()).unwrap();
        assert_eq!(bytes, vec![1, 0, 2, 9, 0x12, 0x34]);
        let parsed: Vec<Value> = parse_frame(&record(), &bytes).unwrap().values().cloned().collect();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_truncated_last_record() {
        let err = parse_frame(&record(), &[1, 0, 2, 3]).unwrap_err();
        assert_eq!(err.path(), "1.v");
        assert!(matches!(err.root(), TranscodeError::OutOfBounds { .. }));
    }

    #[test]
    fn test_sub_byte_record_rejected() {
        let err = parse_frame(&Padding::new(4), &[0]).unwrap_err();
        assert!(matches!(err.root(), TranscodeError::Misaligned { .. }));
        let err = parse_frame(&Padding::pass(), &[0]).unwrap_err();
        assert!(matches!(err.root(), TranscodeError::Configuration(_)));
    }
}
